use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use correlation_engine::CorrelationEngine;
use event_bus::{EventBus, ScannerEvent};
use exchange_client::{ExchangeClient, MacroPriceClient};
use scanner_orchestrator::{Orchestrator, OrchestratorConfig};
use signal_store::SignalStore;
use virtual_portfolio::VirtualPortfolio;
use weight_learner::{detect_drift, refresh_and_publish, WeightTable};

mod config;

use config::ScannerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting InvestIQ prediction-market scanner");

    let config = ScannerConfig::from_env()?;
    tracing::info!(
        series = %config.exchange_series_id,
        macro_symbol = %config.macro_symbol,
        poll_interval_s = config.poll_interval_seconds,
        max_markets = config.max_markets,
        "Configuration loaded"
    );

    let db_pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let signal_store = Arc::new(SignalStore::with_retention(
        db_pool,
        chrono::Duration::days(config.retention_days),
    ));
    signal_store.init_tables().await?;
    tracing::info!("Signal store initialized");

    let exchange = ExchangeClient::new(config.exchange_base_url.clone(), config.exchange_requests_per_min);

    let new_macro_client = || {
        MacroPriceClient::new(config.macro_base_url.clone(), config.macro_ws_url.clone(), config.macro_requests_per_min)
    };

    let stream_client = new_macro_client();
    let stream_symbol = config.macro_symbol.clone();
    tokio::spawn(async move { stream_client.run_stream(&stream_symbol).await });

    let correlation_engine = Arc::new(CorrelationEngine::new(config.macro_symbol.clone(), new_macro_client()));
    correlation_engine.clone().spawn_refresh_loop();
    tracing::info!("Correlation engine started ({})", config.macro_symbol);

    let weights = WeightTable::new();
    let weight_baseline = weights.snapshot();

    let portfolio = Arc::new(VirtualPortfolio::new());

    let events = EventBus::new();

    events.spawn_subscriber(|event| async move {
        tracing::info!(event = event.name(), "scanner event");
        Ok(())
    });

    {
        let store = signal_store.clone();
        events.spawn_subscriber(move |event| {
            let store = store.clone();
            async move {
                if let ScannerEvent::SignalEnter { tick } = event {
                    let Some(rec) = &tick.rec else { return Ok(()) };
                    let Some(classified) = &tick.classified else { return Ok(()) };
                    let side = rec.side;
                    store.record_enter(&tick, classified, side).await?;
                }
                Ok(())
            }
        });
    }

    {
        let portfolio = portfolio.clone();
        events.spawn_subscriber(move |event| {
            let portfolio = portfolio.clone();
            async move {
                if let ScannerEvent::SignalEnter { tick } = event {
                    portfolio.open_from_tick(&tick);
                }
                Ok(())
            }
        });
    }

    let orchestrator_config = OrchestratorConfig {
        series_id: config.exchange_series_id.clone(),
        min_liquidity: config.min_liquidity,
        category_allowlist: config.category_allowlist.clone(),
        max_markets: config.max_markets,
        poll_interval: Duration::from_secs(config.poll_interval_seconds),
        stagger: Duration::from_millis(config.stagger_ms),
    };

    let orchestrator = Arc::new(Orchestrator::new(
        exchange,
        new_macro_client(),
        correlation_engine.clone(),
        weights.clone(),
        events.clone(),
        orchestrator_config,
    ));

    {
        let orchestrator = orchestrator.clone();
        let portfolio = portfolio.clone();
        events.spawn_subscriber(move |event| {
            let orchestrator = orchestrator.clone();
            let portfolio = portfolio.clone();
            async move {
                if let ScannerEvent::CycleComplete { .. } = event {
                    let ticks = orchestrator.latest_ticks();
                    portfolio.refresh_prices(&ticks);
                    portfolio.close_settled(&ticks);
                }
                Ok(())
            }
        });
    }

    let cycle_handle = orchestrator.clone().start();
    tracing::info!("Orchestrator running. Press Ctrl+C to stop.");

    let weight_refresh_handle = {
        let signal_store = signal_store.clone();
        let weights = weights.clone();
        let interval_duration = Duration::from_secs(config.weight_refresh_minutes.max(1) * 60);
        let mut baseline = weight_baseline;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_duration);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match refresh_and_publish(&signal_store, &weights).await {
                    Ok(Some(outcome)) => {
                        tracing::info!(deltas = outcome.audit.len(), "weight table refreshed");
                        let report = detect_drift(&baseline, &outcome.table);
                        if !matches!(report.severity, weight_learner::DriftSeverity::None) {
                            tracing::warn!(
                                severity = ?report.severity,
                                diverged = report.diverged.len(),
                                "weight drift detected since process start"
                            );
                        }
                        baseline = outcome.table;
                    }
                    Ok(None) => tracing::debug!("not enough settled outcomes to refresh weights yet"),
                    Err(err) => tracing::error!(error = %err, "weight refresh failed"),
                }
            }
        })
    };

    let outcome_resolution_handle = {
        let signal_store = signal_store.clone();
        let orchestrator = orchestrator.clone();
        let interval_duration = Duration::from_secs(config.outcome_resolution_minutes.max(1) * 60);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_duration);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let ticks = orchestrator.latest_ticks();
                match signal_store.resolve_outcomes(&ticks, chrono::Utc::now()).await {
                    Ok(summary) => tracing::info!(
                        settled = summary.settled,
                        voided = summary.voided,
                        purged = summary.purged,
                        "outcome resolution pass complete"
                    ),
                    Err(err) => tracing::error!(error = %err, "outcome resolution failed"),
                }
            }
        })
    };

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    orchestrator.stop();
    weight_refresh_handle.abort();
    outcome_resolution_handle.abort();
    cycle_handle.await.ok();

    tracing::info!("Scanner shut down.");
    Ok(())
}
