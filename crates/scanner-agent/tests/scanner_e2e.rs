//! Exercises one full orchestrator cycle against a local stub HTTP listener
//! standing in for the exchange REST API, covering discovery, book and
//! price-history fetch, indicator computation, scoring and decision.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use correlation_engine::CorrelationEngine;
use event_bus::EventBus;
use exchange_client::{ExchangeClient, MacroPriceClient};
use scanner_orchestrator::{Orchestrator, OrchestratorConfig};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use weight_learner::WeightTable;

const YES_TOKEN: &str = "yes-token-1";
const NO_TOKEN: &str = "no-token-1";
const CONDITION_ID: &str = "cond-e2e-1";

fn markets_body() -> String {
    json!([{
        "markets": [{
            "conditionId": CONDITION_ID,
            "question": "Will the price stay above the line?",
            "category": "general",
            "clobTokenIds": [YES_TOKEN, NO_TOKEN],
            "outcomePrices": ["0.42", "0.58"],
            "outcomes": ["Yes", "No"],
            "liquidity": "5000",
            "endDate": (Utc::now() + chrono::Duration::hours(1)).to_rfc3339(),
            "tags": [],
            "closed": false,
        }]
    }])
    .to_string()
}

fn book_body() -> String {
    json!({
        "bids": [{"price": 0.40, "size": 2000.0}, {"price": 0.39, "size": 1500.0}],
        "asks": [{"price": 0.44, "size": 1800.0}, {"price": 0.45, "size": 1200.0}],
    })
    .to_string()
}

/// 48 one-minute ticks with a mild uptrend, enough to clear the indicator
/// warm-up window (MACD slow + signal) after bucketing into 60s candles.
fn price_history_body() -> String {
    let start = Utc::now() - chrono::Duration::minutes(48);
    let history: Vec<_> = (0..48)
        .map(|i| {
            let t = (start + chrono::Duration::minutes(i)).timestamp();
            let wobble = if i % 4 == 0 { 0.15 } else { -0.05 };
            let p = 100.0 + (i as f64) * 0.08 + wobble;
            json!({"t": t, "p": p})
        })
        .collect();
    json!({ "history": history }).to_string()
}

fn respond(status_line: &str, body: String) -> Vec<u8> {
    format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}

/// Minimal single-purpose HTTP/1.1 stub: reads one request per connection,
/// dispatches on the request path, writes back canned JSON.
async fn spawn_stub_exchange() -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub listener");
    let addr = listener.local_addr().expect("local addr");

    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let n = match socket.read(&mut buf).await {
                    Ok(n) if n > 0 => n,
                    _ => return,
                };
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request.lines().next().unwrap_or("").split_whitespace().nth(1).unwrap_or("");

                let response = if path.starts_with("/markets") {
                    respond("HTTP/1.1 200 OK", markets_body())
                } else if path.starts_with("/book") {
                    respond("HTTP/1.1 200 OK", book_body())
                } else if path.starts_with("/prices-history") {
                    respond("HTTP/1.1 200 OK", price_history_body())
                } else {
                    respond("HTTP/1.1 404 Not Found", "{}".to_string())
                };

                let _ = socket.write_all(&response).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), handle)
}

#[tokio::test]
async fn one_cycle_against_a_stub_exchange_produces_a_scored_tick() {
    let (base_url, server_handle) = spawn_stub_exchange().await;

    let exchange = ExchangeClient::new(Some(base_url), 600);
    let macro_client = MacroPriceClient::new(None, None, 600);
    let correlation = Arc::new(CorrelationEngine::new("BTC", MacroPriceClient::new(None, None, 600)));
    let weights = WeightTable::new();
    let events = EventBus::new();

    let mut cycle_events = events.subscribe();

    let config = OrchestratorConfig {
        series_id: "crypto-hourly".to_string(),
        min_liquidity: 0.0,
        category_allowlist: Vec::new(),
        max_markets: 50,
        poll_interval: Duration::from_secs(30),
        stagger: Duration::from_millis(0),
    };

    let orchestrator = Arc::new(Orchestrator::new(exchange, macro_client, correlation, weights, events, config));

    orchestrator.run_cycle().await;

    assert_eq!(orchestrator.tracked_market_count(), 1);

    let ticks = orchestrator.latest_ticks();
    let tick = ticks.get(CONDITION_ID).expect("condition id should be tracked after one cycle");

    assert!(tick.ok, "poll should succeed against the stub: {:?}", tick.reason);
    assert!(tick.indicators.is_some());
    assert!(tick.classified.is_some());
    assert!(tick.model.is_some());
    assert!(tick.edges.is_some());
    assert!(tick.rec.is_some());
    assert!(tick.confidence.is_some());
    assert!(tick.kelly.is_some());
    assert_eq!(tick.category, "general");

    // `reconcile` publishes `market:added` before the poll loop runs, so drain
    // until `cycle:complete` rather than assuming it is the first event.
    let found = tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match cycle_events.recv().await.expect("event bus should not have lagged") {
                event_bus::ScannerEvent::CycleComplete { tick_count, .. } => return tick_count,
                _ => continue,
            }
        }
    })
    .await
    .expect("cycle:complete should have been published");
    assert_eq!(found, 1);

    server_handle.abort();
}

#[tokio::test]
async fn discovery_failure_leaves_previously_tracked_markets_untouched() {
    // Binding with no listener behind it guarantees every request to this
    // base URL fails at the TCP level.
    let dead_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind throwaway listener");
    let dead_addr = dead_listener.local_addr().expect("local addr");
    drop(dead_listener);

    let exchange = ExchangeClient::new(Some(format!("http://{dead_addr}")), 600);
    let macro_client = MacroPriceClient::new(None, None, 600);
    let correlation = Arc::new(CorrelationEngine::new("BTC", MacroPriceClient::new(None, None, 600)));
    let weights = WeightTable::new();
    let events = EventBus::new();

    let config = OrchestratorConfig {
        series_id: "crypto-hourly".to_string(),
        min_liquidity: 0.0,
        category_allowlist: Vec::new(),
        max_markets: 50,
        poll_interval: Duration::from_secs(30),
        stagger: Duration::from_millis(0),
    };

    let orchestrator = Orchestrator::new(exchange, macro_client, correlation, weights, events, config);

    orchestrator.run_cycle().await;

    assert_eq!(orchestrator.tracked_market_count(), 0);
    assert!(orchestrator.latest_ticks().is_empty());
}
