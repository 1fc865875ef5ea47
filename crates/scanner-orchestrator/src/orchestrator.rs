use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use event_bus::{EventBus, ScannerEvent};
use exchange_client::{ExchangeClient, MacroPriceClient};
use scanner_core::{Market, Regime, RegimeHistory, Tick};
use tracing::{debug, info, warn};
use weight_learner::WeightTable;

use crate::poller::poll_market;

/// Discovery is re-run every `DISCOVERY_INTERVAL_CYCLES` cycles; every other
/// cycle polls against the previously discovered market set.
const DISCOVERY_INTERVAL_CYCLES: u64 = 10;

/// Discovery + polling configuration for one scanner run (C7).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub series_id: String,
    pub min_liquidity: f64,
    pub category_allowlist: Vec<String>,
    pub max_markets: usize,
    pub poll_interval: Duration,
    pub stagger: Duration,
}

struct PollerState {
    regime_history: RegimeHistory,
    last_tick: Option<Tick>,
}

/// Drives market discovery and the per-market poll cycle, publishing events
/// to the shared bus and holding the only mutable state the pollers touch:
/// each market's own regime history and its latest tick.
pub struct Orchestrator {
    exchange: ExchangeClient,
    macro_client: MacroPriceClient,
    correlation: Arc<correlation_engine::CorrelationEngine>,
    weights: WeightTable,
    events: EventBus,
    config: OrchestratorConfig,
    states: DashMap<String, PollerState>,
    last_markets: std::sync::RwLock<Vec<Market>>,
    running: Arc<AtomicBool>,
    cycle: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        exchange: ExchangeClient,
        macro_client: MacroPriceClient,
        correlation: Arc<correlation_engine::CorrelationEngine>,
        weights: WeightTable,
        events: EventBus,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            exchange,
            macro_client,
            correlation,
            weights,
            events,
            config,
            states: DashMap::new(),
            last_markets: std::sync::RwLock::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
            cycle: AtomicU64::new(0),
        }
    }

    fn passes_filters(&self, market: &Market) -> bool {
        if market.liquidity < self.config.min_liquidity {
            return false;
        }
        if self.config.category_allowlist.is_empty() {
            return true;
        }
        self.config.category_allowlist.iter().any(|c| c == &market.category)
    }

    async fn discover(&self) -> Option<Vec<Market>> {
        let markets = match self.exchange.fetch_markets(&self.config.series_id, self.config.max_markets as u32).await {
            Ok(markets) => markets,
            Err(err) => {
                warn!(error = %err, "market discovery failed, skipping this cycle's reconciliation");
                return None;
            }
        };

        let mut filtered: Vec<Market> = markets.into_iter().filter(|m| self.passes_filters(m) && !m.closed).collect();
        filtered.truncate(self.config.max_markets);
        Some(filtered)
    }

    fn reconcile(&self, discovered: &[Market], now: chrono::DateTime<Utc>) {
        let discovered_ids: std::collections::HashSet<&str> = discovered.iter().map(|m| m.id.as_str()).collect();

        let stale: Vec<String> = self
            .states
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| !discovered_ids.contains(id.as_str()))
            .collect();
        for market_id in stale {
            self.states.remove(&market_id);
            self.events.publish(ScannerEvent::MarketRemoved { market_id });
        }

        for market in discovered {
            if !self.states.contains_key(&market.id) {
                self.states.insert(
                    market.id.clone(),
                    PollerState { regime_history: RegimeHistory::new(Regime::Range, now), last_tick: None },
                );
                self.events.publish(ScannerEvent::MarketAdded { market_id: market.id.clone() });
            }
        }
    }

    /// One poll pass over every tracked market, staggered by `config.stagger`
    /// between pollers. Discovery only runs on the first cycle and every
    /// `DISCOVERY_INTERVAL_CYCLES`th cycle after that; other cycles poll
    /// against the previously discovered set. Emits `cycle:complete` exactly
    /// once, regardless of how many individual markets failed to poll. A
    /// failed discovery call skips the cycle entirely: previously tracked
    /// markets and their regime history are left untouched rather than
    /// reconciled against an empty set.
    pub async fn run_cycle(&self) {
        let now = Utc::now();
        let cycle_number = self.cycle.load(Ordering::SeqCst);

        let discovered = if cycle_number % DISCOVERY_INTERVAL_CYCLES == 0 {
            let Some(discovered) = self.discover().await else { return };
            self.reconcile(&discovered, now);
            *self.last_markets.write().expect("last markets lock poisoned") = discovered.clone();
            discovered
        } else {
            self.last_markets.read().expect("last markets lock poisoned").clone()
        };

        let mut signal_count = 0usize;
        let mut tick_count = 0usize;

        for (i, market) in discovered.iter().enumerate() {
            if !self.running.load(Ordering::Relaxed) {
                break;
            }
            if i > 0 {
                tokio::time::sleep(self.config.stagger).await;
            }

            let Some(mut state) = self.states.get_mut(&market.id) else { continue };
            let tick = poll_market(
                market,
                &self.exchange,
                &self.macro_client,
                &self.correlation,
                &self.weights,
                &mut state.regime_history,
                Utc::now(),
            )
            .await;

            tick_count += 1;
            if tick.is_enter() {
                signal_count += 1;
                self.events.publish(ScannerEvent::SignalEnter { tick: Box::new(tick.clone()) });
            }
            if !tick.ok {
                debug!(market_id = %market.id, reason = ?tick.reason, "poll did not produce a tick");
            }
            state.last_tick = Some(tick);
        }

        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.publish(ScannerEvent::CycleComplete { cycle, tick_count, signal_count, at: Utc::now() });
    }

    /// Spawns the cycle loop. The returned handle resolves once `stop()` has
    /// been called and the in-flight cycle (if any) finishes.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        tokio::spawn(async move {
            self.events.publish(ScannerEvent::ScannerStart);
            let mut ticker = tokio::time::interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            while running.load(Ordering::Relaxed) {
                ticker.tick().await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                self.run_cycle().await;
            }
            self.events.publish(ScannerEvent::ScannerStop);
            info!("orchestrator cycle loop stopped");
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn latest_ticks(&self) -> HashMap<String, Tick> {
        self.states
            .iter()
            .filter_map(|entry| entry.last_tick.as_ref().map(|tick| (entry.key().clone(), tick.clone())))
            .collect()
    }

    /// Currently tracked ENTER signals, most-edged first.
    pub fn active_signals(&self) -> Vec<Tick> {
        let mut signals: Vec<Tick> = self
            .states
            .iter()
            .filter_map(|entry| entry.last_tick.clone())
            .filter(|tick| tick.is_enter())
            .collect();
        signals.sort_by(|a, b| tick_edge(b).partial_cmp(&tick_edge(a)).unwrap_or(std::cmp::Ordering::Equal));
        signals
    }

    pub fn tracked_market_count(&self) -> usize {
        self.states.len()
    }
}

fn tick_edge(tick: &Tick) -> f64 {
    let (Some(edges), Some(rec)) = (&tick.edges, &tick.rec) else { return 0.0 };
    match rec.side {
        scanner_core::Side::Up => edges.edge_up,
        scanner_core::Side::Down => edges.edge_down,
    }
}
