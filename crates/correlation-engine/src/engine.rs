use std::sync::RwLock;

use exchange_client::MacroPriceClient;
use scanner_core::{CorrelationBias, CorrelationState, Market, Side};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, warn};

use crate::bias::compute_bias;

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15);
const KLINE_LOOKBACK: &str = "5m";
const KLINE_LIMIT: u32 = 120;
const DIRECTIONAL_STRENGTH_SCALE: f64 = 0.3;
const ETH_STRENGTH_SCALE: f64 = 0.2;
const LEAN_BONUS: f64 = 1.05;
const MIN_ADJ: f64 = 0.7;
const MAX_ADJ: f64 = 1.3;
const SHORT_DATED_MINUTES: f64 = 240.0;

/// Tracks one macro symbol (BTC by default) and exposes the edge multiplier
/// crypto-tagged markets are adjusted by (C10).
pub struct CorrelationEngine {
    symbol: String,
    macro_client: MacroPriceClient,
    state: RwLock<Option<CorrelationState>>,
}

impl CorrelationEngine {
    pub fn new(symbol: impl Into<String>, macro_client: MacroPriceClient) -> Self {
        Self { symbol: symbol.into(), macro_client, state: RwLock::new(None) }
    }

    pub fn state(&self) -> Option<CorrelationState> {
        self.state.read().expect("correlation state lock poisoned").clone()
    }

    /// Fetch fresh candles and recompute bias. On failure the stale snapshot
    /// is retained rather than cleared.
    pub async fn refresh(&self) -> anyhow::Result<()> {
        match self.macro_client.fetch_klines(&format!("{}USDT", self.symbol), KLINE_LOOKBACK, KLINE_LIMIT).await {
            Ok(candles) => {
                if let Some(new_state) = compute_bias(&self.symbol, &candles) {
                    *self.state.write().expect("correlation state lock poisoned") = Some(new_state);
                }
                Ok(())
            }
            Err(err) => {
                warn!(symbol = %self.symbol, error = %err, "correlation refresh failed, retaining stale snapshot");
                Err(err.into())
            }
        }
    }

    /// Spawns the periodic refresh loop; returns its join handle so the
    /// caller can cancel it on shutdown.
    pub fn spawn_refresh_loop(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(DEFAULT_REFRESH_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = self.refresh().await {
                    error!(error = %err, "correlation engine refresh loop iteration failed");
                }
            }
        })
    }

    pub fn compute_correlation_adj(&self, market: &Market, side: Side, remaining_minutes: f64) -> f64 {
        let Some(state) = self.state() else { return 1.0 };
        compute_adj_from_state(&state, market, side, remaining_minutes)
    }
}

fn is_crypto_tagged(market: &Market) -> bool {
    market.category == "crypto" || market.tags.iter().any(|t| t == "crypto")
}

fn is_eth_tagged(market: &Market) -> bool {
    market.tags.iter().any(|t| t == "eth")
}

fn is_directional_question(market: &Market) -> bool {
    let q = market.question.to_lowercase();
    ["above", "over", "higher"].iter().any(|kw| q.contains(kw))
}

fn side_alignment(bias: CorrelationBias, side: Side) -> Option<bool> {
    match bias {
        CorrelationBias::Bullish | CorrelationBias::LeanBull => Some(side == Side::Up),
        CorrelationBias::Bearish | CorrelationBias::LeanBear => Some(side == Side::Down),
        CorrelationBias::Neutral => None,
    }
}

fn compute_adj_from_state(state: &CorrelationState, market: &Market, side: Side, remaining_minutes: f64) -> f64 {
    if !is_crypto_tagged(market) {
        return 1.0;
    }

    let aligned = side_alignment(state.bias, side);
    let mut adj = if is_eth_tagged(market) {
        match aligned {
            Some(true) => 1.0 + state.bias_strength * ETH_STRENGTH_SCALE,
            Some(false) => 1.0 - state.bias_strength * ETH_STRENGTH_SCALE,
            None => 1.0,
        }
    } else if is_directional_question(market) && remaining_minutes <= SHORT_DATED_MINUTES {
        match aligned {
            Some(true) => 1.0 + state.bias_strength * DIRECTIONAL_STRENGTH_SCALE,
            Some(false) => 1.0 - state.bias_strength * DIRECTIONAL_STRENGTH_SCALE,
            None => 1.0,
        }
    } else {
        1.0
    };

    if matches!(state.bias, CorrelationBias::LeanBull | CorrelationBias::LeanBear) {
        adj *= LEAN_BONUS;
    }

    adj.clamp(MIN_ADJ, MAX_ADJ)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn market(tags: &[&str], question: &str) -> Market {
        Market {
            id: "m1".to_string(),
            question: question.to_string(),
            category: "crypto".to_string(),
            yes_label: "Yes".to_string(),
            no_label: "No".to_string(),
            token_ids: Some(("y".to_string(), "n".to_string())),
            yes_price: 0.5,
            no_price: 0.5,
            liquidity: 1000.0,
            settlement_ts: Utc::now(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            closed: false,
        }
    }

    fn bullish_state() -> CorrelationState {
        CorrelationState {
            symbol: "BTC".to_string(),
            last_price: 100.0,
            rsi: 60.0,
            vwap: 95.0,
            vwap_slope: 0.5,
            macd_hist: 1.0,
            bias: CorrelationBias::Bullish,
            bias_strength: 0.75,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn non_crypto_market_is_unaffected() {
        let m = market(&[], "Will X happen above 100?");
        let adj = compute_adj_from_state(&bullish_state(), &m, Side::Up, 30.0);
        assert_eq!(adj, 1.0);
    }

    #[test]
    fn aligned_short_dated_directional_question_boosts_multiplier() {
        let m = market(&["crypto"], "Will BTC close above 100k?");
        let adj = compute_adj_from_state(&bullish_state(), &m, Side::Up, 30.0);
        assert!(adj > 1.0);
    }

    #[test]
    fn conflicting_side_reduces_multiplier() {
        let m = market(&["crypto"], "Will BTC close above 100k?");
        let adj = compute_adj_from_state(&bullish_state(), &m, Side::Down, 30.0);
        assert!(adj < 1.0);
    }

    #[test]
    fn eth_tagged_market_uses_dampened_scale() {
        let m = market(&["crypto", "eth"], "Will ETH do something?");
        let directional = market(&["crypto"], "Will BTC close above 100k?");
        let eth_adj = compute_adj_from_state(&bullish_state(), &m, Side::Up, 30.0);
        let directional_adj = compute_adj_from_state(&bullish_state(), &directional, Side::Up, 30.0);
        assert!((eth_adj - 1.0) < (directional_adj - 1.0));
    }
}
