use std::collections::HashMap;

use dashmap::DashMap;
use scanner_core::{Action, Tick};
use tracing::debug;

use crate::models::{PositionStatus, VirtualPosition};

const EXTREME_YES_WIN: f64 = 0.9;
const EXTREME_YES_LOSS: f64 = 0.1;

/// Simulated position book driven entirely off emitted ticks: one open
/// position per market at a time, refreshed every cycle, closed on
/// settlement.
pub struct VirtualPortfolio {
    positions: DashMap<String, VirtualPosition>,
}

impl VirtualPortfolio {
    pub fn new() -> Self {
        Self { positions: DashMap::new() }
    }

    /// Handle a `signal:enter` tick. No-op if a position is already open for
    /// this market.
    pub fn open_from_tick(&self, tick: &Tick) -> bool {
        let Some(rec) = &tick.rec else { return false };
        if rec.action != Action::Enter {
            return false;
        }
        if self.positions.get(&tick.market_id).map(|p| p.status == PositionStatus::Open).unwrap_or(false) {
            return false;
        }

        let entry_price = match rec.side {
            scanner_core::Side::Up => tick.prices.up,
            scanner_core::Side::Down => tick.prices.down,
        };
        let bet_pct = tick.kelly.as_ref().map(|k| k.bet_pct).unwrap_or(0.0);

        self.positions.insert(
            tick.market_id.clone(),
            VirtualPosition {
                market_id: tick.market_id.clone(),
                question: tick.question.clone(),
                side: rec.side,
                entry_price,
                bet_pct,
                current_price: entry_price,
                status: PositionStatus::Open,
                opened_at: tick.timestamp,
                closed_at: None,
                pnl_pct: None,
            },
        );
        true
    }

    /// Refresh `current_price` for every open position from the latest tick
    /// of its market (C7 calls this once per broadcast cycle).
    pub fn refresh_prices(&self, latest_ticks: &HashMap<String, Tick>) {
        for mut entry in self.positions.iter_mut() {
            if entry.status != PositionStatus::Open {
                continue;
            }
            if let Some(tick) = latest_ticks.get(entry.market_id.as_str()) {
                entry.current_price = match entry.side {
                    scanner_core::Side::Up => tick.prices.up,
                    scanner_core::Side::Down => tick.prices.down,
                };
            }
        }
    }

    /// Close any open position whose market has settled, computing the
    /// realized `pnlPct`. Returns the positions closed this call.
    pub fn close_settled(&self, latest_ticks: &HashMap<String, Tick>) -> Vec<VirtualPosition> {
        let mut closed = Vec::new();
        for mut entry in self.positions.iter_mut() {
            if entry.status != PositionStatus::Open {
                continue;
            }
            let Some(tick) = latest_ticks.get(entry.market_id.as_str()) else { continue };

            let settled = tick.closed
                || tick.settlement_minutes_remaining <= 0.0
                || tick.prices.up >= EXTREME_YES_WIN
                || tick.prices.up <= EXTREME_YES_LOSS;
            if !settled {
                continue;
            }

            entry.current_price = match entry.side {
                scanner_core::Side::Up => tick.prices.up,
                scanner_core::Side::Down => tick.prices.down,
            };
            entry.pnl_pct = Some(entry.unrealized_pnl_pct());
            entry.status = PositionStatus::Closed;
            entry.closed_at = Some(tick.timestamp);
            debug!(market = %entry.market_id, pnl_pct = entry.pnl_pct, "virtual position closed");
            closed.push(entry.clone());
        }
        closed
    }

    pub fn open_positions(&self) -> Vec<VirtualPosition> {
        self.positions.iter().filter(|e| e.status == PositionStatus::Open).map(|e| e.clone()).collect()
    }

    pub fn closed_positions(&self) -> Vec<VirtualPosition> {
        self.positions.iter().filter(|e| e.status == PositionStatus::Closed).map(|e| e.clone()).collect()
    }
}

impl Default for VirtualPortfolio {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scanner_core::{Edges, KellyResult, MarketPrices, Phase, Recommendation, Strength};

    fn enter_tick(market_id: &str, yes: f64, closed: bool, remaining: f64) -> Tick {
        Tick {
            market_id: market_id.to_string(),
            question: "Will it happen?".to_string(),
            category: "crypto".to_string(),
            timestamp: Utc::now(),
            ok: true,
            reason: None,
            indicators: None,
            regime: None,
            vol_class: None,
            model: None,
            edges: Some(Edges { edge_up: 0.05, edge_down: -0.05 }),
            rec: Some(Recommendation {
                action: Action::Enter,
                side: scanner_core::Side::Up,
                strength: Strength::Good,
                phase: Phase::Mid,
            }),
            order_flow: None,
            confidence: None,
            kelly: Some(KellyResult { bet_pct: 0.02, kelly_full: 0.08, odds: 1.2, tier: scanner_core::ConfidenceTier::Medium }),
            prices: MarketPrices { last: yes, up: yes, down: 1.0 - yes },
            settlement_minutes_remaining: remaining,
            closed,
            classified: None,
        }
    }

    #[test]
    fn opening_twice_for_the_same_market_is_a_no_op() {
        let portfolio = VirtualPortfolio::new();
        assert!(portfolio.open_from_tick(&enter_tick("m1", 0.4, false, 30.0)));
        assert!(!portfolio.open_from_tick(&enter_tick("m1", 0.45, false, 30.0)));
        assert_eq!(portfolio.open_positions().len(), 1);
    }

    #[test]
    fn settlement_closes_position_with_correct_pnl() {
        let portfolio = VirtualPortfolio::new();
        portfolio.open_from_tick(&enter_tick("m1", 0.4, false, 30.0));

        let mut latest = HashMap::new();
        latest.insert("m1".to_string(), enter_tick("m1", 0.95, false, 0.0));

        let closed = portfolio.close_settled(&latest);
        assert_eq!(closed.len(), 1);
        let pnl = closed[0].pnl_pct.unwrap();
        let expected = ((0.95 - 0.4) / 0.4) * 0.02 * 100.0;
        assert!((pnl - expected).abs() < 1e-9);
    }

    #[test]
    fn refresh_prices_updates_open_positions_only() {
        let portfolio = VirtualPortfolio::new();
        portfolio.open_from_tick(&enter_tick("m1", 0.4, false, 30.0));

        let mut latest = HashMap::new();
        latest.insert("m1".to_string(), enter_tick("m1", 0.6, false, 20.0));
        portfolio.refresh_prices(&latest);

        assert_eq!(portfolio.open_positions()[0].current_price, 0.6);
    }
}
