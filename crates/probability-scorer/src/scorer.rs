use crate::decay::{decay_factor, indicator_horizon_minutes};
use scanner_core::{HeikenColor, IndicatorSnapshot, Market, ScoredProbability, WeightKey, WeightLookup};

const HEIKEN_STREAK_MIN: u32 = 2;

/// Weighted up/down vote over one indicator snapshot, with the degenerate fallback
/// and time-decay transform from the probability model (C3).
pub fn score(
    snapshot: &IndicatorSnapshot,
    price: f64,
    market: &Market,
    remaining_minutes: f64,
    weights: &dyn WeightLookup,
) -> ScoredProbability {
    let degenerate = snapshot.degenerate();

    let (up, down) = if degenerate {
        score_ob_only(snapshot)
    } else {
        score_full(snapshot, price, weights)
    };

    let raw_up = up / (up + down);
    let horizon = indicator_horizon_minutes(market, remaining_minutes);
    let decay = decay_factor(remaining_minutes, horizon);
    let adjusted_up = (0.5 + (raw_up - 0.5) * decay).clamp(0.0, 1.0);

    ScoredProbability {
        raw_up,
        adjusted_up,
        adjusted_down: 1.0 - adjusted_up,
        degenerate,
    }
}

fn score_full(snapshot: &IndicatorSnapshot, price: f64, weights: &dyn WeightLookup) -> (f64, f64) {
    let mut up = 1.0_f64;
    let mut down = 1.0_f64;

    let w = |feature: &str, value: &str| weights.weight(&WeightKey::new(feature, value));

    if price > snapshot.vwap {
        let wt = w("price_vs_vwap", "above");
        up += 2.0 * wt;
    } else if price < snapshot.vwap {
        let wt = w("price_vs_vwap", "below");
        down += 2.0 * wt;
    }

    if snapshot.vwap_slope > 0.0 {
        let wt = w("vwap_slope", "up");
        up += 2.0 * wt;
    } else if snapshot.vwap_slope < 0.0 {
        let wt = w("vwap_slope", "down");
        down += 2.0 * wt;
    }

    if snapshot.rsi > 55.0 && snapshot.rsi_slope > 0.0 {
        let wt = w("rsi_momentum", "bullish");
        up += 2.0 * wt;
    } else if snapshot.rsi < 45.0 && snapshot.rsi_slope < 0.0 {
        let wt = w("rsi_momentum", "bearish");
        down += 2.0 * wt;
    }

    if snapshot.macd_hist > 0.0 && snapshot.macd_hist_delta > 0.0 {
        let wt = w("macd_expansion", "green");
        up += 2.0 * wt;
    } else if snapshot.macd_hist < 0.0 && snapshot.macd_hist_delta < 0.0 {
        let wt = w("macd_expansion", "red");
        down += 2.0 * wt;
    }

    if snapshot.macd > 0.0 {
        let wt = w("macd_sign", "positive");
        up += wt;
    } else if snapshot.macd < 0.0 {
        let wt = w("macd_sign", "negative");
        down += wt;
    }

    if snapshot.heiken_streak >= HEIKEN_STREAK_MIN {
        match snapshot.heiken_color {
            HeikenColor::Green => {
                let wt = w("heiken_streak", "green");
                up += wt;
            }
            HeikenColor::Red => {
                let wt = w("heiken_streak", "red");
                down += wt;
            }
        }
    }

    if snapshot.failed_vwap_reclaim {
        down += 3.0;
    }

    apply_ob_imbalance(snapshot.ob_imbalance, &mut up, &mut down, |tier| {
        w("ob_imbalance", tier)
    });

    (up, down)
}

/// Degenerate path: only orderbook imbalance, each tier capped at +/-1 regardless of
/// the learned weight.
fn score_ob_only(snapshot: &IndicatorSnapshot) -> (f64, f64) {
    let mut up = 1.0_f64;
    let mut down = 1.0_f64;
    apply_ob_imbalance(snapshot.ob_imbalance, &mut up, &mut down, |_| 0.5);
    (up, down)
}

fn apply_ob_imbalance(imbalance: f64, up: &mut f64, down: &mut f64, weight_for: impl Fn(&str) -> f64) {
    if imbalance > 1.5 {
        *up += 2.0 * weight_for("strong_bid");
    } else if imbalance > 1.2 {
        *up += 1.0 * weight_for("bid");
    } else if imbalance < 0.67 {
        *down += 2.0 * weight_for("strong_ask");
    } else if imbalance < 0.83 {
        *down += 1.0 * weight_for("ask");
    }
}
