use scanner_core::{ConfidenceTier, KellyResult};

/// Fractional-Kelly multiplier applied before the tier scale (typically quarter-Kelly).
const FRACTIONAL_KELLY: f64 = 0.25;
/// Hard cap on the final bet size as a fraction of bankroll.
const MAX_BET_PCT: f64 = 0.05;

/// Full Kelly from `(p*b - q) / b`, scaled by a fractional factor and the
/// confidence tier, then clamped to `[0, MAX_BET_PCT]` of bankroll (C5).
pub fn size_position(model_prob: f64, market_price: f64, tier: ConfidenceTier) -> KellyResult {
    if market_price <= 0.0 || market_price >= 1.0 {
        return KellyResult {
            bet_pct: 0.0,
            kelly_full: 0.0,
            odds: 0.0,
            tier,
        };
    }

    let p = model_prob.clamp(0.0, 1.0);
    let q = 1.0 - p;
    let b = (1.0 / market_price) - 1.0;

    let kelly_full = if b > 0.0 { (p * b - q) / b } else { 0.0 };
    let fractional = kelly_full * FRACTIONAL_KELLY * tier.kelly_scale();
    let bet_pct = fractional.clamp(0.0, MAX_BET_PCT);

    KellyResult {
        bet_pct,
        kelly_full,
        odds: b,
        tier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn positive_edge_yields_positive_bet() {
        let result = size_position(0.65, 0.5, ConfidenceTier::High);
        assert!(result.bet_pct > 0.0);
        assert!(result.bet_pct <= 0.05);
    }

    #[test]
    fn no_edge_yields_zero_bet() {
        let result = size_position(0.5, 0.5, ConfidenceTier::High);
        assert_abs_diff_eq!(result.bet_pct, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn very_low_tier_zeroes_out_the_bet() {
        let result = size_position(0.8, 0.4, ConfidenceTier::VeryLow);
        assert_eq!(result.bet_pct, 0.0);
    }

    #[test]
    fn bet_is_capped_at_five_percent() {
        let result = size_position(0.95, 0.1, ConfidenceTier::High);
        assert_abs_diff_eq!(result.bet_pct, 0.05, epsilon = 1e-9);
    }
}
