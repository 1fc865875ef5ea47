use scanner_core::{ConfidenceBreakdown, ConfidenceScore, ConfidenceTier, Regime, Side, VolatilityClass};

/// Raw inputs to the eight-component confidence score (C5). Each field maps to one
/// row of the scoring table; the caller assembles these from the tick's
/// indicators, multi-timeframe confluence, correlation engine and order flow.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInputs {
    pub edge: f64,
    pub major_triggers: u32,
    pub minor_triggers: u32,
    pub degenerate: bool,
    pub aligned_timeframes: u32,
    pub conflicting_timeframes: u32,
    pub corr_adj: f64,
    pub vol_class: VolatilityClass,
    pub order_flow_supports: bool,
    pub order_flow_conflicts: bool,
    pub order_flow_is_deep: bool,
    pub order_flow_aligned_pct: f64,
    pub decay: f64,
    pub regime: Regime,
    pub side: Side,
}

fn edge_magnitude(edge: f64) -> f64 {
    (edge * 100.0).clamp(0.0, 20.0)
}

fn indicator_agreement(major: u32, minor: u32, degenerate: bool) -> f64 {
    if degenerate {
        return 2.0;
    }
    if minor == 0 {
        return 20.0;
    }
    ((major as f64 / minor as f64 - 1.0) * 8.0).clamp(0.0, 20.0)
}

fn confluence(aligned: u32, conflicting: u32) -> f64 {
    if aligned >= 3 {
        15.0
    } else if aligned >= 2 {
        10.0
    } else if aligned >= 1 {
        5.0
    } else if conflicting >= 2 {
        -5.0
    } else {
        0.0
    }
}

fn btc_correlation(corr_adj: f64) -> f64 {
    if corr_adj > 1.1 {
        10.0
    } else if corr_adj > 1.0 {
        5.0
    } else if corr_adj < 0.9 {
        -5.0
    } else if corr_adj < 1.0 {
        -2.0
    } else {
        0.0
    }
}

fn volatility_regime(vol_class: VolatilityClass) -> f64 {
    match vol_class {
        VolatilityClass::Low => 10.0,
        VolatilityClass::Normal => 6.0,
        VolatilityClass::High => 2.0,
    }
}

fn order_flow(supports: bool, conflicts: bool, is_deep: bool, aligned_pct: f64) -> f64 {
    if supports && is_deep {
        15.0
    } else if aligned_pct > 30.0 {
        12.0
    } else if supports {
        8.0
    } else if conflicts {
        -5.0
    } else {
        0.0
    }
}

fn time_decay(decay: f64) -> f64 {
    if (0.6..=0.9).contains(&decay) {
        5.0
    } else if decay >= 0.4 {
        3.0
    } else if decay >= 0.2 {
        1.0
    } else {
        0.0
    }
}

fn regime_quality(regime: Regime, side: Side) -> f64 {
    match regime {
        Regime::TrendUp if side == Side::Up => 5.0,
        Regime::TrendDown if side == Side::Down => 5.0,
        Regime::Range => 2.0,
        Regime::Chop => -3.0,
        _ => 0.0,
    }
}

/// Sum the eight components, normalize to [0, 100], and attach a tier.
pub fn compute_confidence(inputs: ConfidenceInputs) -> ConfidenceScore {
    let breakdown = ConfidenceBreakdown {
        edge_magnitude: edge_magnitude(inputs.edge),
        indicator_agreement: indicator_agreement(inputs.major_triggers, inputs.minor_triggers, inputs.degenerate),
        confluence: confluence(inputs.aligned_timeframes, inputs.conflicting_timeframes),
        btc_correlation: btc_correlation(inputs.corr_adj),
        volatility_regime: volatility_regime(inputs.vol_class),
        order_flow: order_flow(
            inputs.order_flow_supports,
            inputs.order_flow_conflicts,
            inputs.order_flow_is_deep,
            inputs.order_flow_aligned_pct,
        ),
        time_decay: time_decay(inputs.decay),
        regime_quality: regime_quality(inputs.regime, inputs.side),
    };

    let raw = breakdown.edge_magnitude
        + breakdown.indicator_agreement
        + breakdown.confluence
        + breakdown.btc_correlation
        + breakdown.volatility_regime
        + breakdown.order_flow
        + breakdown.time_decay
        + breakdown.regime_quality;

    let score = raw.clamp(0.0, 100.0);

    ConfidenceScore {
        score,
        tier: ConfidenceTier::from_score(score),
        breakdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> ConfidenceInputs {
        ConfidenceInputs {
            edge: 0.1,
            major_triggers: 4,
            minor_triggers: 2,
            degenerate: false,
            aligned_timeframes: 3,
            conflicting_timeframes: 0,
            corr_adj: 1.15,
            vol_class: VolatilityClass::Low,
            order_flow_supports: true,
            order_flow_conflicts: false,
            order_flow_is_deep: true,
            order_flow_aligned_pct: 40.0,
            decay: 0.7,
            regime: Regime::TrendUp,
            side: Side::Up,
        }
    }

    #[test]
    fn strong_alignment_reaches_high_tier() {
        let score = compute_confidence(base_inputs());
        assert_eq!(score.tier, ConfidenceTier::High);
        assert!(score.score >= 80.0);
    }

    #[test]
    fn degenerate_snapshot_caps_indicator_agreement() {
        let mut inputs = base_inputs();
        inputs.degenerate = true;
        let score = compute_confidence(inputs);
        assert_eq!(score.breakdown.indicator_agreement, 2.0);
    }

    #[test]
    fn conflicting_confluence_is_penalized() {
        let mut inputs = base_inputs();
        inputs.aligned_timeframes = 0;
        inputs.conflicting_timeframes = 2;
        let score = compute_confidence(inputs);
        assert_eq!(score.breakdown.confluence, -5.0);
    }
}
