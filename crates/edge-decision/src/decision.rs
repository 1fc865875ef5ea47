use probability_scorer::indicator_horizon_minutes;
use scanner_core::{Action, Edges, Market, Phase, Recommendation, Regime, Side, Strength, VolatilityClass};

/// Minimum modeled edge, before vol/confluence/regime scaling, to justify an ENTER.
pub const BASE_THRESHOLD: f64 = 0.04;

/// CHOP requires a stricter effective threshold on top of the volatility multiplier.
const CHOP_PENALTY_MULTIPLIER: f64 = 1.3;
/// TREND aligned with the signal side relaxes the effective threshold.
const TREND_ALIGNED_RELAXATION: f64 = 0.85;

const STRONG_EDGE_MULTIPLE: f64 = 2.0;
const GOOD_EDGE_MULTIPLE: f64 = 1.5;

/// Effective ENTER threshold after vol/confluence/regime scaling.
pub fn effective_threshold(
    vol_class: VolatilityClass,
    confluence_multiplier: f64,
    regime: Regime,
    side: Side,
) -> f64 {
    let confluence_multiplier = if confluence_multiplier > 0.0 {
        confluence_multiplier
    } else {
        1.0
    };

    let mut threshold = BASE_THRESHOLD * vol_class.multiplier() / confluence_multiplier;

    threshold *= match regime {
        Regime::Chop => CHOP_PENALTY_MULTIPLIER,
        Regime::TrendUp if side == Side::Up => TREND_ALIGNED_RELAXATION,
        Regime::TrendDown if side == Side::Down => TREND_ALIGNED_RELAXATION,
        _ => 1.0,
    };

    threshold
}

/// Edge up/down from the adjusted model probabilities vs. market prices.
pub fn compute_edges(model_up: f64, model_down: f64, market_yes: f64, market_no: f64) -> Edges {
    Edges {
        edge_up: model_up - market_yes,
        edge_down: model_down - market_no,
    }
}

fn classify_strength(edge: f64, threshold: f64) -> Strength {
    if threshold <= 0.0 {
        return Strength::Weak;
    }
    let multiple = edge / threshold;
    if multiple >= STRONG_EDGE_MULTIPLE {
        Strength::Strong
    } else if multiple >= GOOD_EDGE_MULTIPLE {
        Strength::Good
    } else {
        Strength::Weak
    }
}

fn classify_phase(remaining_minutes: f64, horizon_minutes: f64) -> Phase {
    if remaining_minutes <= horizon_minutes * 0.25 {
        Phase::Late
    } else if remaining_minutes <= horizon_minutes {
        Phase::Mid
    } else {
        Phase::Early
    }
}

/// Full C4 decision: which side has the larger edge, whether it clears the
/// scaled threshold, and the strength/phase classification for the tick.
#[allow(clippy::too_many_arguments)]
pub fn decide(
    edges: Edges,
    market: &Market,
    remaining_minutes: f64,
    vol_class: VolatilityClass,
    confluence_multiplier: f64,
    regime: Regime,
) -> Recommendation {
    let (side, edge) = if edges.edge_up >= edges.edge_down {
        (Side::Up, edges.edge_up)
    } else {
        (Side::Down, edges.edge_down)
    };

    let threshold = effective_threshold(vol_class, confluence_multiplier, regime, side);
    let horizon = indicator_horizon_minutes(market, remaining_minutes);
    let phase = classify_phase(remaining_minutes, horizon);

    if edge < threshold {
        return Recommendation {
            action: Action::Pass,
            side,
            strength: Strength::Weak,
            phase,
        };
    }

    Recommendation {
        action: Action::Enter,
        side,
        strength: classify_strength(edge, threshold),
        phase,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn market() -> Market {
        Market {
            id: "m1".into(),
            question: "q".into(),
            category: "crypto".into(),
            yes_label: "YES".into(),
            no_label: "NO".into(),
            token_ids: Some(("a".into(), "b".into())),
            yes_price: 0.5,
            no_price: 0.5,
            liquidity: 1000.0,
            settlement_ts: Utc::now(),
            tags: vec!["crypto".into()],
            closed: false,
        }
    }

    #[test]
    fn passes_when_edge_below_threshold() {
        let edges = Edges { edge_up: 0.01, edge_down: -0.01 };
        let rec = decide(edges, &market(), 100.0, VolatilityClass::Normal, 1.0, Regime::Range);
        assert_eq!(rec.action, Action::Pass);
    }

    #[test]
    fn enters_strong_when_edge_clears_by_double_threshold() {
        let edges = Edges { edge_up: 0.12, edge_down: -0.12 };
        let rec = decide(edges, &market(), 100.0, VolatilityClass::Normal, 1.0, Regime::Range);
        assert_eq!(rec.action, Action::Enter);
        assert_eq!(rec.strength, Strength::Strong);
        assert_eq!(rec.side, Side::Up);
    }

    #[test]
    fn chop_regime_raises_effective_threshold() {
        let range = effective_threshold(VolatilityClass::Normal, 1.0, Regime::Range, Side::Up);
        let chop = effective_threshold(VolatilityClass::Normal, 1.0, Regime::Chop, Side::Up);
        assert!(chop > range);
    }

    #[test]
    fn aligned_trend_lowers_effective_threshold() {
        let neutral = effective_threshold(VolatilityClass::Normal, 1.0, Regime::Range, Side::Up);
        let aligned = effective_threshold(VolatilityClass::Normal, 1.0, Regime::TrendUp, Side::Up);
        assert!(aligned < neutral);
    }

    #[test]
    fn confluence_divides_effective_threshold() {
        let solo = effective_threshold(VolatilityClass::Normal, 1.0, Regime::Range, Side::Up);
        let confluent = effective_threshold(VolatilityClass::Normal, 2.0, Regime::Range, Side::Up);
        assert!(confluent < solo);
    }
}
