use scanner_core::{Regime, RegimeHistory};

const LOW_VOLUME_FLAT_BAND: f64 = 0.001;
const FREQUENT_CROSS_THRESHOLD: u32 = 3;

/// Inputs the regime derivation reads, all already computed by the indicator
/// library (C2).
#[derive(Debug, Clone, Copy)]
pub struct RegimeInputs {
    pub price: f64,
    pub vwap: f64,
    pub vwap_slope: f64,
    pub vwap_cross_count: u32,
    pub recent_volume: f64,
    pub avg_volume: f64,
}

fn is_low_volume(inputs: &RegimeInputs) -> bool {
    inputs.avg_volume > 0.0 && inputs.recent_volume < inputs.avg_volume
}

/// Priority-ordered regime rules from price/vwap/volume relationships.
fn derive_regime(inputs: &RegimeInputs) -> (Regime, &'static str) {
    let deviation = if inputs.vwap.abs() > f64::EPSILON {
        (inputs.price - inputs.vwap).abs() / inputs.vwap
    } else {
        0.0
    };

    if is_low_volume(inputs) && deviation < LOW_VOLUME_FLAT_BAND {
        return (Regime::Chop, "low_volume_flat");
    }
    if inputs.price > inputs.vwap && inputs.vwap_slope > 0.0 {
        return (Regime::TrendUp, "price_above_vwap_rising");
    }
    if inputs.price < inputs.vwap && inputs.vwap_slope < 0.0 {
        return (Regime::TrendDown, "price_below_vwap_falling");
    }
    if inputs.vwap_cross_count >= FREQUENT_CROSS_THRESHOLD {
        return (Regime::Range, "frequent_cross");
    }
    (Regime::Range, "default")
}

/// Classify the current regime and update the market's transition history,
/// attaching the `reason` string from the rule that matched.
pub fn classify(
    history: &mut RegimeHistory,
    inputs: RegimeInputs,
    now: chrono::DateTime<chrono::Utc>,
) -> scanner_core::RegimeClassification {
    let (regime, reason) = derive_regime(&inputs);
    let mut classification = history.observe(regime, now);
    classification.reason = reason.to_string();
    classification
}
