use scanner_core::{
    ClassifiedFeatures, IndicatorSnapshot, MacdState, ObZone, RsiZone, VolatilityClass,
    VwapPosition, VwapSlopeDir,
};

const VWAP_FLAT_BAND: f64 = 1e-6;
const SLOPE_FLAT_BAND: f64 = 1e-9;

fn classify_vwap_position(price: f64, vwap: f64) -> VwapPosition {
    if price > vwap + VWAP_FLAT_BAND {
        VwapPosition::Above
    } else if price < vwap - VWAP_FLAT_BAND {
        VwapPosition::Below
    } else {
        VwapPosition::At
    }
}

fn classify_vwap_slope(slope: f64) -> VwapSlopeDir {
    if slope > SLOPE_FLAT_BAND {
        VwapSlopeDir::Up
    } else if slope < -SLOPE_FLAT_BAND {
        VwapSlopeDir::Down
    } else {
        VwapSlopeDir::Flat
    }
}

fn classify_rsi(rsi: f64) -> RsiZone {
    if rsi <= 30.0 {
        RsiZone::Oversold
    } else if rsi < 45.0 {
        RsiZone::Bearish
    } else if rsi <= 55.0 {
        RsiZone::Neutral
    } else if rsi < 70.0 {
        RsiZone::Bullish
    } else {
        RsiZone::Overbought
    }
}

fn classify_macd(hist: f64, hist_delta: f64) -> MacdState {
    if hist == 0.0 {
        MacdState::Zero
    } else if hist > 0.0 && hist_delta > 0.0 {
        MacdState::ExpandingGreen
    } else if hist > 0.0 {
        MacdState::FadingGreen
    } else if hist_delta < 0.0 {
        MacdState::ExpandingRed
    } else {
        MacdState::FadingRed
    }
}

fn classify_ob_imbalance(imbalance: f64) -> ObZone {
    if imbalance > 1.5 {
        ObZone::StrongBid
    } else if imbalance > 1.2 {
        ObZone::Bid
    } else if imbalance < 0.67 {
        ObZone::StrongAsk
    } else if imbalance < 0.83 {
        ObZone::Ask
    } else {
        ObZone::Balanced
    }
}

/// Discretize the indicator snapshot into the grouping key the weight learner (C9)
/// and signal store (C8) join outcomes by.
pub fn classify_features(
    snapshot: &IndicatorSnapshot,
    price: f64,
    vol_class: VolatilityClass,
) -> ClassifiedFeatures {
    ClassifiedFeatures {
        vwap_position: classify_vwap_position(price, snapshot.vwap),
        vwap_slope_dir: classify_vwap_slope(snapshot.vwap_slope),
        rsi_zone: classify_rsi(snapshot.rsi),
        macd_state: classify_macd(snapshot.macd_hist, snapshot.macd_hist_delta),
        heiken_color: snapshot.heiken_color,
        ob_zone: classify_ob_imbalance(snapshot.ob_imbalance),
        vol_regime: vol_class,
        degenerate: snapshot.degenerate(),
    }
}
