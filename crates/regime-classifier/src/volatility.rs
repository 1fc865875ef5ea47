use scanner_core::VolatilityClass;

struct Thresholds {
    low: f64,
    high: f64,
}

const CRYPTO_THRESHOLDS: Thresholds = Thresholds { low: 0.05, high: 0.3 };
const NON_CRYPTO_THRESHOLDS: Thresholds = Thresholds { low: 0.5, high: 3.0 };

/// Classify ATR% against category-calibrated thresholds (C11).
pub fn classify_volatility(atr_pct: f64, is_crypto: bool) -> VolatilityClass {
    let thresholds = if is_crypto { &CRYPTO_THRESHOLDS } else { &NON_CRYPTO_THRESHOLDS };

    if atr_pct < thresholds.low {
        VolatilityClass::Low
    } else if atr_pct > thresholds.high {
        VolatilityClass::High
    } else {
        VolatilityClass::Normal
    }
}
