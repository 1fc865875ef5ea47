use scanner_core::Market;

const SHORT_DATED_CRYPTO_HORIZON: f64 = 15.0;
const LONGER_CRYPTO_HORIZON: f64 = 60.0;
const NON_CRYPTO_HORIZON: f64 = 240.0;

/// Boundary between a "short-dated" and a "longer" crypto market, in minutes to
/// settlement at classification time.
const SHORT_DATED_CUTOFF_MINUTES: f64 = 240.0;

/// Indicator horizon `H` (minutes) used by the time-decay transform.
pub fn indicator_horizon_minutes(market: &Market, remaining_minutes: f64) -> f64 {
    if !market.is_crypto() {
        return NON_CRYPTO_HORIZON;
    }
    if remaining_minutes <= SHORT_DATED_CUTOFF_MINUTES {
        SHORT_DATED_CRYPTO_HORIZON
    } else {
        LONGER_CRYPTO_HORIZON
    }
}

/// Linear shrink inside the horizon, gradual sqrt decay beyond it.
pub fn decay_factor(remaining_minutes: f64, horizon_minutes: f64) -> f64 {
    if horizon_minutes <= 0.0 {
        return 0.0;
    }
    if remaining_minutes <= horizon_minutes {
        (remaining_minutes / horizon_minutes).clamp(0.0, 1.0)
    } else {
        (horizon_minutes / remaining_minutes).sqrt()
    }
}
