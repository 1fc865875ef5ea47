use chrono::Utc;
use scanner_core::{Candle, CorrelationBias, CorrelationState};
use technical_analysis::{macd, rsi, vwap, vwap_slope};

const RSI_PERIOD: usize = 14;

/// Computes the macro indicator stack and derives a bias from four
/// sub-signal votes: price vs VWAP, RSI>55/<45, MACD histogram sign, VWAP
/// slope sign.
pub fn compute_bias(symbol: &str, candles: &[Candle]) -> Option<CorrelationState> {
    let last = candles.last()?;
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let vwap_series = vwap(candles);
    let last_vwap = *vwap_series.last()?;
    let slope = vwap_slope(&vwap_series, 5).unwrap_or(0.0);
    let rsi_series = rsi(&closes, RSI_PERIOD);
    let last_rsi = *rsi_series.last().unwrap_or(&50.0);
    let macd_result = macd(&closes, 12, 26, 9);
    let last_macd_hist = macd_result.histogram.last().copied().unwrap_or(0.0);

    let mut bullish_votes = 0u32;
    let mut bearish_votes = 0u32;

    if last.close > last_vwap {
        bullish_votes += 1;
    } else if last.close < last_vwap {
        bearish_votes += 1;
    }

    if last_rsi > 55.0 {
        bullish_votes += 1;
    } else if last_rsi < 45.0 {
        bearish_votes += 1;
    }

    if last_macd_hist > 0.0 {
        bullish_votes += 1;
    } else if last_macd_hist < 0.0 {
        bearish_votes += 1;
    }

    if slope > 0.0 {
        bullish_votes += 1;
    } else if slope < 0.0 {
        bearish_votes += 1;
    }

    let (bias, bias_strength) = classify_votes(bullish_votes, bearish_votes);

    Some(CorrelationState {
        symbol: symbol.to_string(),
        last_price: last.close,
        rsi: last_rsi,
        vwap: last_vwap,
        vwap_slope: slope,
        macd_hist: last_macd_hist,
        bias,
        bias_strength,
        updated_at: Utc::now(),
    })
}

fn classify_votes(bullish: u32, bearish: u32) -> (CorrelationBias, f64) {
    if bullish >= 3 {
        (CorrelationBias::Bullish, bullish as f64 / 4.0)
    } else if bearish >= 3 {
        (CorrelationBias::Bearish, bearish as f64 / 4.0)
    } else if bullish == 2 && bearish == 1 {
        (CorrelationBias::LeanBull, bullish as f64 / 4.0)
    } else if bearish == 2 && bullish == 1 {
        (CorrelationBias::LeanBear, bearish as f64 / 4.0)
    } else {
        (CorrelationBias::Neutral, 0.5)
    }
}
