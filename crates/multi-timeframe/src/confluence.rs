use chrono::{DateTime, Utc};
use scanner_core::{Candle, Side};
use technical_analysis::sma;

/// Bar-count multiples the native candle series is resampled into before
/// trend direction is compared across them. The scanner only ever polls one
/// native interval per market, so "multiple timeframes" here means
/// aggregating that single series rather than issuing extra upstream calls.
const RESAMPLE_MULTIPLES: [usize; 3] = [1, 3, 6];

const SMA_FAST: usize = 10;
const SMA_SLOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

/// Aggregates consecutive native candles into `multiple`-sized buckets,
/// summing volume and taking open/high/low/close from the bucket's edges.
fn resample(candles: &[Candle], multiple: usize) -> Vec<Candle> {
    if multiple <= 1 {
        return candles.to_vec();
    }
    candles
        .chunks(multiple)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let open = chunk.first().unwrap().open;
            let close = chunk.last().unwrap().close;
            let high = chunk.iter().fold(f64::MIN, |acc, c| acc.max(c.high));
            let low = chunk.iter().fold(f64::MAX, |acc, c| acc.min(c.low));
            let volume = chunk.iter().map(|c| c.volume).sum();
            Candle { start: chunk.last().unwrap().start, open, high, low, close, volume }
        })
        .collect()
}

/// SMA10 vs SMA20 crossover on the resampled series, the same trend rule
/// the indicator library applies at native resolution.
fn detect_trend(candles: &[Candle]) -> Option<TrendDirection> {
    if candles.len() < SMA_SLOW {
        return None;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let fast = *sma(&closes, SMA_FAST).last()?;
    let slow = *sma(&closes, SMA_SLOW).last()?;
    if (fast - slow).abs() < f64::EPSILON {
        Some(TrendDirection::Flat)
    } else if fast > slow {
        Some(TrendDirection::Up)
    } else {
        Some(TrendDirection::Down)
    }
}

#[derive(Debug, Clone)]
pub struct TrendAlignment {
    pub aligned_count: u32,
    pub conflicting_count: u32,
    pub evaluated_at: DateTime<Utc>,
}

impl TrendAlignment {
    /// Multiplier applied to the effective edge threshold (C4): strong
    /// cross-timeframe agreement relaxes the bar for entry.
    pub fn confluence_multiplier(&self) -> f64 {
        match self.aligned_count {
            n if n >= 3 => 1.4,
            2 => 1.2,
            1 => 1.05,
            _ => 1.0,
        }
    }
}

/// Compares the provisional trade `side` against the trend direction found
/// on each resampled timeframe, counting agreement and disagreement.
pub fn trend_alignment(candles: &[Candle], side: Side, now: DateTime<Utc>) -> TrendAlignment {
    let mut aligned = 0;
    let mut conflicting = 0;

    for &multiple in RESAMPLE_MULTIPLES.iter() {
        let resampled = resample(candles, multiple);
        match detect_trend(&resampled) {
            Some(TrendDirection::Up) if side == Side::Up => aligned += 1,
            Some(TrendDirection::Down) if side == Side::Down => aligned += 1,
            Some(TrendDirection::Up) | Some(TrendDirection::Down) => conflicting += 1,
            Some(TrendDirection::Flat) | None => {}
        }
    }

    TrendAlignment { aligned_count: aligned, conflicting_count: conflicting, evaluated_at: now }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(i: usize, close: f64) -> Candle {
        Candle {
            start: Utc::now() + chrono::Duration::minutes(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10.0,
        }
    }

    fn rising_series(n: usize) -> Vec<Candle> {
        (0..n).map(|i| candle(i, 100.0 + i as f64)).collect()
    }

    #[test]
    fn resample_groups_bars_and_preserves_edges() {
        let candles = rising_series(6);
        let resampled = resample(&candles, 3);
        assert_eq!(resampled.len(), 2);
        assert_eq!(resampled[0].open, candles[0].open);
        assert_eq!(resampled[0].close, candles[2].close);
    }

    #[test]
    fn rising_series_detects_up_trend() {
        let candles = rising_series(40);
        assert_eq!(detect_trend(&candles), Some(TrendDirection::Up));
    }

    #[test]
    fn aligned_rising_series_reports_full_agreement() {
        let candles = rising_series(200);
        let alignment = trend_alignment(&candles, Side::Up, Utc::now());
        assert_eq!(alignment.conflicting_count, 0);
        assert!(alignment.aligned_count >= 1);
        assert!(alignment.confluence_multiplier() >= 1.0);
    }

    #[test]
    fn opposite_side_reports_conflict() {
        let candles = rising_series(200);
        let alignment = trend_alignment(&candles, Side::Down, Utc::now());
        assert!(alignment.conflicting_count >= 1);
        assert_eq!(alignment.aligned_count, 0);
    }
}
