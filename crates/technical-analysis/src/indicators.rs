use scanner_core::Candle;

/// Return val if it is finite, otherwise return default.
#[inline]
pub fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(finite_or(sum / period as f64, 0.0));
    }
    result
}

/// Exponential Moving Average
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.is_empty() {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len());
    let multiplier = 2.0 / (period as f64 + 1.0);

    if data.len() < period {
        let avg = data.iter().sum::<f64>() / data.len() as f64;
        return vec![finite_or(avg, 0.0)];
    }

    let sma_seed: f64 = data[..period].iter().sum::<f64>() / period as f64;
    let sma_seed = finite_or(sma_seed, 0.0);

    for _ in 0..period {
        result.push(sma_seed);
    }

    for i in period..data.len() {
        let prev_ema = result[i - 1];
        let ema_val = (data[i] - prev_ema) * multiplier + prev_ema;
        result.push(finite_or(ema_val, prev_ema));
    }

    result
}

/// Wilder's RSI. Returns one value per close once `period + 1` closes exist.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let mut gains = Vec::new();
    let mut losses = Vec::new();

    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut rsi_values = Vec::with_capacity(data.len() - period);

    let seed_rs = if avg_loss == 0.0 { 100.0 } else { avg_gain / avg_loss };
    let seed_rsi = 100.0 - (100.0 / (1.0 + seed_rs));
    rsi_values.push(finite_or(seed_rsi, 50.0));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;

        let rs = if avg_loss == 0.0 {
            100.0
        } else {
            avg_gain / avg_loss
        };

        let rsi = 100.0 - (100.0 / (1.0 + rs));
        rsi_values.push(finite_or(rsi, 50.0));
    }

    rsi_values
}

/// `true` when RSI has pinned to an extreme (>=99 or <=1) and stopped carrying signal.
pub fn rsi_is_degenerate(rsi_value: f64) -> bool {
    rsi_value >= 99.0 || rsi_value <= 1.0
}

pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl MacdResult {
    /// hist minus the prior hist value; `None` with fewer than two histogram points.
    pub fn hist_delta(&self) -> Option<f64> {
        let n = self.histogram.len();
        if n < 2 {
            return None;
        }
        Some(self.histogram[n - 1] - self.histogram[n - 2])
    }

    /// Degenerate when the latest macd, signal and hist are all exactly zero.
    pub fn is_degenerate(&self) -> bool {
        let last = |v: &[f64]| v.last().copied().unwrap_or(f64::NAN);
        last(&self.macd_line) == 0.0 && last(&self.signal_line) == 0.0 && last(&self.histogram) == 0.0
    }
}

/// Standard EMA-of-EMAs MACD.
pub fn macd(data: &[f64], fast_period: usize, slow_period: usize, signal_period: usize) -> MacdResult {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || slow_period < fast_period {
        return MacdResult {
            macd_line: vec![],
            signal_line: vec![],
            histogram: vec![],
        };
    }

    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);

    let offset = slow_period - fast_period;
    let mut macd_line = Vec::new();

    for i in offset..ema_fast.len() {
        macd_line.push(ema_fast[i] - ema_slow[i - offset]);
    }

    let signal_line = ema(&macd_line, signal_period);

    let mut histogram = Vec::new();
    let hist_offset = macd_line.len().saturating_sub(signal_line.len());
    for i in 0..signal_line.len() {
        histogram.push(macd_line[i + hist_offset] - signal_line[i]);
    }

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

impl BollingerBands {
    /// `(upper - lower) / middle` for the latest bar.
    pub fn width(&self) -> Option<f64> {
        let u = *self.upper.last()?;
        let l = *self.lower.last()?;
        let m = *self.middle.last()?;
        if m.abs() <= f64::EPSILON {
            return None;
        }
        Some((u - l) / m)
    }

    pub fn is_squeeze(&self) -> bool {
        self.width().map(|w| w < 0.02).unwrap_or(false)
    }
}

pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    if period == 0 || data.len() < period {
        return BollingerBands {
            upper: vec![],
            middle: vec![],
            lower: vec![],
        };
    }

    let middle = sma(data, period);
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for i in period - 1..data.len() {
        let slice = &data[i + 1 - period..=i];
        let mean = middle[i + 1 - period];
        let variance: f64 = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();

        upper.push(finite_or(mean + std_dev * std, mean));
        lower.push(finite_or(mean - std_dev * std, mean));
    }

    BollingerBands { upper, middle, lower }
}

/// EMA-smoothed Average True Range, and `atrPct = atr / lastClose * 100`.
pub fn atr(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return vec![];
    }

    let mut true_ranges = Vec::new();
    for i in 1..candles.len() {
        let high_low = candles[i].high - candles[i].low;
        let high_close = (candles[i].high - candles[i - 1].close).abs();
        let low_close = (candles[i].low - candles[i - 1].close).abs();
        true_ranges.push(high_low.max(high_close).max(low_close));
    }

    let mut atr_values = Vec::new();
    let mut atr = finite_or(true_ranges[..period].iter().sum::<f64>() / period as f64, 0.0);
    atr_values.push(atr);

    for tr in &true_ranges[period..] {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
        atr_values.push(finite_or(atr, 0.0));
    }

    atr_values
}

pub fn atr_pct(atr_values: &[f64], last_close: f64) -> Option<f64> {
    let last = *atr_values.last()?;
    if last_close.abs() <= f64::EPSILON {
        return None;
    }
    Some(last / last_close * 100.0)
}

/// Cumulative (typical-price x volume) / cumulative volume over the sequence.
pub fn vwap(candles: &[Candle]) -> Vec<f64> {
    if candles.is_empty() {
        return vec![];
    }

    let mut vwap_values = Vec::with_capacity(candles.len());
    let mut cumulative_tpv = 0.0;
    let mut cumulative_volume = 0.0;

    for candle in candles {
        let typical_price = candle.typical_price();
        cumulative_tpv += typical_price * candle.volume;
        cumulative_volume += candle.volume;

        let vwap = if cumulative_volume > 0.0 {
            cumulative_tpv / cumulative_volume
        } else {
            typical_price
        };

        vwap_values.push(finite_or(vwap, typical_price));
    }

    vwap_values
}

/// `(vwap[now] - vwap[now-N]) / N`; `None` with fewer than `n + 1` points.
pub fn vwap_slope(vwap_series: &[f64], n: usize) -> Option<f64> {
    if n == 0 || vwap_series.len() < n + 1 {
        return None;
    }
    let last = *vwap_series.last()?;
    let prior = vwap_series[vwap_series.len() - 1 - n];
    Some((last - prior) / n as f64)
}

/// Count sign changes of `close - vwap` across the trailing `w` bars.
pub fn vwap_cross_count(closes: &[f64], vwap_series: &[f64], w: usize) -> usize {
    let n = closes.len().min(vwap_series.len());
    if n < 2 || w < 2 {
        return 0;
    }
    let window = w.min(n);
    let closes = &closes[closes.len() - window..];
    let vwaps = &vwap_series[vwap_series.len() - window..];

    let mut crosses = 0;
    let mut prev_sign = (closes[0] - vwaps[0]).signum();
    for i in 1..window {
        let sign = (closes[i] - vwaps[i]).signum();
        if sign != 0.0 && prev_sign != 0.0 && sign != prev_sign {
            crosses += 1;
        }
        if sign != 0.0 {
            prev_sign = sign;
        }
    }
    crosses
}

/// Last close below vwap AND prior close above prior vwap.
pub fn failed_vwap_reclaim(closes: &[f64], vwap_series: &[f64]) -> bool {
    let n = closes.len().min(vwap_series.len());
    if n < 2 {
        return false;
    }
    let last_close = closes[closes.len() - 1];
    let last_vwap = vwap_series[vwap_series.len() - 1];
    let prior_close = closes[closes.len() - 2];
    let prior_vwap = vwap_series[vwap_series.len() - 2];
    last_close < last_vwap && prior_close > prior_vwap
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeikenColor {
    Green,
    Red,
}

#[derive(Debug, Clone, Copy)]
pub struct HeikenAshiCandle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl HeikenAshiCandle {
    pub fn color(&self) -> HeikenColor {
        if self.close >= self.open {
            HeikenColor::Green
        } else {
            HeikenColor::Red
        }
    }
}

/// Standard Heiken-Ashi recurrence: `ha_close` is the OHLC average, `ha_open` is the
/// midpoint of the prior Heiken-Ashi candle (seeded from the raw first candle).
pub fn heiken_ashi(candles: &[Candle]) -> Vec<HeikenAshiCandle> {
    if candles.is_empty() {
        return vec![];
    }

    let mut result = Vec::with_capacity(candles.len());
    let first = &candles[0];
    let mut prev = HeikenAshiCandle {
        open: (first.open + first.close) / 2.0,
        high: first.high,
        low: first.low,
        close: (first.open + first.high + first.low + first.close) / 4.0,
    };
    result.push(prev);

    for candle in &candles[1..] {
        let ha_close = (candle.open + candle.high + candle.low + candle.close) / 4.0;
        let ha_open = (prev.open + prev.close) / 2.0;
        let ha_high = candle.high.max(ha_open).max(ha_close);
        let ha_low = candle.low.min(ha_open).min(ha_close);
        let current = HeikenAshiCandle {
            open: ha_open,
            high: ha_high,
            low: ha_low,
            close: ha_close,
        };
        result.push(current);
        prev = current;
    }

    result
}

/// Color of the most recent Heiken-Ashi candle and the length of its same-color streak.
pub fn heiken_count_consecutive(candles: &[HeikenAshiCandle]) -> Option<(HeikenColor, usize)> {
    let last_color = candles.last()?.color();
    let streak = candles
        .iter()
        .rev()
        .take_while(|c| c.color() == last_color)
        .count();
    Some((last_color, streak))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(t: i64, o: f64, h: f64, l: f64, c: f64, v: f64) -> Candle {
        Candle {
            start: Utc.timestamp_opt(t, 0).single().unwrap(),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: v,
        }
    }

    #[test]
    fn rsi_requires_period_plus_one_closes() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        assert!(rsi(&closes, 14).is_empty());
        assert!(!rsi(&closes, 9).is_empty());
    }

    #[test]
    fn rsi_pinned_high_is_degenerate() {
        assert!(rsi_is_degenerate(99.5));
        assert!(rsi_is_degenerate(0.5));
        assert!(!rsi_is_degenerate(55.0));
    }

    #[test]
    fn macd_all_zero_is_degenerate() {
        let flat = vec![100.0; 40];
        let result = macd(&flat, 12, 26, 9);
        assert!(result.is_degenerate());
    }

    #[test]
    fn bollinger_width_flags_squeeze() {
        let flat = vec![100.0; 25];
        let bands = bollinger_bands(&flat, 20, 2.0);
        assert!(bands.is_squeeze());
    }

    #[test]
    fn vwap_slope_matches_definition() {
        let series = vec![10.0, 10.0, 10.0, 10.0, 12.0];
        let slope = vwap_slope(&series, 4).unwrap();
        assert!((slope - 0.5).abs() < 1e-9);
    }

    #[test]
    fn vwap_cross_count_counts_sign_changes() {
        let closes = vec![9.0, 11.0, 9.0, 11.0, 9.0];
        let vwaps = vec![10.0, 10.0, 10.0, 10.0, 10.0];
        assert_eq!(vwap_cross_count(&closes, &vwaps, 5), 4);
    }

    #[test]
    fn failed_vwap_reclaim_detects_rejection() {
        let closes = vec![10.5, 9.8];
        let vwaps = vec![10.0, 10.0];
        assert!(failed_vwap_reclaim(&closes, &vwaps));
    }

    #[test]
    fn heiken_ashi_tracks_consecutive_streak() {
        let candles = vec![
            candle(0, 10.0, 11.0, 9.0, 10.5, 100.0),
            candle(1, 10.5, 12.0, 10.0, 11.5, 100.0),
            candle(2, 11.5, 13.0, 11.0, 12.5, 100.0),
        ];
        let ha = heiken_ashi(&candles);
        let (color, streak) = heiken_count_consecutive(&ha).unwrap();
        assert_eq!(color, HeikenColor::Green);
        assert!(streak >= 2);
    }
}
