use chrono::{DateTime, Utc};

use correlation_engine::CorrelationEngine;
use edge_decision::{compute_edges, decide};
use exchange_client::{bucket_ticks_into_candles, ExchangeClient, MacroPriceClient};
use kelly_position_sizer::{compute_confidence, size_position, ConfidenceInputs};
use multi_timeframe::trend_alignment;
use probability_scorer::{classify_features, decay_factor, indicator_horizon_minutes, score};
use regime_classifier::{classify, classify_volatility, RegimeInputs};
use scanner_core::{
    Candle, FlowQuality, HeikenColor, IndicatorSnapshot, Market, MarketPrices, RegimeHistory,
    ScannerError, Side, Tick,
};
use weight_learner::{CategoryWeightView, WeightTable};

use crate::order_flow::analyze_order_flow;

const KNOWN_CRYPTO_SYMBOLS: [&str; 6] = ["BTC", "ETH", "SOL", "XRP", "DOGE", "ADA"];
const CRYPTO_KLINE_INTERVAL: &str = "1m";
const CRYPTO_KLINE_LIMIT: u32 = 200;
const PRICE_HISTORY_FIDELITY: u32 = 1;
const SHORT_DATED_BUCKET_CUTOFF_MINUTES: f64 = 240.0;
const SHORT_DATED_BUCKET_SECONDS: i64 = 60;
const LONG_DATED_BUCKET_SECONDS: i64 = 300;

const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_STD: f64 = 2.0;
const ATR_PERIOD: usize = 14;
const VWAP_SLOPE_LOOKBACK: usize = 5;
const VWAP_CROSS_WINDOW: usize = 20;
const HEIKEN_STREAK_MIN: u32 = 2;
const MIN_CANDLES_FOR_INDICATORS: usize = MACD_SLOW + MACD_SIGNAL;

/// Resolves the underlying crypto symbol a market's candle series should be
/// fetched from, from its tags. Non-crypto markets have none.
fn resolve_crypto_symbol(market: &Market) -> Option<String> {
    if !market.is_crypto() {
        return None;
    }
    for tag in &market.tags {
        let upper = tag.to_uppercase();
        if KNOWN_CRYPTO_SYMBOLS.contains(&upper.as_str()) {
            return Some(upper);
        }
    }
    Some("BTC".to_string())
}

fn to_core_heiken(color: technical_analysis::HeikenColor) -> HeikenColor {
    match color {
        technical_analysis::HeikenColor::Green => HeikenColor::Green,
        technical_analysis::HeikenColor::Red => HeikenColor::Red,
    }
}

async fn fetch_candles(
    symbol: Option<&str>,
    yes_token: &str,
    exchange: &ExchangeClient,
    macro_client: &MacroPriceClient,
    remaining_minutes: f64,
) -> Result<Vec<Candle>, ScannerError> {
    if let Some(symbol) = symbol {
        macro_client
            .fetch_klines(&format!("{symbol}USDT"), CRYPTO_KLINE_INTERVAL, CRYPTO_KLINE_LIMIT)
            .await
    } else {
        let bucket_seconds = if remaining_minutes <= SHORT_DATED_BUCKET_CUTOFF_MINUTES {
            SHORT_DATED_BUCKET_SECONDS
        } else {
            LONG_DATED_BUCKET_SECONDS
        };
        let ticks = exchange.fetch_price_history(yes_token, "max", PRICE_HISTORY_FIDELITY).await?;
        Ok(bucket_ticks_into_candles(&ticks, bucket_seconds))
    }
}

/// Computes the full indicator snapshot (C2) from one candle series plus the
/// best-of-book imbalance already read from the YES book.
fn compute_indicator_snapshot(
    candles: &[Candle],
    ob_imbalance: f64,
) -> Result<IndicatorSnapshot, ScannerError> {
    if candles.len() < MIN_CANDLES_FOR_INDICATORS {
        return Err(ScannerError::InsufficientData(format!(
            "need at least {MIN_CANDLES_FOR_INDICATORS} candles, got {}",
            candles.len()
        )));
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let last_close = *closes.last().unwrap();

    let vwap_series = technical_analysis::vwap(candles);
    let vwap = *vwap_series.last().unwrap_or(&last_close);
    let vwap_slope = technical_analysis::vwap_slope(&vwap_series, VWAP_SLOPE_LOOKBACK).unwrap_or(0.0);

    let rsi_series = technical_analysis::rsi(&closes, RSI_PERIOD);
    let rsi = *rsi_series.last().unwrap_or(&50.0);
    let rsi_slope = if rsi_series.len() >= 2 {
        rsi_series[rsi_series.len() - 1] - rsi_series[rsi_series.len() - 2]
    } else {
        0.0
    };

    let macd_result = technical_analysis::macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let macd = macd_result.macd_line.last().copied().unwrap_or(0.0);
    let macd_signal = macd_result.signal_line.last().copied().unwrap_or(0.0);
    let macd_hist = macd_result.histogram.last().copied().unwrap_or(0.0);
    let macd_hist_delta = macd_result.hist_delta().unwrap_or(0.0);

    let heiken_candles = technical_analysis::heiken_ashi(candles);
    let (heiken_color, heiken_streak) = technical_analysis::heiken_count_consecutive(&heiken_candles)
        .map(|(color, streak)| (to_core_heiken(color), streak as u32))
        .unwrap_or((HeikenColor::Green, 0));

    let atr_series = technical_analysis::atr(candles, ATR_PERIOD);
    let atr = atr_series.last().copied().unwrap_or(0.0);
    let atr_pct = technical_analysis::atr_pct(&atr_series, last_close).unwrap_or(0.0);

    let bollinger = technical_analysis::bollinger_bands(&closes, BOLLINGER_PERIOD, BOLLINGER_STD);
    let bollinger_width = bollinger.width().unwrap_or(0.0);
    let bollinger_squeeze = bollinger.is_squeeze();

    let vwap_cross_count =
        technical_analysis::vwap_cross_count(&closes, &vwap_series, VWAP_CROSS_WINDOW) as u32;
    let failed_vwap_reclaim = technical_analysis::failed_vwap_reclaim(&closes, &vwap_series);

    let recent_volume = candles.last().map(|c| c.volume).unwrap_or(0.0);
    let avg_volume = candles.iter().map(|c| c.volume).sum::<f64>() / candles.len() as f64;

    Ok(IndicatorSnapshot {
        vwap,
        vwap_slope,
        rsi,
        rsi_slope,
        macd,
        macd_signal,
        macd_hist,
        macd_hist_delta,
        heiken_color,
        heiken_streak,
        atr,
        atr_pct,
        bollinger_width,
        bollinger_squeeze,
        vwap_cross_count,
        recent_volume,
        avg_volume,
        failed_vwap_reclaim,
        ob_imbalance,
    })
}

/// Count the major/minor indicator votes (of `probability_scorer::score_full`)
/// that fired in `side`'s direction, for the confidence breakdown (C5).
fn count_triggers(snapshot: &IndicatorSnapshot, price: f64, side: Side) -> (u32, u32) {
    let up = side == Side::Up;
    let mut major = 0;
    let mut minor = 0;

    if (up && price > snapshot.vwap) || (!up && price < snapshot.vwap) {
        major += 1;
    }
    if (up && snapshot.vwap_slope > 0.0) || (!up && snapshot.vwap_slope < 0.0) {
        major += 1;
    }
    if (up && snapshot.rsi > 55.0 && snapshot.rsi_slope > 0.0)
        || (!up && snapshot.rsi < 45.0 && snapshot.rsi_slope < 0.0)
    {
        major += 1;
    }
    if (up && snapshot.macd_hist > 0.0 && snapshot.macd_hist_delta > 0.0)
        || (!up && snapshot.macd_hist < 0.0 && snapshot.macd_hist_delta < 0.0)
    {
        major += 1;
    }

    if (up && snapshot.macd > 0.0) || (!up && snapshot.macd < 0.0) {
        minor += 1;
    }
    if snapshot.heiken_streak >= HEIKEN_STREAK_MIN {
        match (snapshot.heiken_color, up) {
            (HeikenColor::Green, true) => minor += 1,
            (HeikenColor::Red, false) => minor += 1,
            _ => {}
        }
    }

    (major, minor)
}

fn failed_tick(market: &Market, now: DateTime<Utc>, reason: impl Into<String>) -> Tick {
    Tick {
        market_id: market.id.clone(),
        question: market.question.clone(),
        category: market.category.clone(),
        timestamp: now,
        ok: false,
        reason: Some(reason.into()),
        indicators: None,
        regime: None,
        vol_class: None,
        model: None,
        edges: None,
        rec: None,
        order_flow: None,
        confidence: None,
        kelly: None,
        prices: MarketPrices { last: market.yes_price, up: market.yes_price, down: market.no_price },
        settlement_minutes_remaining: market.minutes_to_settlement(now),
        closed: market.closed,
        classified: None,
    }
}

/// Runs the full C6 poll pipeline for one market: candle + book fetch,
/// indicator computation, regime/volatility classification, probability
/// scoring, correlation-adjusted edge/decision, confluence, order flow,
/// confidence and Kelly sizing. `history` is this market's own regime
/// history, owned by the caller across polls.
pub async fn poll_market(
    market: &Market,
    exchange: &ExchangeClient,
    macro_client: &MacroPriceClient,
    correlation: &CorrelationEngine,
    weights: &WeightTable,
    history: &mut RegimeHistory,
    now: DateTime<Utc>,
) -> Tick {
    let Some((yes_token, no_token)) = market.token_ids.clone() else {
        return failed_tick(market, now, "missing_token_ids");
    };

    let remaining_minutes = market.minutes_to_settlement(now);
    let symbol = resolve_crypto_symbol(market);

    let (candles_result, yes_book_result, no_book_result) = tokio::join!(
        fetch_candles(symbol.as_deref(), &yes_token, exchange, macro_client, remaining_minutes),
        exchange.fetch_book(&yes_token),
        exchange.fetch_book(&no_token),
    );

    let candles = match candles_result {
        Ok(candles) if candles.is_empty() => return failed_tick(market, now, "no_candles"),
        Ok(candles) => candles,
        Err(err) => return failed_tick(market, now, format!("candle_fetch_failed: {err}")),
    };
    let yes_book = match yes_book_result {
        Ok(book) => book,
        Err(err) => return failed_tick(market, now, format!("book_fetch_failed: {err}")),
    };
    let no_book = match no_book_result {
        Ok(book) => book,
        Err(err) => return failed_tick(market, now, format!("book_fetch_failed: {err}")),
    };

    let ob_imbalance = yes_book.imbalance();
    let snapshot = match compute_indicator_snapshot(&candles, ob_imbalance) {
        Ok(snapshot) => snapshot,
        Err(err) => return failed_tick(market, now, format!("indicator_error: {err}")),
    };
    let price = candles.last().unwrap().close;

    let vol_class = classify_volatility(snapshot.atr_pct, market.is_crypto());
    let regime_inputs = RegimeInputs {
        price,
        vwap: snapshot.vwap,
        vwap_slope: snapshot.vwap_slope,
        vwap_cross_count: snapshot.vwap_cross_count,
        recent_volume: snapshot.recent_volume,
        avg_volume: snapshot.avg_volume,
    };
    let regime_classification = classify(history, regime_inputs, now);

    let weight_view = CategoryWeightView::new(weights.clone(), market.category.clone());
    let scored = score(&snapshot, price, market, remaining_minutes, &weight_view);

    let raw_edges = compute_edges(scored.adjusted_up, scored.adjusted_down, market.yes_price, market.no_price);
    let corr_adj_up = correlation.compute_correlation_adj(market, Side::Up, remaining_minutes);
    let corr_adj_down = correlation.compute_correlation_adj(market, Side::Down, remaining_minutes);
    let scaled_edges = scanner_core::Edges {
        edge_up: raw_edges.edge_up * corr_adj_up,
        edge_down: raw_edges.edge_down * corr_adj_down,
    };
    let provisional_side = if scaled_edges.edge_up >= scaled_edges.edge_down { Side::Up } else { Side::Down };

    let alignment = trend_alignment(&candles, provisional_side, now);
    let confluence_multiplier = alignment.confluence_multiplier();

    let rec = decide(
        scaled_edges,
        market,
        remaining_minutes,
        vol_class,
        confluence_multiplier,
        regime_classification.regime,
    );

    let order_flow = analyze_order_flow(&yes_book, &no_book);

    let chosen_edge = match rec.side {
        Side::Up => scaled_edges.edge_up,
        Side::Down => scaled_edges.edge_down,
    };
    let corr_adj_for_side = match rec.side {
        Side::Up => corr_adj_up,
        Side::Down => corr_adj_down,
    };
    let (major_triggers, minor_triggers) = count_triggers(&snapshot, price, rec.side);
    let horizon = indicator_horizon_minutes(market, remaining_minutes);
    let decay = decay_factor(remaining_minutes, horizon);

    let order_flow_supports = match rec.side {
        Side::Up => order_flow.pressure_score > 0.0,
        Side::Down => order_flow.pressure_score < 0.0,
    };
    let order_flow_conflicts = match rec.side {
        Side::Up => order_flow.pressure_score < 0.0,
        Side::Down => order_flow.pressure_score > 0.0,
    };
    let order_flow_is_deep = order_flow.flow_quality == FlowQuality::Deep;
    let order_flow_aligned_pct = if order_flow_supports { order_flow.pressure_score.abs() * 100.0 } else { 0.0 };

    let confidence = compute_confidence(ConfidenceInputs {
        edge: chosen_edge,
        major_triggers,
        minor_triggers,
        degenerate: scored.degenerate,
        aligned_timeframes: alignment.aligned_count,
        conflicting_timeframes: alignment.conflicting_count,
        corr_adj: corr_adj_for_side,
        vol_class,
        order_flow_supports,
        order_flow_conflicts,
        order_flow_is_deep,
        order_flow_aligned_pct,
        decay,
        regime: regime_classification.regime,
        side: rec.side,
    });

    let model_prob = match rec.side {
        Side::Up => scored.adjusted_up,
        Side::Down => scored.adjusted_down,
    };
    let market_price = match rec.side {
        Side::Up => market.yes_price,
        Side::Down => market.no_price,
    };
    let kelly = size_position(model_prob, market_price, confidence.tier);
    let classified = classify_features(&snapshot, price, vol_class);

    Tick {
        market_id: market.id.clone(),
        question: market.question.clone(),
        category: market.category.clone(),
        timestamp: now,
        ok: true,
        reason: None,
        indicators: Some(snapshot),
        regime: Some(regime_classification),
        vol_class: Some(vol_class),
        model: Some(scored),
        edges: Some(scaled_edges),
        rec: Some(rec),
        order_flow: Some(order_flow),
        confidence: Some(confidence),
        kelly: Some(kelly),
        prices: MarketPrices { last: market.yes_price, up: market.yes_price, down: market.no_price },
        settlement_minutes_remaining: remaining_minutes,
        closed: market.closed,
        classified: Some(classified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_core::Regime;

    fn snapshot(overrides: impl FnOnce(&mut IndicatorSnapshot)) -> IndicatorSnapshot {
        let mut s = IndicatorSnapshot {
            vwap: 100.0,
            vwap_slope: 0.0,
            rsi: 50.0,
            rsi_slope: 0.0,
            macd: 0.0,
            macd_signal: 0.0,
            macd_hist: 0.0,
            macd_hist_delta: 0.0,
            heiken_color: HeikenColor::Green,
            heiken_streak: 0,
            atr: 1.0,
            atr_pct: 1.0,
            bollinger_width: 0.05,
            bollinger_squeeze: false,
            vwap_cross_count: 0,
            recent_volume: 100.0,
            avg_volume: 100.0,
            failed_vwap_reclaim: false,
            ob_imbalance: 1.0,
        };
        overrides(&mut s);
        s
    }

    fn market(tags: &[&str]) -> Market {
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
            tags: tags.iter().map(|s| s.to_string()).collect(),
            closed: false,
        }
    }

    #[test]
    fn resolves_eth_symbol_from_tag() {
        assert_eq!(resolve_crypto_symbol(&market(&["crypto", "eth"])), Some("ETH".to_string()));
    }

    #[test]
    fn defaults_to_btc_when_crypto_but_no_known_symbol_tag() {
        assert_eq!(resolve_crypto_symbol(&market(&["crypto"])), Some("BTC".to_string()));
    }

    #[test]
    fn non_crypto_market_has_no_symbol() {
        let mut m = market(&[]);
        m.category = "politics".to_string();
        assert_eq!(resolve_crypto_symbol(&m), None);
    }

    #[test]
    fn count_triggers_counts_only_aligned_votes() {
        let snap = snapshot(|s| {
            s.vwap_slope = 0.1;
            s.rsi = 60.0;
            s.rsi_slope = 1.0;
            s.macd_hist = 0.5;
            s.macd_hist_delta = 0.2;
            s.macd = 0.3;
            s.heiken_streak = 3;
        });
        let (major, minor) = count_triggers(&snap, 101.0, Side::Up);
        assert_eq!(major, 4);
        assert_eq!(minor, 2);

        let (major_down, minor_down) = count_triggers(&snap, 101.0, Side::Down);
        assert_eq!(major_down, 0);
        assert_eq!(minor_down, 0);
    }

    #[test]
    fn insufficient_candles_is_rejected() {
        let candles = vec![];
        assert!(compute_indicator_snapshot(&candles, 1.0).is_err());
        let _ = Regime::Range;
    }
}
