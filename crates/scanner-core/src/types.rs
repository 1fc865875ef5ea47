use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A binary prediction market as returned by discovery, refreshed each discovery cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Market {
    pub id: String,
    pub question: String,
    pub category: String,
    pub yes_label: String,
    pub no_label: String,
    /// (yes_token_id, no_token_id); absent markets are skipped upstream of the poller.
    pub token_ids: Option<(String, String)>,
    pub yes_price: f64,
    pub no_price: f64,
    pub liquidity: f64,
    pub settlement_ts: DateTime<Utc>,
    pub tags: Vec<String>,
    /// Upstream "closed" flag, carried straight through from C1.
    pub closed: bool,
}

impl Market {
    pub fn is_crypto(&self) -> bool {
        self.category == "crypto" || self.tags.iter().any(|t| t == "crypto")
    }

    pub fn minutes_to_settlement(&self, now: DateTime<Utc>) -> f64 {
        (self.settlement_ts - now).num_seconds() as f64 / 60.0
    }
}

/// Fixed-width candle. `volume` is USD-denominated for crypto markets fetched from the
/// candle API, tick-count for non-crypto markets bucketed from price history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeikenColor {
    Green,
    Red,
}

/// All derived numerics for one tick, computed purely from a candle sequence plus
/// the best-of-book snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub vwap: f64,
    pub vwap_slope: f64,
    pub rsi: f64,
    pub rsi_slope: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub macd_hist_delta: f64,
    pub heiken_color: HeikenColor,
    pub heiken_streak: u32,
    pub atr: f64,
    pub atr_pct: f64,
    pub bollinger_width: f64,
    pub bollinger_squeeze: bool,
    pub vwap_cross_count: u32,
    pub recent_volume: f64,
    pub avg_volume: f64,
    pub failed_vwap_reclaim: bool,
    pub ob_imbalance: f64,
}

impl IndicatorSnapshot {
    /// RSI is degenerate once it pins to the extremes — it has stopped carrying signal.
    pub fn rsi_degenerate(&self) -> bool {
        self.rsi >= 99.0 || self.rsi <= 1.0
    }

    /// MACD is degenerate when macd, signal and hist are all exactly zero (flat price).
    pub fn macd_degenerate(&self) -> bool {
        self.macd == 0.0 && self.macd_signal == 0.0 && self.macd_hist == 0.0
    }

    pub fn degenerate(&self) -> bool {
        self.rsi_degenerate() && self.macd_degenerate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    TrendUp,
    TrendDown,
    Range,
    Chop,
}

impl Regime {
    pub fn name(&self) -> &'static str {
        match self {
            Regime::TrendUp => "TREND_UP",
            Regime::TrendDown => "TREND_DOWN",
            Regime::Range => "RANGE",
            Regime::Chop => "CHOP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolatilityClass {
    Low,
    Normal,
    High,
}

impl VolatilityClass {
    /// Threshold multiplier applied to the edge decision (C4).
    pub fn multiplier(&self) -> f64 {
        match self {
            VolatilityClass::Low => 0.8,
            VolatilityClass::Normal => 1.0,
            VolatilityClass::High => 1.5,
        }
    }
}

/// One classified regime state held on entry, with the transition ring used to
/// derive `stability`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeClassification {
    pub regime: Regime,
    pub reason: String,
    pub stability: f64,
    pub recent_transitions: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeTransition {
    pub from: Regime,
    pub to: Regime,
    pub ts: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// Per-market regime history; owned and mutated only by that market's poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeHistory {
    pub current: Regime,
    pub entered_at: DateTime<Utc>,
    pub transitions: VecDeque<RegimeTransition>,
}

impl RegimeHistory {
    const RING_CAPACITY: usize = 20;

    pub fn new(initial: Regime, now: DateTime<Utc>) -> Self {
        Self {
            current: initial,
            entered_at: now,
            transitions: VecDeque::with_capacity(Self::RING_CAPACITY),
        }
    }

    /// Record a transition if the classified regime differs from the current one.
    /// Returns the classification to attach to the tick.
    pub fn observe(&mut self, classified: Regime, now: DateTime<Utc>) -> RegimeClassification {
        if classified != self.current {
            let duration = (now - self.entered_at).num_minutes();
            self.transitions.push_back(RegimeTransition {
                from: self.current,
                to: classified,
                ts: now,
                duration_minutes: duration,
            });
            if self.transitions.len() > Self::RING_CAPACITY {
                self.transitions.pop_front();
            }
            self.current = classified;
            self.entered_at = now;
        }

        let hold_minutes = (now - self.entered_at).num_minutes().max(0) as f64;
        let one_hour_ago = now - chrono::Duration::minutes(60);
        let recent_transitions = self
            .transitions
            .iter()
            .filter(|t| t.ts >= one_hour_ago)
            .count() as u32;
        let stability = (hold_minutes / 30.0 * 100.0).min(100.0) - 15.0 * recent_transitions as f64;

        RegimeClassification {
            regime: self.current,
            reason: String::new(),
            stability,
            recent_transitions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Up,
    Down,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Up => Side::Down,
            Side::Down => Side::Up,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Enter,
    Pass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strength {
    Weak,
    Good,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Early,
    Mid,
    Late,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Edges {
    pub edge_up: f64,
    pub edge_down: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: Action,
    pub side: Side,
    pub strength: Strength,
    pub phase: Phase,
}

/// Raw-to-adjusted probability pipeline output (C3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoredProbability {
    pub raw_up: f64,
    pub adjusted_up: f64,
    pub adjusted_down: f64,
    pub degenerate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowQuality {
    Deep,
    Moderate,
    Thin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpreadQuality {
    Tight,
    Normal,
    Wide,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderFlowSummary {
    pub pressure_score: f64,
    pub wall_count_bid: u32,
    pub wall_count_ask: u32,
    pub flow_quality: FlowQuality,
    pub spread_quality: SpreadQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            ConfidenceTier::High
        } else if score >= 60.0 {
            ConfidenceTier::Medium
        } else if score >= 40.0 {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::VeryLow
        }
    }

    /// Fraction of the fractional-Kelly bet applied at this tier (C5).
    pub fn kelly_scale(&self) -> f64 {
        match self {
            ConfidenceTier::High => 1.0,
            ConfidenceTier::Medium => 0.7,
            ConfidenceTier::Low => 0.4,
            ConfidenceTier::VeryLow => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub edge_magnitude: f64,
    pub indicator_agreement: f64,
    pub confluence: f64,
    pub btc_correlation: f64,
    pub volatility_regime: f64,
    pub order_flow: f64,
    pub time_decay: f64,
    pub regime_quality: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub score: f64,
    pub tier: ConfidenceTier,
    pub breakdown: ConfidenceBreakdown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KellyResult {
    pub bet_pct: f64,
    pub kelly_full: f64,
    pub odds: f64,
    pub tier: ConfidenceTier,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketPrices {
    pub last: f64,
    pub up: f64,
    pub down: f64,
}

/// The central output record — one per poll per market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub market_id: String,
    pub question: String,
    pub category: String,
    pub timestamp: DateTime<Utc>,
    pub ok: bool,
    pub reason: Option<String>,
    pub indicators: Option<IndicatorSnapshot>,
    pub regime: Option<RegimeClassification>,
    pub vol_class: Option<VolatilityClass>,
    pub model: Option<ScoredProbability>,
    pub edges: Option<Edges>,
    pub rec: Option<Recommendation>,
    pub order_flow: Option<OrderFlowSummary>,
    pub confidence: Option<ConfidenceScore>,
    pub kelly: Option<KellyResult>,
    pub prices: MarketPrices,
    pub settlement_minutes_remaining: f64,
    /// Upstream "closed" flag on the market, carried straight through from C1.
    pub closed: bool,
    /// Discretized feature bucket the signal store and weight learner join on,
    /// computed from the same snapshot/price the scorer used.
    pub classified: Option<ClassifiedFeatures>,
}

impl Tick {
    /// Dashboard/bot-facing signal label.
    pub fn signal_label(&self) -> &'static str {
        match self.rec {
            Some(Recommendation {
                action: Action::Enter,
                side: Side::Up,
                ..
            }) => "BUY YES",
            Some(Recommendation {
                action: Action::Enter,
                side: Side::Down,
                ..
            }) => "BUY NO",
            _ => "NO TRADE",
        }
    }

    pub fn is_enter(&self) -> bool {
        self.ok
            && matches!(
                self.rec,
                Some(Recommendation {
                    action: Action::Enter,
                    ..
                })
            )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VwapPosition {
    Above,
    Below,
    At,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VwapSlopeDir {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsiZone {
    Oversold,
    Bearish,
    Neutral,
    Bullish,
    Overbought,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacdState {
    ExpandingGreen,
    FadingGreen,
    ExpandingRed,
    FadingRed,
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObZone {
    StrongBid,
    Bid,
    Balanced,
    Ask,
    StrongAsk,
}

/// The join-key feature set the weight learner groups outcomes by (C8/C9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassifiedFeatures {
    pub vwap_position: VwapPosition,
    pub vwap_slope_dir: VwapSlopeDir,
    pub rsi_zone: RsiZone,
    pub macd_state: MacdState,
    pub heiken_color: HeikenColor,
    pub ob_zone: ObZone,
    pub vol_regime: VolatilityClass,
    pub degenerate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Loss,
    Void,
}

/// A tick whose decision was ENTER, persisted and later annotated with settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Option<i64>,
    pub tick: Tick,
    pub classified: ClassifiedFeatures,
    pub created_at: DateTime<Utc>,
    pub outcome: Option<Outcome>,
    pub outcome_price_yes: Option<f64>,
    pub outcome_price_no: Option<f64>,
    pub settled_at: Option<DateTime<Utc>>,
    pub pnl_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationBias {
    Bullish,
    LeanBull,
    Neutral,
    LeanBear,
    Bearish,
}

/// Process-wide singleton, one per tracked macro symbol (e.g. BTC).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationState {
    pub symbol: String,
    pub last_price: f64,
    pub rsi: f64,
    pub vwap: f64,
    pub vwap_slope: f64,
    pub macd_hist: f64,
    pub bias: CorrelationBias,
    pub bias_strength: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualPosition {
    pub id: Option<i64>,
    pub market_id: String,
    pub side: Side,
    pub entry_price: f64,
    pub current_price: f64,
    pub bet_fraction: f64,
    pub confidence: f64,
    pub edge_at_entry: f64,
    pub status: PositionStatus,
    pub realized_pnl_pct: Option<f64>,
    pub close_reason: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// A multiplier looked up by (feature name, discretized feature value), in [0.5, 1.5].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightKey {
    pub feature: String,
    pub value: String,
}

impl WeightKey {
    pub fn new(feature: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            value: value.into(),
        }
    }
}
