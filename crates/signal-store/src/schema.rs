/// Row shape persisted per emitted ENTER signal. The classified columns
/// (`vwap_position` .. `vol_regime`) are the join key the weight learner
/// (C9) groups by; everything else is either raw numerics or settlement
/// bookkeeping.
pub(crate) const CREATE_SIGNALS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    market_id TEXT NOT NULL,
    category TEXT NOT NULL,
    side TEXT NOT NULL,
    entry_price REAL NOT NULL,
    edge REAL NOT NULL,
    confidence REAL NOT NULL,
    bet_pct REAL NOT NULL,
    vwap_position TEXT NOT NULL,
    vwap_slope_dir TEXT NOT NULL,
    rsi_zone TEXT NOT NULL,
    macd_state TEXT NOT NULL,
    heiken_color TEXT NOT NULL,
    ob_zone TEXT NOT NULL,
    vol_regime TEXT NOT NULL,
    degenerate INTEGER NOT NULL,
    tick_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expected_settlement_at TEXT NOT NULL,
    outcome TEXT,
    outcome_price_yes REAL,
    outcome_price_no REAL,
    settled_at TEXT,
    pnl_pct REAL
)";

pub(crate) const CREATE_SIGNALS_MARKET_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_signals_market ON signals (market_id)";

pub(crate) const CREATE_SIGNALS_OUTCOME_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_signals_outcome ON signals (outcome)";

/// Logging the same tick twice (same market, same timestamp) must not create
/// a second row; `record_enter` relies on this to be idempotent.
pub(crate) const CREATE_SIGNALS_IDEMPOTENCY_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_signals_market_created ON signals (market_id, created_at)";
