use chrono::{DateTime, Utc};
use scanner_core::Tick;

/// The named events C7 fans out to subscribers (C8, C13, and anything else
/// listening in-process).
#[derive(Debug, Clone)]
pub enum ScannerEvent {
    ScannerStart,
    ScannerReady { market_count: usize },
    ScannerStop,
    MarketAdded { market_id: String },
    MarketRemoved { market_id: String },
    SignalEnter { tick: Box<Tick> },
    CycleComplete { cycle: u64, tick_count: usize, signal_count: usize, at: DateTime<Utc> },
    Error { market_id: Option<String>, message: String },
}

impl ScannerEvent {
    /// The dotted event name from the spec, kept around for logging and for
    /// subscribers that filter by name rather than by pattern-matching.
    pub fn name(&self) -> &'static str {
        match self {
            ScannerEvent::ScannerStart => "scanner:start",
            ScannerEvent::ScannerReady { .. } => "scanner:ready",
            ScannerEvent::ScannerStop => "scanner:stop",
            ScannerEvent::MarketAdded { .. } => "market:added",
            ScannerEvent::MarketRemoved { .. } => "market:removed",
            ScannerEvent::SignalEnter { .. } => "signal:enter",
            ScannerEvent::CycleComplete { .. } => "cycle:complete",
            ScannerEvent::Error { .. } => "error",
        }
    }
}
