use chrono::{DateTime, Utc};
use scanner_core::Side;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualPosition {
    pub market_id: String,
    pub question: String,
    pub side: Side,
    pub entry_price: f64,
    pub bet_pct: f64,
    pub current_price: f64,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pnl_pct: Option<f64>,
}

impl VirtualPosition {
    pub fn unrealized_pnl_pct(&self) -> f64 {
        let directional = match self.side {
            Side::Up => (self.current_price - self.entry_price) / self.entry_price,
            Side::Down => (self.entry_price - self.current_price) / self.entry_price,
        };
        directional * self.bet_pct * 100.0
    }
}
