use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("calculation error: {0}")]
    CalculationError(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("rate limited on {source}")]
    RateLimited { source: String },

    #[error("circuit open for {source}")]
    CircuitOpen { source: String },

    #[error("terminal client error ({status}) from {source}")]
    TerminalClient { source: String, status: u16 },

    #[error("database error: {0}")]
    Database(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}
