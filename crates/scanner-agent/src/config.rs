use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub exchange_base_url: Option<String>,
    pub exchange_series_id: String,
    pub exchange_requests_per_min: usize,

    pub macro_base_url: Option<String>,
    pub macro_ws_url: Option<String>,
    pub macro_symbol: String,
    pub macro_requests_per_min: usize,

    pub poll_interval_seconds: u64,
    pub stagger_ms: u64,

    pub min_liquidity: f64,
    pub category_allowlist: Vec<String>,
    pub max_markets: usize,

    pub retention_days: i64,
    pub weight_refresh_minutes: u64,
    pub outcome_resolution_minutes: u64,

    pub database_url: String,
}

impl ScannerConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            exchange_base_url: env::var("EXCHANGE_BASE_URL").ok(),
            exchange_series_id: env::var("EXCHANGE_SERIES_ID").unwrap_or_else(|_| "crypto-hourly".to_string()),
            exchange_requests_per_min: env::var("EXCHANGE_REQUESTS_PER_MIN")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            macro_base_url: env::var("MACRO_BASE_URL").ok(),
            macro_ws_url: env::var("MACRO_WS_URL").ok(),
            macro_symbol: env::var("MACRO_SYMBOL").unwrap_or_else(|_| "BTC".to_string()),
            macro_requests_per_min: env::var("MACRO_REQUESTS_PER_MIN")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,

            poll_interval_seconds: env::var("POLL_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            stagger_ms: env::var("STAGGER_MS").unwrap_or_else(|_| "200".to_string()).parse()?,

            min_liquidity: env::var("MIN_LIQUIDITY").unwrap_or_else(|_| "0".to_string()).parse()?,
            category_allowlist: env::var("CATEGORY_ALLOWLIST")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_markets: env::var("MAX_MARKETS").unwrap_or_else(|_| "200".to_string()).parse()?,

            retention_days: env::var("RETENTION_DAYS").unwrap_or_else(|_| "90".to_string()).parse()?,
            weight_refresh_minutes: env::var("WEIGHT_REFRESH_MINUTES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            outcome_resolution_minutes: env::var("OUTCOME_RESOLUTION_MINUTES")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,

            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://scanner.db".to_string()),
        };

        Ok(config)
    }
}
