use crate::fetcher::ResilientFetcher;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::StreamExt;
use scanner_core::{Candle, ScannerError};
use serde::Deserialize;
use std::sync::{Arc, Mutex, Notify};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const DEFAULT_WS_URL: &str = "wss://stream.binance.com:9443/ws";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
struct TradeEvent {
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "T")]
    trade_time: i64,
}

/// Klines + a read-last-price-only trade stream for the macro correlation symbol
/// (C1/C10). The stream never blocks a reader: it publishes into a plain mutex
/// that a caller snapshots with `last_price`, it never awaits a caller.
pub struct MacroPriceClient {
    base_url: String,
    ws_url: String,
    fetcher: ResilientFetcher,
    last_price: Arc<Mutex<Option<(f64, DateTime<Utc>)>>>,
    shutdown: Arc<Notify>,
}

impl MacroPriceClient {
    pub fn new(base_url: Option<String>, ws_url: Option<String>, requests_per_min: usize) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            ws_url: ws_url.unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            fetcher: ResilientFetcher::new("macro", requests_per_min),
            last_price: Arc::new(Mutex::new(None)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub async fn health(&self) -> crate::health::HealthSnapshot {
        self.fetcher.health_snapshot().await
    }

    pub async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ScannerError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let raw: Vec<Vec<serde_json::Value>> = self
            .fetcher
            .get_json(
                &url,
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
                &format!("klines:{symbol}:{interval}"),
            )
            .await?;

        raw.into_iter()
            .map(|row| parse_kline_row(&row))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ScannerError::InvalidData(format!("malformed klines payload for {symbol}")))
    }

    /// Last trade price observed by the background stream, with its timestamp.
    /// Returns `None` until the stream has delivered at least one trade.
    pub fn last_price(&self) -> Option<(f64, DateTime<Utc>)> {
        *self.last_price.lock().unwrap()
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Runs the reconnecting trade-stream loop until `shutdown` is called.
    /// Meant to be spawned once as a background task.
    pub async fn run_stream(&self, symbol: &str) {
        let stream_name = format!("{}@trade", symbol.to_lowercase());
        loop {
            match self.connect_and_stream(&stream_name).await {
                Ok(()) => {
                    tracing::info!(symbol, "macro price stream closed gracefully");
                    break;
                }
                Err(e) => {
                    tracing::warn!(symbol, error = %e, "macro price stream error, reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {},
                        _ = self.shutdown.notified() => {
                            tracing::info!(symbol, "macro price stream shutdown requested");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn connect_and_stream(
        &self,
        stream_name: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let url = format!("{}/{}", self.ws_url, stream_name);
        let (ws_stream, _) = connect_async(&url).await?;
        let (_, mut read) = ws_stream.split();
        tracing::info!(stream = stream_name, "connected to macro price stream");

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_trade(&text),
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Err(e)) => return Err(Box::new(e)),
                        _ => {}
                    }
                }
                _ = self.shutdown.notified() => return Ok(()),
            }
        }
    }

    fn handle_trade(&self, text: &str) {
        let Ok(event) = serde_json::from_str::<TradeEvent>(text) else {
            return;
        };
        let Ok(price) = event.price.parse::<f64>() else {
            return;
        };
        let ts = Utc
            .timestamp_millis_opt(event.trade_time)
            .single()
            .unwrap_or_else(Utc::now);
        *self.last_price.lock().unwrap() = Some((price, ts));
    }
}

fn parse_kline_row(row: &[serde_json::Value]) -> Option<Candle> {
    let open_time = row.first()?.as_i64()?;
    Some(Candle {
        start: Utc.timestamp_millis_opt(open_time).single()?,
        open: row.get(1)?.as_str()?.parse().ok()?,
        high: row.get(2)?.as_str()?.parse().ok()?,
        low: row.get(3)?.as_str()?.parse().ok()?,
        close: row.get(4)?.as_str()?.parse().ok()?,
        volume: row.get(5)?.as_str()?.parse().ok()?,
    })
}
