use crate::fetcher::ResilientFetcher;
use chrono::{DateTime, TimeZone, Utc};
use scanner_core::{Candle, Market, ScannerError};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://clob.polymarket.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Buy,
    Sell,
}

impl BookSide {
    fn as_str(&self) -> &'static str {
        match self {
            BookSide::Buy => "buy",
            BookSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn bid_liquidity(&self) -> f64 {
        self.bids.iter().map(|l| l.price * l.size).sum()
    }

    pub fn ask_liquidity(&self) -> f64 {
        self.asks.iter().map(|l| l.price * l.size).sum()
    }

    /// bid-liquidity / ask-liquidity from summarized top-of-book.
    pub fn imbalance(&self) -> f64 {
        let ask = self.ask_liquidity();
        if ask <= f64::EPSILON {
            return 1.0;
        }
        self.bid_liquidity() / ask
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct PriceHistoryPoint {
    t: i64,
    p: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct PriceHistoryResponse {
    history: Vec<PriceHistoryPoint>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct MarketEntry {
    #[serde(rename = "conditionId")]
    condition_id: String,
    question: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(rename = "clobTokenIds", default)]
    clob_token_ids: Option<Vec<String>>,
    #[serde(rename = "outcomePrices", default)]
    outcome_prices: Option<Vec<String>>,
    #[serde(rename = "outcomes", default)]
    outcomes: Option<Vec<String>>,
    #[serde(default)]
    liquidity: Option<String>,
    #[serde(rename = "endDate", default)]
    end_date: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    closed: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct EventEntry {
    #[serde(default)]
    markets: Vec<MarketEntry>,
}

impl MarketEntry {
    fn into_market(self) -> Market {
        let token_ids = self.clob_token_ids.and_then(|ids| {
            if ids.len() >= 2 {
                Some((ids[0].clone(), ids[1].clone()))
            } else {
                None
            }
        });
        let prices: Vec<f64> = self
            .outcome_prices
            .unwrap_or_default()
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        let (yes_price, no_price) = match prices.as_slice() {
            [yes, no, ..] => (*yes, *no),
            [yes] => (*yes, 1.0 - yes),
            _ => (0.5, 0.5),
        };
        let labels = self.outcomes.unwrap_or_default();
        let settlement_ts = self
            .end_date
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Market {
            id: self.condition_id,
            question: self.question,
            category: self.category.unwrap_or_else(|| "general".to_string()),
            yes_label: labels.first().cloned().unwrap_or_else(|| "YES".to_string()),
            no_label: labels.get(1).cloned().unwrap_or_else(|| "NO".to_string()),
            token_ids,
            yes_price,
            no_price,
            liquidity: self.liquidity.and_then(|s| s.parse().ok()).unwrap_or(0.0),
            settlement_ts,
            tags: self.tags.unwrap_or_default(),
            closed: self.closed,
        }
    }
}

/// Client for the prediction exchange's market catalog, best-bid/ask, orderbook and
/// price-history endpoints (C1).
pub struct ExchangeClient {
    base_url: String,
    fetcher: ResilientFetcher,
}

impl ExchangeClient {
    pub fn new(base_url: Option<String>, requests_per_min: usize) -> Self {
        Self {
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            fetcher: ResilientFetcher::new("exchange", requests_per_min),
        }
    }

    pub async fn health(&self) -> crate::health::HealthSnapshot {
        self.fetcher.health_snapshot().await
    }

    /// Market catalog for a series, client-side filterable by the caller.
    pub async fn fetch_markets(&self, series_id: &str, limit: u32) -> Result<Vec<Market>, ScannerError> {
        let url = format!("{}/markets", self.base_url);
        let events: Vec<EventEntry> = self
            .fetcher
            .get_json(
                &url,
                &[
                    ("seriesId", series_id.to_string()),
                    ("limit", limit.to_string()),
                ],
                &format!("markets:{series_id}"),
            )
            .await?;

        Ok(events
            .into_iter()
            .flat_map(|e| e.markets)
            .map(MarketEntry::into_market)
            .collect())
    }

    pub async fn fetch_market(&self, slug: &str) -> Result<Market, ScannerError> {
        let url = format!("{}/markets/{}", self.base_url, slug);
        let entry: MarketEntry = self
            .fetcher
            .get_json(&url, &[], &format!("market:{slug}"))
            .await?;
        Ok(entry.into_market())
    }

    pub async fn fetch_price(&self, token_id: &str, side: BookSide) -> Result<f64, ScannerError> {
        let url = format!("{}/price", self.base_url);
        #[derive(Deserialize, Serialize)]
        struct PriceResponse {
            price: String,
        }
        let resp: PriceResponse = self
            .fetcher
            .get_json(
                &url,
                &[
                    ("market", token_id.to_string()),
                    ("side", side.as_str().to_string()),
                ],
                &format!("price:{token_id}:{}", side.as_str()),
            )
            .await?;
        resp.price
            .parse()
            .map_err(|_| ScannerError::InvalidData(format!("bad price payload for {token_id}")))
    }

    pub async fn fetch_book(&self, token_id: &str) -> Result<OrderBook, ScannerError> {
        let url = format!("{}/book", self.base_url);
        self.fetcher
            .get_json(&url, &[("market", token_id.to_string())], &format!("book:{token_id}"))
            .await
    }

    /// Raw tick history; non-crypto markets bucket these into synthetic candles.
    pub async fn fetch_price_history(
        &self,
        token_id: &str,
        interval: &str,
        fidelity: u32,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, ScannerError> {
        let url = format!("{}/prices-history", self.base_url);
        let resp: PriceHistoryResponse = self
            .fetcher
            .get_json(
                &url,
                &[
                    ("market", token_id.to_string()),
                    ("interval", interval.to_string()),
                    ("fidelity", fidelity.to_string()),
                ],
                &format!("history:{token_id}:{interval}"),
            )
            .await?;

        Ok(resp
            .history
            .into_iter()
            .map(|pt| (Utc.timestamp_opt(pt.t, 0).single().unwrap_or_else(Utc::now), pt.p))
            .collect())
    }
}

/// Bucket raw ticks into fixed-width synthetic candles; `volume` counts ticks per
/// bucket rather than USD notional.
pub fn bucket_ticks_into_candles(
    ticks: &[(DateTime<Utc>, f64)],
    bucket_seconds: i64,
) -> Vec<Candle> {
    if ticks.is_empty() {
        return Vec::new();
    }

    let mut candles: Vec<Candle> = Vec::new();
    let mut bucket_start = ticks[0].0;
    let mut open = ticks[0].1;
    let mut high = ticks[0].1;
    let mut low = ticks[0].1;
    let mut close = ticks[0].1;
    let mut count = 0.0_f64;

    for &(ts, price) in ticks {
        let elapsed = (ts - bucket_start).num_seconds();
        if elapsed >= bucket_seconds && count > 0.0 {
            candles.push(Candle {
                start: bucket_start,
                open,
                high,
                low,
                close,
                volume: count,
            });
            bucket_start = ts;
            open = price;
            high = price;
            low = price;
            count = 0.0;
        }
        high = high.max(price);
        low = low.min(price);
        close = price;
        count += 1.0;
    }

    if count > 0.0 {
        candles.push(Candle {
            start: bucket_start,
            open,
            high,
            low,
            close,
            volume: count,
        });
    }

    candles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imbalance_defaults_to_one_with_no_asks() {
        let book = OrderBook { bids: vec![BookLevel { price: 0.5, size: 10.0 }], asks: vec![] };
        assert_eq!(book.imbalance(), 1.0);
    }

    #[test]
    fn bucketing_respects_window_boundaries() {
        let base = Utc.timestamp_opt(0, 0).single().unwrap();
        let ticks = vec![
            (base, 1.0),
            (base + chrono::Duration::seconds(30), 1.2),
            (base + chrono::Duration::seconds(70), 1.5),
        ];
        let candles = bucket_ticks_into_candles(&ticks, 60);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, 1.0);
        assert_eq!(candles[0].close, 1.2);
        assert_eq!(candles[1].open, 1.5);
    }
}
