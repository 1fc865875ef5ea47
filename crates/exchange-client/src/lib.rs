pub mod exchange;
pub mod fetcher;
pub mod health;
pub mod macro_client;

pub use exchange::{bucket_ticks_into_candles, BookLevel, BookSide, ExchangeClient, OrderBook};
pub use fetcher::ResilientFetcher;
pub use health::{CircuitState, HealthSnapshot, SourceHealth};
pub use macro_client::MacroPriceClient;
