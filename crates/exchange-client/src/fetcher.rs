use crate::health::SourceHealth;
use dashmap::DashMap;
use rand::Rng;
use reqwest::Client;
use scanner_core::ScannerError;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const RATE_LIMIT_BACKOFF_MULTIPLIER: u32 = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Sliding-window rate limiter shared across all calls to one upstream source.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }
            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }
            let wait_until = ts.front().unwrap().checked_add(self.window).unwrap();
            let sleep_dur = wait_until.duration_since(now) + Duration::from_millis(10);
            drop(ts);
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Resilient fetch wrapper: sliding-window rate limiting, exponential backoff with
/// jitter, a per-source circuit breaker, and a cached-fallback response for reads
/// taken while the circuit is open (C1).
pub struct ResilientFetcher {
    client: Client,
    rate_limiter: RateLimiter,
    health: Mutex<SourceHealth>,
    cache: DashMap<String, serde_json::Value>,
    source_name: String,
}

impl ResilientFetcher {
    pub fn new(source_name: impl Into<String>, max_requests_per_min: usize) -> Self {
        let source_name = source_name.into();
        Self {
            client: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            rate_limiter: RateLimiter::new(max_requests_per_min, Duration::from_secs(60)),
            health: Mutex::new(SourceHealth::new(source_name.clone())),
            cache: DashMap::new(),
            source_name,
        }
    }

    pub async fn health_snapshot(&self) -> crate::health::HealthSnapshot {
        self.health.lock().await.snapshot()
    }

    /// GET `url` with `query`, decode as JSON. `cache_key` identifies the cached
    /// fallback slot to use when the circuit is open or all retries are exhausted
    /// on a transient error.
    pub async fn get_json<T: DeserializeOwned + serde::Serialize + Clone>(
        &self,
        url: &str,
        query: &[(&str, String)],
        cache_key: &str,
    ) -> Result<T, ScannerError> {
        {
            let mut health = self.health.lock().await;
            if let Some(remaining) = health.check_open() {
                drop(health);
                if let Some(cached) = self.cached(cache_key) {
                    tracing::warn!(source = %self.source_name, remaining_secs = remaining.as_secs(), "circuit open, serving cached fallback");
                    return Ok(cached);
                }
                return Err(ScannerError::CircuitOpen {
                    source: self.source_name.clone(),
                });
            }
        }

        let mut backoff = BASE_BACKOFF;
        for attempt in 0..=MAX_RETRIES {
            self.rate_limiter.acquire().await;
            let start = Instant::now();
            let result = self.client.get(url).query(query).send().await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() == 404 || status.as_u16() == 401 {
                        self.health.lock().await.record_error();
                        return Err(ScannerError::TerminalClient {
                            source: self.source_name.clone(),
                            status: status.as_u16(),
                        });
                    }
                    if status.as_u16() == 429 {
                        self.health.lock().await.record_error();
                        backoff = (backoff * RATE_LIMIT_BACKOFF_MULTIPLIER).min(MAX_BACKOFF);
                        if attempt == MAX_RETRIES {
                            break;
                        }
                        self.sleep_with_jitter(backoff).await;
                        continue;
                    }
                    if status.is_server_error() {
                        self.health.lock().await.record_error();
                        if attempt == MAX_RETRIES {
                            break;
                        }
                        self.sleep_with_jitter(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                    if !status.is_success() {
                        self.health.lock().await.record_error();
                        return Err(ScannerError::Upstream(format!(
                            "{} returned HTTP {}",
                            self.source_name, status
                        )));
                    }

                    match response.json::<T>().await {
                        Ok(value) => {
                            self.health.lock().await.record_success(start.elapsed());
                            if let Ok(json) = serde_json::to_value(&value) {
                                self.cache.insert(cache_key.to_string(), json);
                            }
                            return Ok(value);
                        }
                        Err(e) => {
                            self.health.lock().await.record_error();
                            return Err(ScannerError::Upstream(format!("decode error: {e}")));
                        }
                    }
                }
                Err(e) => {
                    self.health.lock().await.record_error();
                    if attempt == MAX_RETRIES {
                        tracing::warn!(source = %self.source_name, error = %e, "fetch exhausted retries");
                        break;
                    }
                    self.sleep_with_jitter(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        if let Some(cached) = self.cached(cache_key) {
            return Ok(cached);
        }
        Err(ScannerError::Upstream(format!(
            "{} exhausted {} retries",
            self.source_name, MAX_RETRIES
        )))
    }

    async fn sleep_with_jitter(&self, backoff: Duration) {
        let jitter_ms: u64 = rand::thread_rng().gen_range(0..=100);
        tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
    }

    fn cached<T: DeserializeOwned>(&self, cache_key: &str) -> Option<T> {
        self.cache
            .get(cache_key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Payload {
        value: String,
    }

    fn http_response(status_line: &str, body: &str) -> Vec<u8> {
        format!(
            "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    /// Spawns a stub HTTP/1.1 server whose response to the Nth request
    /// (0-indexed, shared across every connection) is chosen by `responder`.
    async fn spawn_stub<F>(responder: F) -> (String, tokio::task::JoinHandle<()>)
    where
        F: Fn(usize) -> (&'static str, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub listener");
        let addr = listener.local_addr().expect("local addr");
        let counter = Arc::new(AtomicUsize::new(0));
        let responder = Arc::new(responder);

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                let counter = counter.clone();
                let responder = responder.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    if socket.read(&mut buf).await.is_err() {
                        return;
                    }
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    let (status_line, body) = responder(n);
                    let _ = socket.write_all(&http_response(status_line, &body)).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn retries_past_server_errors_then_succeeds() {
        let (base_url, server) = spawn_stub(|n| {
            if n < 2 {
                ("HTTP/1.1 500 Internal Server Error", "{}".to_string())
            } else {
                ("HTTP/1.1 200 OK", serde_json::to_string(&Payload { value: "ok".to_string() }).unwrap())
            }
        })
        .await;

        let fetcher = ResilientFetcher::new("test", 600);
        let result: Payload = fetcher.get_json(&format!("{base_url}/thing"), &[], "thing").await.unwrap();
        assert_eq!(result, Payload { value: "ok".to_string() });

        server.abort();
    }

    #[tokio::test]
    async fn terminal_client_error_does_not_retry() {
        let (base_url, server) = spawn_stub(|_| ("HTTP/1.1 404 Not Found", "{}".to_string())).await;

        let fetcher = ResilientFetcher::new("test", 600);
        let start = Instant::now();
        let result: Result<Payload, _> = fetcher.get_json(&format!("{base_url}/thing"), &[], "thing").await;
        assert!(matches!(result, Err(ScannerError::TerminalClient { status: 404, .. })));
        assert!(start.elapsed() < Duration::from_millis(400), "terminal errors must not sleep through a backoff");

        server.abort();
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_to_the_last_cached_value() {
        let failing = Arc::new(AtomicUsize::new(0));
        let failing_clone = failing.clone();
        let (base_url, server) = spawn_stub(move |_| {
            if failing_clone.load(Ordering::SeqCst) == 0 {
                ("HTTP/1.1 200 OK", serde_json::to_string(&Payload { value: "cached".to_string() }).unwrap())
            } else {
                ("HTTP/1.1 500 Internal Server Error", "{}".to_string())
            }
        })
        .await;

        let fetcher = ResilientFetcher::new("test", 600);
        let first: Payload = fetcher.get_json(&format!("{base_url}/thing"), &[], "thing").await.unwrap();
        assert_eq!(first.value, "cached");

        failing.store(1, Ordering::SeqCst);
        let second: Payload = fetcher.get_json(&format!("{base_url}/thing"), &[], "thing").await.unwrap();
        assert_eq!(second.value, "cached", "exhausted retries should serve the last good response");

        server.abort();
    }

    #[tokio::test]
    async fn circuit_opens_after_consecutive_failures_and_serves_circuit_open_error() {
        let (base_url, server) = spawn_stub(|_| ("HTTP/1.1 500 Internal Server Error", "{}".to_string())).await;

        let fetcher = ResilientFetcher::new("test", 600);
        // Each call exhausts 4 attempts against an always-failing endpoint;
        // two calls push consecutive_errors past CONSECUTIVE_FAILS_TO_OPEN (5).
        let _: Result<Payload, _> = fetcher.get_json(&format!("{base_url}/thing"), &[], "thing").await;
        let _: Result<Payload, _> = fetcher.get_json(&format!("{base_url}/thing"), &[], "thing").await;

        let third: Result<Payload, _> = fetcher.get_json(&format!("{base_url}/thing"), &[], "thing").await;
        assert!(matches!(third, Err(ScannerError::CircuitOpen { .. })));

        server.abort();
    }
}
