use std::collections::VecDeque;
use std::time::{Duration, Instant};

const LATENCY_WINDOW: usize = 20;
const CONSECUTIVE_FAILS_TO_OPEN: u32 = 5;
const OPEN_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

/// Per-source health tracking and the circuit-breaker decision for that source.
///
/// Five consecutive failures trip the breaker for 60s; while open, callers get
/// `circuit_open` (or a cached fallback) without attempting the network.
pub struct SourceHealth {
    name: String,
    total_calls: u64,
    error_count: u64,
    consecutive_errors: u32,
    latencies: VecDeque<Duration>,
    last_error_at: Option<Instant>,
    opened_at: Option<Instant>,
}

impl SourceHealth {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total_calls: 0,
            error_count: 0,
            consecutive_errors: 0,
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            last_error_at: None,
            opened_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Some(remaining)` if the circuit is currently open.
    pub fn check_open(&mut self) -> Option<Duration> {
        match self.opened_at {
            Some(opened) if opened.elapsed() < OPEN_DURATION => {
                Some(OPEN_DURATION - opened.elapsed())
            }
            Some(_) => {
                self.opened_at = None;
                self.consecutive_errors = 0;
                None
            }
            None => None,
        }
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.total_calls += 1;
        self.consecutive_errors = 0;
        self.latencies.push_back(latency);
        if self.latencies.len() > LATENCY_WINDOW {
            self.latencies.pop_front();
        }
    }

    pub fn record_error(&mut self) {
        self.total_calls += 1;
        self.error_count += 1;
        self.consecutive_errors += 1;
        self.last_error_at = Some(Instant::now());
        if self.consecutive_errors >= CONSECUTIVE_FAILS_TO_OPEN && self.opened_at.is_none() {
            tracing::warn!(
                source = %self.name,
                consecutive_errors = self.consecutive_errors,
                "circuit breaker tripped"
            );
            self.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        if self.opened_at.is_some() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let avg_latency_ms = if self.latencies.is_empty() {
            0.0
        } else {
            self.latencies.iter().map(|d| d.as_secs_f64() * 1000.0).sum::<f64>()
                / self.latencies.len() as f64
        };
        HealthSnapshot {
            source: self.name.clone(),
            total_calls: self.total_calls,
            error_count: self.error_count,
            consecutive_errors: self.consecutive_errors,
            avg_latency_ms,
            state: self.state(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub source: String,
    pub total_calls: u64,
    pub error_count: u64,
    pub consecutive_errors: u32,
    pub avg_latency_ms: f64,
    pub state: CircuitState,
}
