//! Safety limits and retry policy configuration (spec.md §4.5, §5).

use serde::{Deserialize, Serialize};

/// Per-job safety limits, each checked once per record and per progress tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub max_rows: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub max_dead_letters: Option<u64>,
    pub max_heap_mb: Option<u64>,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_rows: None,
            max_duration_ms: None,
            max_dead_letters: None,
            max_heap_mb: None,
        }
    }
}

impl SafetyLimits {
    /// Fill in any unset field from `defaults`. A job-file value always wins
    /// over a process-wide default; only fields this job left unspecified
    /// are taken from `defaults`.
    pub fn merge_defaults(&mut self, defaults: &SafetyLimits) {
        self.max_rows = self.max_rows.or(defaults.max_rows);
        self.max_duration_ms = self.max_duration_ms.or(defaults.max_duration_ms);
        self.max_dead_letters = self.max_dead_letters.or(defaults.max_dead_letters);
        self.max_heap_mb = self.max_heap_mb.or(defaults.max_heap_mb);
    }
}

/// Bounded exponential backoff for the bulk-load phase only (spec.md §4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub factor: f64,
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 300,
            factor: 2.0,
            max_jitter_ms: 120,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given (1-based) attempt number, excluding jitter.
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let exp = self.factor.powi(attempt.saturating_sub(1) as i32);
        (self.initial_delay_ms as f64 * exp) as u64
    }
}

/// The byte-level backpressure threshold for the copy-line encoder
/// (spec.md §5: default high-water mark 1024 bytes).
pub const DEFAULT_HIGH_WATER_MARK: usize = 1024;

/// Default cadence (rows) for progress events and checkpoint persistence.
pub const DEFAULT_PROGRESS_INTERVAL_ROWS: u64 = 1_000;
pub const CHECKPOINT_INTERVAL_ROWS: u64 = 50_000;
