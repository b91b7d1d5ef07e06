use std::time::Duration;

/// Configures HTTP timeout and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retry: RetryPolicy::default(),
        }
    }
}

/// Immutable retry configuration shared by every call of a client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base retry backoff; attempt `n` waits `base_delay * 2^n`.
    pub base_delay: Duration,
    /// Statuses treated as transient.
    pub retryable_statuses: Vec<u16>,
    /// Retry writes (POST, PUT, PATCH, DELETE) that carry no idempotency key.
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1_000),
            retryable_statuses: vec![408, 429, 500, 502, 503, 504],
            retry_non_idempotent: false,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}
