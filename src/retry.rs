//! Retry coordination for a single logical call.
//!
//! [`run`] drives attempts through a caller-supplied `send` function, sleeping
//! with exponential backoff between transient failures. When the call
//! terminates in failure it classifies the last signal, publishes one
//! [`ApiErrorEvent`] and returns [`ApiError::Request`].

use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    classify::{classify, FailureSignal},
    events::{ApiErrorEvent, ErrorBroadcaster},
    ApiError, ErrorDescriptor, Result, RetryPolicy,
};

/// Immutable per-attempt context of one logical call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Attempt {
    index: u32,
}

impl Attempt {
    pub fn first() -> Self {
        Self { index: 0 }
    }

    /// Zero-based attempt index.
    pub fn index(self) -> u32 {
        self.index
    }

    /// One-based attempt count, i.e. how many attempts have been started.
    pub fn number(self) -> u32 {
        self.index + 1
    }

    fn next(self) -> Self {
        Self {
            index: self.index + 1,
        }
    }
}

impl RetryPolicy {
    /// Whether a failure is transient. Depends on the signal only.
    pub fn is_retryable(&self, signal: &FailureSignal) -> bool {
        match signal {
            FailureSignal::NoResponse { .. } => true,
            FailureSignal::Status { status, .. } => self.retryable_statuses.contains(status),
        }
    }

    /// Backoff before the attempt following `attempt`: `base_delay * 2^index`.
    pub fn delay_for(&self, attempt: Attempt) -> Duration {
        let exp = attempt.index().min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

/// Per-call inputs of [`run`].
pub(crate) struct Call<'a> {
    pub url: &'a str,
    /// False for writes that must not be repeated automatically.
    pub retry_eligible: bool,
    pub cancel: Option<&'a CancellationToken>,
}

pub(crate) async fn run<T, F, Fut>(
    policy: &RetryPolicy,
    events: &ErrorBroadcaster,
    call: Call<'_>,
    mut send: F,
) -> Result<T>
where
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = std::result::Result<T, FailureSignal>>,
{
    let mut attempt = Attempt::first();
    loop {
        let outcome = match call.cancel {
            Some(token) if token.is_cancelled() => {
                return Err(cancelled(call.url, attempt.index()));
            }
            Some(token) => tokio::select! {
                outcome = send(attempt) => outcome,
                _ = token.cancelled() => return Err(cancelled(call.url, attempt.number())),
            },
            None => send(attempt).await,
        };

        let signal = match outcome {
            Ok(body) => return Ok(body),
            Err(signal) => signal,
        };

        let retry = call.retry_eligible
            && policy.is_retryable(&signal)
            && attempt.index() < policy.max_retries;
        if !retry {
            return Err(terminate(events, call.url, &signal, attempt));
        }

        let delay = policy.delay_for(attempt);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            url = call.url,
            attempt = attempt.number(),
            status = ?signal.status_code(),
            "retrying request after {} ms",
            delay.as_millis()
        );

        if !wait_before_retry(delay, call.cancel).await {
            return Err(cancelled(call.url, attempt.number()));
        }
        attempt = attempt.next();
    }
}

/// Sleeps for `delay`. Returns `false` if the call was cancelled meanwhile.
async fn wait_before_retry(delay: Duration, cancel: Option<&CancellationToken>) -> bool {
    match cancel {
        Some(token) => tokio::select! {
            _ = sleep(delay) => true,
            _ = token.cancelled() => false,
        },
        None => {
            sleep(delay).await;
            true
        }
    }
}

fn terminate(
    events: &ErrorBroadcaster,
    url: &str,
    signal: &FailureSignal,
    attempt: Attempt,
) -> ApiError {
    let classification = classify(signal);
    let descriptor = ErrorDescriptor {
        kind: classification.kind,
        message: classification.message,
        status: classification.status,
        url: url.to_owned(),
        attempts: attempt.number(),
    };

    #[cfg(feature = "tracing")]
    tracing::warn!(
        url,
        status = ?descriptor.status,
        kind = ?descriptor.kind,
        attempts = descriptor.attempts,
        "request failed: {}",
        descriptor.message
    );

    events.publish(&ApiErrorEvent::from(&descriptor));
    ApiError::Request(descriptor)
}

fn cancelled(url: &str, attempts: u32) -> ApiError {
    #[cfg(feature = "tracing")]
    tracing::debug!(url, attempts, "request cancelled");

    ApiError::Cancelled {
        url: url.to_owned(),
        attempts,
    }
}
