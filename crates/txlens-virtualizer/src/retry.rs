//! Retry-with-backoff wrapper for network calls.
//!
//! Every attempt runs under a hard timeout; failures are recorded per URL in
//! a transient registry that clears on the first success, so callers can
//! inspect what a flaky endpoint has been doing lately.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};
use txlens_types::NetworkFailureContext;

use crate::error::NetworkError;

/// Retry schedule: `attempts` tries total, waiting
/// `delay * backoff^(attempt - 1)` between consecutive tries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub backoff: f64,
    /// Whether non-2xx responses are retried. Transport failures and
    /// timeouts always are.
    pub retry_protocol_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(1000),
            backoff: 2.0,
            retry_protocol_errors: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration, backoff: f64) -> Self {
        Self {
            attempts,
            delay,
            backoff,
            ..Self::default()
        }
    }

    /// Backoff to wait after the given 1-based attempt fails.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.delay.mul_f64(self.backoff.powi(attempt as i32 - 1))
    }
}

/// Network call wrapper with bounded attempts and a per-URL failure record.
pub struct FetchClient {
    network_timeout: Duration,
    failures: Mutex<HashMap<String, NetworkFailureContext>>,
    epoch: Instant,
}

impl FetchClient {
    pub fn new(network_timeout: Duration) -> Self {
        Self {
            network_timeout,
            failures: Mutex::new(HashMap::new()),
            epoch: Instant::now(),
        }
    }

    /// Run `op` until it succeeds or the policy's attempts are exhausted,
    /// returning the last error. Each attempt is bounded by the client's
    /// network timeout; a fired timer surfaces as [`NetworkError::Timeout`].
    pub async fn request<T, F, Fut>(
        &self,
        url: &str,
        method: &str,
        policy: &RetryPolicy,
        mut op: F,
    ) -> Result<T, NetworkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NetworkError>>,
    {
        let total = policy.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.network_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(NetworkError::Timeout(self.network_timeout)),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(url, attempt, "request recovered after retries");
                    }
                    self.clear_failure(url);
                    return Ok(value);
                }
                Err(err) => {
                    let retry_after = if attempt < total
                        && err.is_retryable(policy.retry_protocol_errors)
                    {
                        Some(policy.backoff_delay(attempt))
                    } else {
                        None
                    };
                    self.record_failure(url, method, attempt, &err, retry_after);

                    match retry_after {
                        Some(delay) => {
                            warn!(url, attempt, error = %err, ?delay, "request failed, backing off");
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            warn!(url, attempt, error = %err, "request failed, giving up");
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    /// The transient failure record for a URL, if its last request failed.
    pub fn failure_context(&self, url: &str) -> Option<NetworkFailureContext> {
        self.failures.lock().unwrap().get(url).cloned()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().unwrap().len()
    }

    fn record_failure(
        &self,
        url: &str,
        method: &str,
        attempts: u32,
        err: &NetworkError,
        retry_after: Option<Duration>,
    ) {
        let context = NetworkFailureContext {
            url: url.to_string(),
            method: method.to_string(),
            attempts,
            last_error: err.to_string(),
            recorded_at_ms: self.epoch.elapsed().as_millis() as u64,
            retry_after,
        };
        self.failures.lock().unwrap().insert(url.to_string(), context);
    }

    fn clear_failure(&self, url: &str) {
        self.failures.lock().unwrap().remove(url);
    }
}
