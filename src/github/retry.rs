//! Retrying middleware for GitHub REST calls.
//!
//! Retries network errors and {429, 500, 502, 503, 504} with exponential
//! backoff and uniform jitter. A 429 carrying a rate-limit reset header is
//! not an error: the middleware waits until the reset timestamp, capped at
//! 60 seconds, with no jitter. After exhausting its attempts it returns the
//! last response so the caller can inspect the status.

use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::shutdown::Shutdown;

/// Header GitHub sets on rate-limited responses: epoch seconds at which the
/// quota resets.
const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Longest wait honored for a rate-limit reset.
const RATE_LIMIT_WAIT_CAP: Duration = Duration::from_secs(60);

const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("request cancelled during retry wait")]
    Cancelled,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Backoff schedule: `initial * multiplier^attempt`, capped at `max`,
/// jittered by a uniform factor in [0.5, 1.0].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Backoff for the given zero-based attempt, before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        self.initial.mul_f64(factor).min(self.max)
    }

    fn jittered_backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::rng().random_range(0.5..=1.0);
        self.backoff(attempt).mul_f64(jitter)
    }

    /// Run `send` until it yields a non-retryable response or the attempts
    /// are spent. `send` is invoked once per attempt and must build a fresh
    /// request each time.
    pub async fn execute<F, Fut>(&self, shutdown: &Shutdown, send: F) -> Result<reqwest::Response, RetryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            let last = attempt + 1 == attempts;
            match send().await {
                Ok(response) => {
                    let status = response.status();
                    if !RETRYABLE_STATUS.contains(&status.as_u16()) || last {
                        return Ok(response);
                    }
                    let wait = if status == StatusCode::TOO_MANY_REQUESTS {
                        let reset = response
                            .headers()
                            .get(RATE_LIMIT_RESET_HEADER)
                            .and_then(|v| v.to_str().ok());
                        let wait = rate_limit_wait(reset, chrono::Utc::now().timestamp());
                        warn!(wait_secs = wait.as_secs(), "rate limited, waiting for reset");
                        wait
                    } else {
                        let wait = self.jittered_backoff(attempt);
                        debug!(status = status.as_u16(), attempt, wait_ms = wait.as_millis() as u64, "retrying");
                        wait
                    };
                    sleep_or_cancel(shutdown, wait).await?;
                }
                Err(err) => {
                    if last {
                        return Err(err.into());
                    }
                    let wait = self.jittered_backoff(attempt);
                    debug!(error = %err, attempt, wait_ms = wait.as_millis() as u64, "network error, retrying");
                    sleep_or_cancel(shutdown, wait).await?;
                }
            }
            attempt += 1;
        }
    }
}

/// Wait derived from a rate-limit reset header value (epoch seconds).
/// Absent or unparseable headers, and resets further out than the cap,
/// yield the 60-second cap; resets in the past yield zero.
fn rate_limit_wait(reset_header: Option<&str>, now_epoch: i64) -> Duration {
    match reset_header.and_then(|v| v.parse::<i64>().ok()) {
        Some(reset) => {
            let delta = reset.saturating_sub(now_epoch);
            if delta <= 0 {
                Duration::ZERO
            } else {
                Duration::from_secs(delta as u64).min(RATE_LIMIT_WAIT_CAP)
            }
        }
        None => RATE_LIMIT_WAIT_CAP,
    }
}

async fn sleep_or_cancel(shutdown: &Shutdown, wait: Duration) -> Result<(), RetryError> {
    tokio::select! {
        _ = sleep(wait) => Ok(()),
        _ = shutdown.cancelled() => Err(RetryError::Cancelled),
    }
}
