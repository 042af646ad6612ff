// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Retry logic with exponential backoff and jitter for transient failures.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Classifies errors as retryable or terminal.
///
/// Only transient failures (network errors, timeouts, 5xx responses) should
/// report retryable; anything that would fail identically on the next attempt
/// must not.
pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() {
			return true;
		}
		if let Some(status) = self.status() {
			return status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
		}
		false
	}
}

/// Retry behavior configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
	/// Total attempts, including the first.
	pub max_attempts: u32,
	/// Delay before the second attempt; doubles each attempt after that.
	pub base_delay: Duration,
	/// Upper bound on the computed delay, before jitter.
	pub max_delay: Duration,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
			max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
		}
	}
}

impl RetryConfig {
	/// Exponential delay for a completed attempt number (1-based), capped at
	/// `max_delay`. Deterministic; jitter is applied by [`retry`].
	pub fn backoff_delay(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(32);
		let delay = self
			.base_delay
			.saturating_mul(2u32.saturating_pow(exponent));
		delay.min(self.max_delay)
	}
}

/// Run `operation` until it succeeds, the error is terminal, or attempts are
/// exhausted.
///
/// Sleeps between attempts with exponential backoff and half-to-full jitter
/// so concurrent callers do not retry in lockstep. The final error is
/// returned unchanged.
pub async fn retry<T, E, F, Fut>(
	config: &RetryConfig,
	operation_name: &str,
	mut operation: F,
) -> Result<T, E>
where
	E: RetryableError + std::fmt::Display,
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	let mut attempt = 0u32;

	loop {
		attempt += 1;

		match operation().await {
			Ok(value) => {
				if attempt > 1 {
					debug!(operation = operation_name, attempt, "operation succeeded after retry");
				}
				return Ok(value);
			}
			Err(e) if e.is_retryable() && attempt < config.max_attempts => {
				let delay = jittered(config.backoff_delay(attempt));
				warn!(
					operation = operation_name,
					attempt,
					max_attempts = config.max_attempts,
					delay_ms = delay.as_millis() as u64,
					error = %e,
					"transient failure, retrying"
				);
				tokio::time::sleep(delay).await;
			}
			Err(e) => {
				warn!(
					operation = operation_name,
					attempt,
					error = %e,
					"operation failed"
				);
				return Err(e);
			}
		}
	}
}

/// Uniform jitter in `[delay/2, delay]`.
fn jittered(delay: Duration) -> Duration {
	let millis = delay.as_millis() as u64;
	if millis == 0 {
		return delay;
	}
	Duration::from_millis(fastrand::u64(millis / 2..=millis))
}
