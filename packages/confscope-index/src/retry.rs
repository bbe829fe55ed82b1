use std::{future::Future, time::Duration};

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_backoff: Duration,
	pub max_backoff: Duration,
}
impl RetryPolicy {
	pub fn from_config(cfg: &confscope_config::Retry) -> Self {
		Self {
			max_attempts: cfg.max_attempts.max(1),
			base_backoff: Duration::from_millis(cfg.base_backoff_ms),
			max_backoff: Duration::from_millis(cfg.max_backoff_ms),
		}
	}

	/// Delay after the `attempt`-th failure: base, doubled per attempt, capped at the maximum.
	pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
		let exp = attempt.max(1).saturating_sub(1).min(16);
		let base = self.base_backoff.saturating_mul(1_u32 << exp);

		base.min(self.max_backoff)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self::from_config(&confscope_config::Retry::default())
	}
}

/// Runs `op` until it succeeds, fails with a non-transient error, or runs out of attempts.
///
/// Cancellation is checked before each attempt and interrupts the backoff sleep.
pub async fn retry<T, F, Fut>(
	policy: &RetryPolicy,
	cancel: &CancellationToken,
	label: &str,
	mut op: F,
) -> Result<T>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut attempt = 1;

	loop {
		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		match op(attempt).await {
			Ok(value) => return Ok(value),
			Err(err) if err.is_transient() && attempt < policy.max_attempts => {
				let delay = policy.backoff_for_attempt(attempt);

				tracing::warn!(
					operation = label,
					attempt,
					max_attempts = policy.max_attempts,
					delay_ms = delay.as_millis() as u64,
					error = %err,
					"Transient failure; retrying."
				);

				tokio::select! {
					_ = cancel.cancelled() => return Err(Error::Cancelled),
					_ = time::sleep(delay) => {},
				}

				attempt += 1;
			},
			Err(err) => return Err(err),
		}
	}
}
