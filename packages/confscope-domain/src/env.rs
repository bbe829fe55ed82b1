//! Scoped mutation of the process environment.
//!
//! Every write to the environment made by this workspace goes through [`set_var`] and
//! [`restore_var`], which serialize on one process-wide lock. [`ScopedEnvironment`] records the
//! prior value of each key it touches and puts it back in `Drop`, so restoration also runs on
//! early returns, panics, and dropped futures.

use std::{
	ffi::{OsStr, OsString},
	future::Future,
	sync::Mutex,
};

use crate::overrides::ConfigOverrideSet;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Sets `key` and returns its previous value, or `None` when the write was refused.
///
/// The outer `Option` reports whether the write happened; the inner one is the prior value.
pub fn set_var(key: &str, value: &str) -> Option<Option<OsString>> {
	if !is_valid_key(OsStr::new(key)) || value.contains('\0') {
		tracing::warn!(key = %key, "Refusing to set environment variable with invalid key or value.");

		return None;
	}

	let _lock = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
	let prior = std::env::var_os(key);

	// SAFETY: all environment writes in this workspace hold `ENV_LOCK`, and callers serialize
	// reconfiguration so no other thread reads these keys mid-write.
	unsafe { std::env::set_var(key, value) };

	Some(prior)
}

/// Puts `key` back to `prior`, removing it when it was previously absent. Never panics.
pub fn restore_var(key: &str, prior: Option<&OsStr>) {
	if !is_valid_key(OsStr::new(key)) {
		tracing::error!(key = %key, "Cannot restore environment variable with an invalid key.");

		return;
	}

	let _lock = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());

	match prior {
		Some(value) if value.as_encoded_bytes().contains(&0) => {
			tracing::error!(key = %key, "Cannot restore environment variable containing NUL.");
		},
		// SAFETY: see `set_var`.
		Some(value) => unsafe { std::env::set_var(key, value) },
		// SAFETY: see `set_var`.
		None => unsafe { std::env::remove_var(key) },
	}
}

fn is_valid_key(key: &OsStr) -> bool {
	let bytes = key.as_encoded_bytes();

	!bytes.is_empty() && !bytes.contains(&b'=') && !bytes.contains(&0)
}

/// Overrides applied to the process environment until this value is dropped.
#[must_use = "overrides are rolled back as soon as the scope is dropped"]
pub struct ScopedEnvironment {
	saved: Vec<(String, Option<OsString>)>,
}
impl ScopedEnvironment {
	pub fn apply(overrides: &ConfigOverrideSet) -> Self {
		let mut saved = Vec::with_capacity(overrides.len());

		for (key, value) in overrides.iter() {
			if let Some(prior) = set_var(key, value) {
				tracing::info!(key = %key, "Temporarily set environment variable.");

				saved.push((key.to_string(), prior));
			}
		}

		Self { saved }
	}

	/// Runs `body` with `overrides` applied. An empty set leaves the environment untouched.
	pub fn apply_and_run<T>(overrides: &ConfigOverrideSet, body: impl FnOnce() -> T) -> T {
		let _scope = Self::apply(overrides);

		body()
	}

	/// Async form of [`Self::apply_and_run`]; the overrides stay applied across awaits.
	pub async fn scope<F>(overrides: &ConfigOverrideSet, body: F) -> F::Output
	where
		F: Future,
	{
		let _scope = Self::apply(overrides);

		body.await
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.saved.iter().map(|(key, _)| key.as_str())
	}
}
impl Drop for ScopedEnvironment {
	fn drop(&mut self) {
		for (key, prior) in self.saved.drain(..).rev() {
			restore_var(&key, prior.as_deref());

			tracing::info!(key = %key, "Restored environment variable.");
		}
	}
}
