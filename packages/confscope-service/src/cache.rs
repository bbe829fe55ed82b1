use std::{
	collections::HashMap,
	future::Future,
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use confscope_config::{Config, Overrides, TelemetryOverrideKeys};
use confscope_domain::{CacheFingerprint, ConfigOverrideSet, ScopedEnvironment, fingerprint};
use confscope_telemetry::{TelemetryConfig, TelemetryManager, TracerProvider};

use crate::Error;

/// Telemetry applied to every build: the configured base, with credentials and model id taken
/// from the request's overrides where present.
#[derive(Debug, Clone)]
pub struct TelemetrySettings {
	pub base: TelemetryConfig,
	pub override_keys: TelemetryOverrideKeys,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
	pub ttl: Duration,
	pub overrides: Overrides,
	/// `None` leaves telemetry untouched during builds.
	pub telemetry: Option<TelemetrySettings>,
}
impl CacheSettings {
	pub fn from_config(cfg: &Config) -> Self {
		let telemetry = cfg.telemetry.enabled.then(|| TelemetrySettings {
			base: TelemetryConfig::from_config(&cfg.telemetry),
			override_keys: cfg.telemetry.override_keys.clone(),
		});

		Self {
			ttl: Duration::from_secs(cfg.cache.ttl_seconds),
			overrides: cfg.overrides.clone(),
			telemetry,
		}
	}
}

/// What a builder gets to work with on a cache miss.
pub struct BuildContext {
	pub overrides: ConfigOverrideSet,
	pub fingerprint: CacheFingerprint,
	/// The pipeline configured for this build, when telemetry is enabled.
	pub provider: Option<TracerProvider>,
	/// The manager that owns `provider`; bundles ask it for tracers at use time.
	pub telemetry: Option<Arc<tokio::sync::Mutex<TelemetryManager>>>,
}

pub struct CacheEntry<B> {
	pub bundle: Arc<B>,
	pub created_at: Instant,
	/// Telemetry the bundle was built under, re-applied on every hit.
	pub telemetry: Option<TelemetryConfig>,
}
impl<B> CacheEntry<B> {
	fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
		now.saturating_duration_since(self.created_at) >= ttl
	}
}

/// Maps override sets to component bundles built under those overrides, for at most `ttl`.
pub struct ComponentCache<B> {
	settings: CacheSettings,
	telemetry: Arc<tokio::sync::Mutex<TelemetryManager>>,
	entries: Mutex<HashMap<CacheFingerprint, CacheEntry<B>>>,
	build_lock: tokio::sync::Mutex<()>,
}
impl<B> ComponentCache<B>
where
	B: Send + Sync,
{
	pub fn new(
		settings: CacheSettings,
		telemetry: Arc<tokio::sync::Mutex<TelemetryManager>>,
	) -> Self {
		Self {
			settings,
			telemetry,
			entries: Mutex::new(HashMap::new()),
			build_lock: tokio::sync::Mutex::new(()),
		}
	}

	pub fn settings(&self) -> &CacheSettings {
		&self.settings
	}

	pub fn telemetry(&self) -> &Arc<tokio::sync::Mutex<TelemetryManager>> {
		&self.telemetry
	}

	/// Returns the bundle cached for `raw_overrides`, building and caching it on a miss.
	///
	/// Builds are serialized: the environment overrides and telemetry configuration of one build
	/// never overlap another's. A failed build caches nothing and shuts telemetry down. A hit
	/// re-activates the telemetry pipeline the bundle was built under when another build has
	/// replaced it.
	pub async fn get_or_build<F, Fut, E>(
		&self,
		raw_overrides: Option<&HashMap<String, String>>,
		builder: F,
	) -> Result<Arc<B>, E>
	where
		F: FnOnce(BuildContext) -> Fut,
		Fut: Future<Output = Result<B, E>>,
		E: From<Error>,
	{
		let overrides = ConfigOverrideSet::validate(raw_overrides, &self.settings.overrides);
		let key = fingerprint(Some(&overrides));

		if let Some((bundle, telemetry)) = self.lookup(&key) {
			tracing::debug!(fingerprint = %key, "Component cache hit.");

			if let Some(cfg) = telemetry {
				let _build = self.build_lock.lock().await;

				self.activate_telemetry(&key, cfg).await?;
			}

			return Ok(bundle);
		}

		let _build = self.build_lock.lock().await;

		if let Some((bundle, telemetry)) = self.lookup(&key) {
			tracing::debug!(fingerprint = %key, "Component bundle built by a concurrent request.");

			if let Some(cfg) = telemetry {
				self.activate_telemetry(&key, cfg).await?;
			}

			return Ok(bundle);
		}

		tracing::info!(fingerprint = %key, overrides = ?overrides, "Building component bundle.");

		let scope = ScopedEnvironment::apply(&overrides);
		let telemetry_cfg = self
			.settings
			.telemetry
			.as_ref()
			.map(|telemetry| telemetry.base.with_overrides(&overrides, &telemetry.override_keys));
		let provider = match telemetry_cfg.clone() {
			Some(cfg) => {
				let provider =
					self.telemetry.lock().await.configure(cfg).await.map_err(Error::from)?;

				Some(provider)
			},
			None => None,
		};
		let ctx = BuildContext {
			overrides,
			fingerprint: key.clone(),
			telemetry: provider.is_some().then(|| self.telemetry.clone()),
			provider,
		};
		let bundle = match builder(ctx).await {
			Ok(bundle) => Arc::new(bundle),
			Err(err) => {
				tracing::warn!(fingerprint = %key, "Component build failed; nothing cached.");

				if self.settings.telemetry.is_some() {
					self.telemetry.lock().await.shutdown().await;
				}

				return Err(err);
			},
		};

		self.store(key.clone(), bundle.clone(), telemetry_cfg);

		drop(scope);

		tracing::info!(fingerprint = %key, "Component bundle cached.");

		Ok(bundle)
	}

	pub fn clear(&self) {
		let mut entries = self.lock_entries();
		let count = entries.len();

		entries.clear();

		tracing::info!(count, "Cleared component cache.");
	}

	pub fn len(&self) -> usize {
		self.lock_entries().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock_entries().is_empty()
	}

	pub fn contains(&self, key: &CacheFingerprint) -> bool {
		self.lock_entries().contains_key(key)
	}

	/// Makes `cfg` the active telemetry configuration unless it already is.
	async fn activate_telemetry(
		&self,
		key: &CacheFingerprint,
		cfg: TelemetryConfig,
	) -> Result<(), Error> {
		let mut telemetry = self.telemetry.lock().await;

		if telemetry.current_config() == Some(&cfg) {
			return Ok(());
		}

		tracing::info!(fingerprint = %key, "Re-activating telemetry for cached bundle.");

		telemetry.configure(cfg).await?;

		Ok(())
	}

	fn lookup(&self, key: &CacheFingerprint) -> Option<(Arc<B>, Option<TelemetryConfig>)> {
		let mut entries = self.lock_entries();
		let now = Instant::now();
		let entry = entries.get(key)?;

		if entry.is_expired(self.settings.ttl, now) {
			entries.remove(key);

			tracing::debug!(fingerprint = %key, "Evicted expired component bundle.");

			return None;
		}

		Some((entry.bundle.clone(), entry.telemetry.clone()))
	}

	fn store(&self, key: CacheFingerprint, bundle: Arc<B>, telemetry: Option<TelemetryConfig>) {
		let mut entries = self.lock_entries();
		let now = Instant::now();

		entries.insert(key, CacheEntry { bundle, created_at: now, telemetry });

		let before = entries.len();

		entries.retain(|_, entry| !entry.is_expired(self.settings.ttl, now));

		if entries.len() < before {
			tracing::debug!(removed = before - entries.len(), "Swept expired component bundles.");
		}
	}

	fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<CacheFingerprint, CacheEntry<B>>> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner())
	}
}
