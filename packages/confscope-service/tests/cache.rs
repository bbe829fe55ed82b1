use std::{
	collections::HashMap,
	env,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use confscope_config::{Overrides, TelemetryOverrideKeys};
use confscope_domain::DEFAULT_FINGERPRINT;
use confscope_service::{CacheSettings, ComponentCache, Error, TelemetrySettings};
use confscope_telemetry::{TelemetryConfig, TelemetryManager, config::DEFAULT_ENDPOINT};
use confscope_testkit::RecordingExporterFactory;

const SCOPED_KEY: &str = "CONFSCOPE_SERVICE_TEST_SCOPED";

#[derive(Debug, thiserror::Error)]
enum BuildFailure {
	#[error("builder failed")]
	Builder,
	#[error(transparent)]
	Service(#[from] Error),
}

fn settings(ttl: Duration) -> CacheSettings {
	CacheSettings {
		ttl,
		overrides: Overrides {
			allowed_keys: vec!["ARIZE_MODEL_ID".to_string(), SCOPED_KEY.to_string()],
		},
		telemetry: None,
	}
}

fn telemetry_settings() -> TelemetrySettings {
	TelemetrySettings {
		base: TelemetryConfig {
			space_id: Some("space".to_string()),
			api_key: Some("key".to_string()),
			..TelemetryConfig::new(DEFAULT_ENDPOINT)
		},
		override_keys: TelemetryOverrideKeys::default(),
	}
}

fn manager(factory: &RecordingExporterFactory) -> Arc<tokio::sync::Mutex<TelemetryManager>> {
	Arc::new(tokio::sync::Mutex::new(TelemetryManager::new(Arc::new(factory.clone()))))
}

fn overrides(pairs: &[(&str, &str)]) -> HashMap<String, String> {
	pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
}

async fn counted_build(
	cache: &ComponentCache<usize>,
	raw: Option<&HashMap<String, String>>,
	builds: &Arc<AtomicUsize>,
) -> Arc<usize> {
	let builds = builds.clone();

	cache
		.get_or_build(raw, |_| async move { Ok::<_, Error>(builds.fetch_add(1, Ordering::SeqCst)) })
		.await
		.expect("Failed to build bundle.")
}

#[tokio::test]
async fn second_request_within_ttl_reuses_bundle() {
	let factory = RecordingExporterFactory::new();
	let cache = ComponentCache::new(settings(Duration::from_secs(60)), manager(&factory));
	let builds = Arc::new(AtomicUsize::new(0));
	let raw = overrides(&[("ARIZE_MODEL_ID", "m1")]);
	let first = counted_build(&cache, Some(&raw), &builds).await;
	let second = counted_build(&cache, Some(&raw), &builds).await;

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(builds.load(Ordering::SeqCst), 1);
	assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn expired_bundle_is_rebuilt() {
	let factory = RecordingExporterFactory::new();
	let cache = ComponentCache::new(settings(Duration::from_millis(50)), manager(&factory));
	let builds = Arc::new(AtomicUsize::new(0));

	counted_build(&cache, None, &builds).await;
	tokio::time::sleep(Duration::from_millis(80)).await;
	counted_build(&cache, None, &builds).await;

	assert_eq!(builds.load(Ordering::SeqCst), 2);
	assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn unknown_keys_and_blank_values_share_the_default_entry() {
	let factory = RecordingExporterFactory::new();
	let cache = ComponentCache::new(settings(Duration::from_secs(60)), manager(&factory));
	let builds = Arc::new(AtomicUsize::new(0));
	let noise = overrides(&[("NOT_ALLOWED", "x"), ("ARIZE_MODEL_ID", "  ")]);

	counted_build(&cache, None, &builds).await;
	counted_build(&cache, Some(&noise), &builds).await;
	counted_build(&cache, Some(&HashMap::new()), &builds).await;

	assert_eq!(builds.load(Ordering::SeqCst), 1);
	assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn distinct_model_ids_configure_telemetry_per_build() {
	let factory = RecordingExporterFactory::new();
	let cache = ComponentCache::new(
		CacheSettings {
			telemetry: Some(telemetry_settings()),
			..settings(Duration::from_secs(60))
		},
		manager(&factory),
	);
	let seen = Arc::new(Mutex::new(Vec::new()));

	for model_id in ["m1", "m2"] {
		let raw = overrides(&[("ARIZE_MODEL_ID", model_id)]);
		let seen = seen.clone();

		cache
			.get_or_build(Some(&raw), |ctx| async move {
				let provider = ctx.provider.expect("Expected a configured provider.");
				let model_id = provider.resource_attribute("model_id");

				seen.lock().unwrap_or_else(|err| err.into_inner()).push(model_id);

				Ok::<_, Error>(ctx.fingerprint)
			})
			.await
			.expect("Failed to build bundle.");
	}

	let seen = seen.lock().unwrap_or_else(|err| err.into_inner()).clone();

	assert_eq!(seen, vec![Some("m1".to_string()), Some("m2".to_string())]);
	assert_eq!(cache.len(), 2);
	assert_eq!(factory.events(), vec!["build:1", "shutdown:1", "build:2"]);

	cache.telemetry().lock().await.shutdown().await;
}

#[tokio::test]
async fn cache_hit_reactivates_the_pipeline_it_was_built_under() {
	let factory = RecordingExporterFactory::new();
	let cache = ComponentCache::new(
		CacheSettings {
			telemetry: Some(telemetry_settings()),
			..settings(Duration::from_secs(60))
		},
		manager(&factory),
	);
	let builds = Arc::new(AtomicUsize::new(0));
	let m1 = overrides(&[("ARIZE_MODEL_ID", "m1")]);
	let m2 = overrides(&[("ARIZE_MODEL_ID", "m2")]);

	counted_build(&cache, Some(&m1), &builds).await;
	counted_build(&cache, Some(&m2), &builds).await;
	counted_build(&cache, Some(&m1), &builds).await;
	counted_build(&cache, Some(&m1), &builds).await;

	let active = cache.telemetry().lock().await.current_config().map(|cfg| cfg.model_id.clone());

	assert_eq!(builds.load(Ordering::SeqCst), 2);
	assert_eq!(active.as_deref(), Some("m1"));
	assert_eq!(factory.events(), vec!["build:1", "shutdown:1", "build:2", "shutdown:2", "build:3"]);

	cache.telemetry().lock().await.shutdown().await;
}

#[tokio::test]
async fn failed_build_is_not_cached_and_stops_telemetry() {
	let factory = RecordingExporterFactory::new();
	let cache: ComponentCache<usize> = ComponentCache::new(
		CacheSettings {
			telemetry: Some(telemetry_settings()),
			..settings(Duration::from_secs(60))
		},
		manager(&factory),
	);
	let err = cache
		.get_or_build(None, |_| async { Err(BuildFailure::Builder) })
		.await
		.expect_err("Expected builder failure.");

	assert!(matches!(err, BuildFailure::Builder));
	assert!(cache.is_empty());
	assert!(!cache.telemetry().lock().await.is_configured());
	assert_eq!(factory.events(), vec!["build:1", "shutdown:1"]);

	let builds = Arc::new(AtomicUsize::new(0));

	counted_build(&cache, None, &builds).await;

	assert_eq!(builds.load(Ordering::SeqCst), 1);

	cache.telemetry().lock().await.shutdown().await;
}

#[tokio::test]
async fn telemetry_configuration_errors_propagate() {
	let factory = RecordingExporterFactory::new();
	let mut telemetry = telemetry_settings();

	telemetry.base.api_key = None;

	let cache: ComponentCache<usize> = ComponentCache::new(
		CacheSettings { telemetry: Some(telemetry), ..settings(Duration::from_secs(60)) },
		manager(&factory),
	);
	let err = cache
		.get_or_build(None, |_| async { Ok::<_, Error>(1) })
		.await
		.expect_err("Expected telemetry configuration error.");

	assert!(matches!(err, Error::Telemetry(confscope_telemetry::Error::Configuration { .. })));
	assert!(cache.is_empty());
}

#[tokio::test]
async fn concurrent_misses_build_once() {
	let factory = RecordingExporterFactory::new();
	let cache = ComponentCache::new(settings(Duration::from_secs(60)), manager(&factory));
	let builds = Arc::new(AtomicUsize::new(0));
	let build = || {
		let builds = builds.clone();

		cache.get_or_build(None, |_| async move {
			tokio::time::sleep(Duration::from_millis(20)).await;

			Ok::<_, Error>(builds.fetch_add(1, Ordering::SeqCst))
		})
	};
	let (first, second) = tokio::join!(build(), build());

	assert_eq!(first.expect("Failed to build bundle."), second.expect("Failed to build bundle."));
	assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn overrides_are_visible_during_build_and_restored_afterwards() {
	let factory = RecordingExporterFactory::new();
	let cache = ComponentCache::new(settings(Duration::from_secs(60)), manager(&factory));
	let raw = overrides(&[(SCOPED_KEY, "scoped")]);

	confscope_domain::env::restore_var(SCOPED_KEY, None);

	let observed = cache
		.get_or_build(Some(&raw), |ctx| async move {
			assert_eq!(ctx.overrides.get(SCOPED_KEY), Some("scoped"));

			Ok::<_, Error>(env::var(SCOPED_KEY).ok())
		})
		.await
		.expect("Failed to build bundle.");

	assert_eq!(observed.as_deref(), Some("scoped"));
	assert!(env::var_os(SCOPED_KEY).is_none());
}

#[tokio::test]
async fn clear_drops_every_entry() {
	let factory = RecordingExporterFactory::new();
	let cache = ComponentCache::new(settings(Duration::from_secs(60)), manager(&factory));
	let builds = Arc::new(AtomicUsize::new(0));
	let raw = overrides(&[("ARIZE_MODEL_ID", "m1")]);

	counted_build(&cache, None, &builds).await;
	counted_build(&cache, Some(&raw), &builds).await;

	assert_eq!(cache.len(), 2);

	cache.clear();

	assert!(cache.is_empty());

	counted_build(&cache, None, &builds).await;

	assert_eq!(builds.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn default_requests_use_the_sentinel_fingerprint() {
	let factory = RecordingExporterFactory::new();
	let cache = ComponentCache::new(settings(Duration::from_secs(60)), manager(&factory));
	let fingerprint = cache
		.get_or_build(None, |ctx| async move { Ok::<_, Error>(ctx.fingerprint) })
		.await
		.expect("Failed to build bundle.");

	assert_eq!(fingerprint.as_str(), DEFAULT_FINGERPRINT);
	assert!(cache.contains(&fingerprint));
}
