use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use confscope_config::Config;

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_toml_with(section: &str, key: &str, replacement: Value) -> String {
	let mut value: Value =
		toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let root = value.as_table_mut().expect("Sample config must be a table.");
	let table = root
		.get_mut(section)
		.and_then(Value::as_table_mut)
		.expect("Sample config must include the requested section.");

	table.insert(key.to_string(), replacement);

	toml::to_string(&value).expect("Failed to render sample config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("confscope_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn base_config() -> Config {
	toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse test config.")
}

#[test]
fn sample_config_loads_and_anchors_paths() {
	let path = write_temp_config(SAMPLE_CONFIG_TOML.to_string());
	let result = confscope_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Expected sample config to load.");
	let base = path.parent().expect("Temp config must have a parent.");

	assert_eq!(cfg.cache.ttl_seconds, 1_800);
	assert_eq!(cfg.index.storage_dir, base.join("storage"));
	assert_eq!(cfg.index.source_documents, vec![base.join("data/manual.txt")]);
	assert_eq!(cfg.telemetry.attributes.get("deployment").map(String::as_str), Some("test"));
}

#[test]
fn cache_ttl_must_be_positive() {
	let payload = sample_toml_with("cache", "ttl_seconds", Value::Integer(0));
	let path = write_temp_config(payload);
	let result = confscope_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected cache TTL validation error.");

	assert!(
		err.to_string().contains("cache.ttl_seconds must be greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn blank_credentials_are_normalized_away() {
	let payload = sample_toml_with("telemetry", "api_key", Value::String("   ".to_string()));
	let path = write_temp_config(payload);
	let result = confscope_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Expected config with blank api_key to load.");

	assert!(cfg.telemetry.api_key.is_none());
	assert_eq!(cfg.telemetry.space_id.as_deref(), Some("space"));
}

#[test]
fn allowed_keys_reject_assignment_syntax() {
	let mut cfg = base_config();

	cfg.overrides.allowed_keys.push("BROKEN=KEY".to_string());

	let err =
		confscope_config::validate(&cfg).expect_err("Expected allowed_keys validation error.");

	assert!(err.to_string().contains("overrides.allowed_keys"), "Unexpected error: {err}");
}

#[test]
fn retry_backoff_bounds_must_be_ordered() {
	let mut cfg = base_config();

	cfg.retry.base_backoff_ms = 20_000;

	let err = confscope_config::validate(&cfg).expect_err("Expected retry validation error.");

	assert!(
		err.to_string().contains("retry.base_backoff_ms must not exceed retry.max_backoff_ms."),
		"Unexpected error: {err}"
	);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
	let cfg: Config = toml::from_str(
		r#"
[service]
log_level = "debug"

[index]
storage_dir = "storage"
source_documents = ["a.txt"]
"#,
	)
	.expect("Failed to parse minimal config.");

	assert!(confscope_config::validate(&cfg).is_ok());
	assert!(!cfg.telemetry.enabled);
	assert_eq!(cfg.retry.max_attempts, 3);
	assert_eq!(cfg.index.top_k, 3);
	assert!(cfg.overrides.allowed_keys.contains(&"OPENAI_API_KEY".to_string()));
}

#[test]
fn enabled_telemetry_requires_endpoint() {
	let mut cfg = base_config();

	cfg.telemetry.endpoint = " ".to_string();

	let err = confscope_config::validate(&cfg).expect_err("Expected endpoint validation error.");

	assert!(
		err.to_string().contains("telemetry.endpoint must be non-empty"),
		"Unexpected error: {err}"
	);
}
