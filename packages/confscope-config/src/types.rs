use std::{collections::BTreeMap, path::PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	#[serde(default)]
	pub overrides: Overrides,
	#[serde(default)]
	pub cache: Cache,
	#[serde(default)]
	pub telemetry: Telemetry,
	pub index: Index,
	#[serde(default)]
	pub retry: Retry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Overrides {
	/// Keys callers may override per request. Anything else is dropped before fingerprinting.
	pub allowed_keys: Vec<String>,
}
impl Default for Overrides {
	fn default() -> Self {
		Self {
			allowed_keys: vec![
				"ARIZE_SPACE_ID".to_string(),
				"ARIZE_MODEL_ID".to_string(),
				"ARIZE_API_KEY".to_string(),
				"OPENAI_API_KEY".to_string(),
			],
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub ttl_seconds: u64,
}
impl Default for Cache {
	fn default() -> Self {
		Self { ttl_seconds: 30 * 60 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Telemetry {
	pub enabled: bool,
	pub endpoint: String,
	pub space_id: Option<String>,
	pub api_key: Option<String>,
	pub model_id: String,
	pub use_env_headers: bool,
	pub timeout_ms: u64,
	pub max_batch_size: usize,
	pub flush_interval_ms: u64,
	pub tracer_name: String,
	pub override_keys: TelemetryOverrideKeys,
	pub attributes: BTreeMap<String, String>,
}
impl Default for Telemetry {
	fn default() -> Self {
		Self {
			enabled: false,
			endpoint: "https://otlp.arize.com/v1".to_string(),
			space_id: None,
			api_key: None,
			model_id: "default_model".to_string(),
			use_env_headers: false,
			timeout_ms: 10_000,
			max_batch_size: 512,
			flush_interval_ms: 5_000,
			tracer_name: "confscope".to_string(),
			override_keys: TelemetryOverrideKeys::default(),
			attributes: BTreeMap::new(),
		}
	}
}

/// Names of the override keys that feed the telemetry credentials and model identifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryOverrideKeys {
	pub space_id: String,
	pub api_key: String,
	pub model_id: String,
}
impl Default for TelemetryOverrideKeys {
	fn default() -> Self {
		Self {
			space_id: "ARIZE_SPACE_ID".to_string(),
			api_key: "ARIZE_API_KEY".to_string(),
			model_id: "ARIZE_MODEL_ID".to_string(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Index {
	pub storage_dir: PathBuf,
	pub source_documents: Vec<PathBuf>,
	#[serde(default = "default_top_k")]
	pub top_k: usize,
	#[serde(default)]
	pub force_rebuild: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retry {
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}
impl Default for Retry {
	fn default() -> Self {
		Self { max_attempts: 3, base_backoff_ms: 4_000, max_backoff_ms: 10_000 }
	}
}

fn default_top_k() -> usize {
	3
}
