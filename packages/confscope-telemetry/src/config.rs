use std::{collections::BTreeMap, fmt, time::Duration};

use confscope_config::TelemetryOverrideKeys;
use confscope_domain::ConfigOverrideSet;

use crate::{Error, Result};

pub const DEFAULT_ENDPOINT: &str = "https://otlp.arize.com/v1";
pub const DEFAULT_MODEL_ID: &str = "default_model";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchSettings {
	pub max_batch_size: usize,
	pub flush_interval: Duration,
}
impl Default for BatchSettings {
	fn default() -> Self {
		Self { max_batch_size: 512, flush_interval: Duration::from_secs(5) }
	}
}

/// Everything needed to stand up one export pipeline.
#[derive(Clone, PartialEq)]
pub struct TelemetryConfig {
	pub endpoint: String,
	pub space_id: Option<String>,
	pub api_key: Option<String>,
	pub model_id: String,
	pub additional_attributes: BTreeMap<String, String>,
	/// Publish credentials through `OTEL_EXPORTER_OTLP_TRACES_HEADERS` instead of handing them to
	/// the exporter.
	pub use_env_headers: bool,
	pub timeout: Duration,
	pub batch: BatchSettings,
}
impl TelemetryConfig {
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self {
			endpoint: endpoint.into(),
			space_id: None,
			api_key: None,
			model_id: DEFAULT_MODEL_ID.to_string(),
			additional_attributes: BTreeMap::new(),
			use_env_headers: false,
			timeout: Duration::from_secs(10),
			batch: BatchSettings::default(),
		}
	}

	pub fn from_config(cfg: &confscope_config::Telemetry) -> Self {
		Self {
			endpoint: cfg.endpoint.clone(),
			space_id: cfg.space_id.clone(),
			api_key: cfg.api_key.clone(),
			model_id: cfg.model_id.clone(),
			additional_attributes: cfg.attributes.clone(),
			use_env_headers: cfg.use_env_headers,
			timeout: Duration::from_millis(cfg.timeout_ms),
			batch: BatchSettings {
				max_batch_size: cfg.max_batch_size,
				flush_interval: Duration::from_millis(cfg.flush_interval_ms),
			},
		}
	}

	/// Reads credentials from the ambient environment using the default key names.
	pub fn from_env(use_env_headers: bool) -> Self {
		let keys = TelemetryOverrideKeys::default();
		let read = |key: &str| std::env::var(key).ok().filter(|value| !value.trim().is_empty());

		Self {
			space_id: read(&keys.space_id),
			api_key: read(&keys.api_key),
			model_id: read(&keys.model_id).unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
			use_env_headers,
			..Self::new(DEFAULT_ENDPOINT)
		}
	}

	/// Returns a copy with credentials and model id taken from `overrides` where present.
	pub fn with_overrides(
		&self,
		overrides: &ConfigOverrideSet,
		keys: &TelemetryOverrideKeys,
	) -> Self {
		let mut cfg = self.clone();

		if let Some(space_id) = overrides.get(&keys.space_id) {
			cfg.space_id = Some(space_id.to_string());
		}
		if let Some(api_key) = overrides.get(&keys.api_key) {
			cfg.api_key = Some(api_key.to_string());
		}
		if let Some(model_id) = overrides.get(&keys.model_id) {
			cfg.model_id = model_id.to_string();
		}

		cfg
	}

	pub fn validate(&self) -> Result<()> {
		let present =
			|value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());

		if !present(&self.space_id) || !present(&self.api_key) {
			return Err(Error::Configuration {
				message: "space_id and api_key must be provided in configuration.".to_string(),
			});
		}
		if self.endpoint.trim().is_empty() {
			return Err(Error::Configuration { message: "endpoint must be non-empty.".to_string() });
		}
		if self.batch.max_batch_size == 0 {
			return Err(Error::Configuration {
				message: "max_batch_size must be greater than zero.".to_string(),
			});
		}

		Ok(())
	}

	pub fn resource_attributes(&self) -> BTreeMap<String, String> {
		let mut attributes = BTreeMap::from([("model_id".to_string(), self.model_id.clone())]);

		attributes.extend(self.additional_attributes.iter().map(|(k, v)| (k.clone(), v.clone())));

		attributes
	}

	pub(crate) fn header_pairs(&self) -> Vec<(String, String)> {
		vec![
			("space_id".to_string(), self.space_id.clone().unwrap_or_default()),
			("api_key".to_string(), self.api_key.clone().unwrap_or_default()),
		]
	}
}
impl fmt::Debug for TelemetryConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TelemetryConfig")
			.field("endpoint", &self.endpoint)
			.field("space_id", &self.space_id)
			.field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
			.field("model_id", &self.model_id)
			.field("additional_attributes", &self.additional_attributes)
			.field("use_env_headers", &self.use_env_headers)
			.field("timeout", &self.timeout)
			.field("batch", &self.batch)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	#[test]
	fn missing_credentials_are_rejected() {
		let cfg = TelemetryConfig {
			space_id: Some("space".to_string()),
			..TelemetryConfig::new(DEFAULT_ENDPOINT)
		};
		let err = cfg.validate().expect_err("Expected configuration error.");

		assert!(matches!(err, Error::Configuration { .. }));
	}

	#[test]
	fn overrides_replace_model_and_credentials() {
		let keys = TelemetryOverrideKeys::default();
		let raw = HashMap::from([
			(keys.model_id.clone(), "m2".to_string()),
			(keys.api_key.clone(), "override-key".to_string()),
		]);
		let allowed = confscope_config::Overrides::default();
		let overrides = ConfigOverrideSet::validate(Some(&raw), &allowed);
		let base = TelemetryConfig {
			space_id: Some("space".to_string()),
			api_key: Some("base-key".to_string()),
			..TelemetryConfig::new(DEFAULT_ENDPOINT)
		};
		let merged = base.with_overrides(&overrides, &keys);

		assert_eq!(merged.model_id, "m2");
		assert_eq!(merged.api_key.as_deref(), Some("override-key"));
		assert_eq!(merged.space_id.as_deref(), Some("space"));
	}

	#[test]
	fn resource_attributes_include_model_id() {
		let mut cfg = TelemetryConfig::new(DEFAULT_ENDPOINT);

		cfg.additional_attributes.insert("deployment".to_string(), "staging".to_string());

		let attributes = cfg.resource_attributes();

		assert_eq!(attributes.get("model_id").map(String::as_str), Some(DEFAULT_MODEL_ID));
		assert_eq!(attributes.get("deployment").map(String::as_str), Some("staging"));
	}
}
