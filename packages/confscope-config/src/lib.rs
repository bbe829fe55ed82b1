mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Cache, Config, Index, Overrides, Retry, Service, Telemetry, TelemetryOverrideKeys};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	if let Some(base) = path.parent() {
		resolve_paths(&mut cfg, base);
	}

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.overrides.allowed_keys.iter().any(|key| !is_valid_env_key(key)) {
		return Err(Error::Validation {
			message: "overrides.allowed_keys must be non-empty and must not contain '=' or NUL."
				.to_string(),
		});
	}
	if cfg.cache.ttl_seconds == 0 {
		return Err(Error::Validation {
			message: "cache.ttl_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.telemetry.enabled {
		if cfg.telemetry.endpoint.trim().is_empty() {
			return Err(Error::Validation {
				message: "telemetry.endpoint must be non-empty when telemetry is enabled."
					.to_string(),
			});
		}
		if cfg.telemetry.max_batch_size == 0 {
			return Err(Error::Validation {
				message: "telemetry.max_batch_size must be greater than zero.".to_string(),
			});
		}
		if cfg.telemetry.flush_interval_ms == 0 {
			return Err(Error::Validation {
				message: "telemetry.flush_interval_ms must be greater than zero.".to_string(),
			});
		}
		if cfg.telemetry.timeout_ms == 0 {
			return Err(Error::Validation {
				message: "telemetry.timeout_ms must be greater than zero.".to_string(),
			});
		}
	}

	for (label, key) in [
		("telemetry.override_keys.space_id", &cfg.telemetry.override_keys.space_id),
		("telemetry.override_keys.api_key", &cfg.telemetry.override_keys.api_key),
		("telemetry.override_keys.model_id", &cfg.telemetry.override_keys.model_id),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.index.storage_dir.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "index.storage_dir must be non-empty.".to_string(),
		});
	}
	if cfg.index.source_documents.is_empty() {
		return Err(Error::Validation {
			message: "index.source_documents must list at least one document.".to_string(),
		});
	}
	if cfg.index.top_k == 0 {
		return Err(Error::Validation {
			message: "index.top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retry.max_attempts == 0 {
		return Err(Error::Validation {
			message: "retry.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.retry.base_backoff_ms > cfg.retry.max_backoff_ms {
		return Err(Error::Validation {
			message: "retry.base_backoff_ms must not exceed retry.max_backoff_ms.".to_string(),
		});
	}

	Ok(())
}

fn is_valid_env_key(key: &str) -> bool {
	!key.trim().is_empty() && !key.contains('=') && !key.contains('\0')
}

fn normalize(cfg: &mut Config) {
	if cfg.telemetry.space_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
		cfg.telemetry.space_id = None;
	}
	if cfg.telemetry.api_key.as_deref().is_some_and(|key| key.trim().is_empty()) {
		cfg.telemetry.api_key = None;
	}

	for key in &mut cfg.overrides.allowed_keys {
		*key = key.trim().to_string();
	}

	cfg.overrides.allowed_keys.sort();
	cfg.overrides.allowed_keys.dedup();
}

// Relative index paths are anchored at the directory holding the config file.
fn resolve_paths(cfg: &mut Config, base: &Path) {
	if cfg.index.storage_dir.is_relative() {
		cfg.index.storage_dir = base.join(&cfg.index.storage_dir);
	}

	for source in &mut cfg.index.source_documents {
		if source.is_relative() {
			*source = base.join(&*source);
		}
	}
}
