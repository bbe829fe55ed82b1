use std::fmt;

use serde_json::{Map, Value};

use crate::overrides::ConfigOverrideSet;

/// Reserved key for requests that carry no overrides.
pub const DEFAULT_FINGERPRINT: &str = "default";

const FINGERPRINT_SCHEMA_VERSION: u32 = 1;
const FINGERPRINT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheFingerprint(String);
impl CacheFingerprint {
	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn is_default(&self) -> bool {
		self.0 == DEFAULT_FINGERPRINT
	}
}
impl fmt::Display for CacheFingerprint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Maps an override set to its cache key.
///
/// The key is a prefix of the BLAKE3 digest of the set's canonical JSON form: keys sorted, no
/// whitespace, wrapped with a schema version.
pub fn fingerprint(overrides: Option<&ConfigOverrideSet>) -> CacheFingerprint {
	let Some(overrides) = overrides.filter(|set| !set.is_empty()) else {
		return CacheFingerprint(DEFAULT_FINGERPRINT.to_string());
	};
	let pairs = overrides
		.iter()
		.map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
		.collect::<Map<_, _>>();
	let payload = serde_json::json!({
		"schema": FINGERPRINT_SCHEMA_VERSION,
		"overrides": pairs,
	});
	let hex = blake3::hash(payload.to_string().as_bytes()).to_hex();

	CacheFingerprint(hex[..FINGERPRINT_LEN].to_string())
}
