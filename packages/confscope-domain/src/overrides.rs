use std::{
	collections::{BTreeMap, HashMap},
	fmt,
};

/// A validated, allow-listed set of per-request configuration overrides.
///
/// Keys are kept sorted so two sets built from the same pairs in any order compare equal and
/// serialize identically.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrideSet {
	values: BTreeMap<String, String>,
}
impl ConfigOverrideSet {
	/// Drops keys outside `cfg.allowed_keys` and blank values. Values are kept as supplied.
	pub fn validate(
		raw: Option<&HashMap<String, String>>,
		cfg: &confscope_config::Overrides,
	) -> Self {
		let Some(raw) = raw else {
			return Self::default();
		};
		let mut values = BTreeMap::new();

		for (key, value) in raw {
			if !cfg.allowed_keys.iter().any(|allowed| allowed == key) {
				tracing::debug!(key = %key, "Dropping override outside the allow-list.");

				continue;
			}
			if value.trim().is_empty() {
				tracing::debug!(key = %key, "Dropping blank override.");

				continue;
			}

			values.insert(key.clone(), value.clone());
		}

		Self { values }
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.values.get(key).map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.values.iter().map(|(key, value)| (key.as_str(), value.as_str()))
	}

	pub fn keys(&self) -> impl Iterator<Item = &str> {
		self.values.keys().map(String::as_str)
	}
}
// Values are usually credentials, so only keys are printed.
impl fmt::Debug for ConfigOverrideSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.values.keys()).finish()
	}
}
