pub mod env;
pub mod fingerprint;
pub mod overrides;

pub use env::ScopedEnvironment;
pub use fingerprint::{CacheFingerprint, DEFAULT_FINGERPRINT, fingerprint};
pub use overrides::ConfigOverrideSet;
