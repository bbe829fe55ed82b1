pub mod bundle;
pub mod cache;

mod error;

pub use bundle::{BundleFactory, QueryBundle, QueryResponse};
pub use cache::{BuildContext, CacheEntry, CacheSettings, ComponentCache, TelemetrySettings};
pub use error::{Error, Result};
