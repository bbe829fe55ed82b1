pub mod backend;
pub mod keyword;
pub mod loader;
pub mod retry;
pub mod staleness;

mod error;

pub use backend::{Document, DocumentReader, IndexBackend, Retriever, ScoredDocument, SearchIndex};
pub use error::{Error, Result};
pub use keyword::{KeywordBackend, KeywordIndex, PlainTextReader};
pub use loader::IndexLoader;
pub use retry::RetryPolicy;
pub use staleness::{IndexDecision, IndexStalenessSnapshot, REQUIRED_FILES, RebuildReason};

use std::{future::Future, pin::Pin};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
