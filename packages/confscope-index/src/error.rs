use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("I/O error at {path:?}: {source}")]
	Io { path: PathBuf, source: std::io::Error },
	#[error("Source documents not found: {message}")]
	SourceNotFound { message: String },
	#[error("Persisted index at {path:?} is corrupt: {message}")]
	Corrupt { path: PathBuf, message: String },
	#[error("Index backend unavailable: {message}")]
	Unavailable { message: String },
	#[error("Index backend error: {message}")]
	Backend { message: String },
	#[error("Index operation cancelled.")]
	Cancelled,
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
impl Error {
	pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
		Self::Io { path: path.into(), source }
	}

	/// Whether retrying the same operation may succeed.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Io { .. } | Self::Unavailable { .. })
	}
}
