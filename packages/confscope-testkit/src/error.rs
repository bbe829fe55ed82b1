use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Message(String),

	#[error("I/O error at {path}: {source}")]
	Io { path: PathBuf, source: std::io::Error },
}
impl Error {
	pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
		Self::Io { path: path.to_path_buf(), source }
	}
}
