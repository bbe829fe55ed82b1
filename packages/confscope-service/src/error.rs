pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Telemetry(#[from] confscope_telemetry::Error),
	#[error(transparent)]
	Index(#[from] confscope_index::Error),
}
