pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Telemetry configuration error: {message}")]
	Configuration { message: String },
	#[error("Exporter error: {message}")]
	Exporter { message: String },
	#[error("Tracer provider error: {message}")]
	Provider { message: String },
}
