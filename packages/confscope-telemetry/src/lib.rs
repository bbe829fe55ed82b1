pub mod config;
pub mod exporter;
pub mod instrumentation;
pub mod manager;
pub mod provider;

mod error;

pub use opentelemetry_sdk::{
	error::OTelSdkResult,
	trace::{BatchSpanProcessor, SpanData, SpanExporter, Tracer},
};

pub use config::{BatchSettings, TelemetryConfig};
pub use error::{Error, Result};
pub use exporter::{ExporterFactory, OtlpExporterFactory};
pub use instrumentation::{GlobalProviderInstrumentor, Instrumentor};
pub use manager::TelemetryManager;
pub use provider::TracerProvider;
