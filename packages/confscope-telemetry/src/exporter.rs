use std::{collections::HashMap, time::Duration};

use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, SpanExporter};

use crate::{BatchSettings, Error, Result};

/// Environment variable the OTLP exporter reads headers from, as comma-separated `key=value`
/// pairs.
pub const TRACES_HEADERS_ENV: &str = "OTEL_EXPORTER_OTLP_TRACES_HEADERS";

/// Builds the span processor of one pipeline.
///
/// `headers` is `None` when credentials travel through [`TRACES_HEADERS_ENV`].
pub trait ExporterFactory
where
	Self: Send + Sync,
{
	fn build(
		&self,
		endpoint: &str,
		headers: Option<&[(String, String)]>,
		timeout: Duration,
		batch: &BatchSettings,
	) -> Result<BatchSpanProcessor>;
}

/// Exports spans as OTLP protobuf over HTTP.
#[derive(Debug, Default, Clone, Copy)]
pub struct OtlpExporterFactory;
impl ExporterFactory for OtlpExporterFactory {
	fn build(
		&self,
		endpoint: &str,
		headers: Option<&[(String, String)]>,
		timeout: Duration,
		batch: &BatchSettings,
	) -> Result<BatchSpanProcessor> {
		let mut builder = opentelemetry_otlp::SpanExporter::builder()
			.with_http()
			.with_endpoint(traces_endpoint(endpoint))
			.with_timeout(timeout);

		if let Some(pairs) = headers {
			builder = builder.with_headers(pairs.iter().cloned().collect::<HashMap<_, _>>());
		}

		let exporter =
			builder.build().map_err(|err| Error::Exporter { message: err.to_string() })?;

		Ok(batch_processor(exporter, batch))
	}
}

/// Wraps `exporter` in a batch processor that exports from its own background thread.
pub fn batch_processor<E>(exporter: E, batch: &BatchSettings) -> BatchSpanProcessor
where
	E: SpanExporter + 'static,
{
	let config = BatchConfigBuilder::default()
		.with_max_export_batch_size(batch.max_batch_size)
		.with_scheduled_delay(batch.flush_interval)
		.build();

	BatchSpanProcessor::builder(exporter).with_batch_config(config).build()
}

/// The OTLP/HTTP traces URL under a collector base such as `https://otlp.arize.com/v1`.
pub fn traces_endpoint(base: &str) -> String {
	let base = base.trim_end_matches('/');

	if base.ends_with("/traces") { base.to_string() } else { format!("{base}/traces") }
}

pub fn format_header_list(pairs: &[(String, String)]) -> String {
	pairs.iter().map(|(key, value)| format!("{key}={value}")).collect::<Vec<_>>().join(",")
}
