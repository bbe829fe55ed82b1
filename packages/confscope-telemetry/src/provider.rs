use std::{
	collections::BTreeMap,
	fmt,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
};

use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_sdk::{
	Resource,
	trace::{BatchSpanProcessor, SdkTracerProvider, Tracer},
};

use crate::{Error, Result};

/// Handle to one configured pipeline. Clones share the pipeline.
#[derive(Clone)]
pub struct TracerProvider {
	inner: SdkTracerProvider,
	resource: Resource,
	is_shutdown: Arc<AtomicBool>,
}
impl TracerProvider {
	pub fn new(attributes: BTreeMap<String, String>, processor: BatchSpanProcessor) -> Self {
		let resource = Resource::builder_empty()
			.with_attributes(attributes.into_iter().map(|(key, value)| KeyValue::new(key, value)))
			.build();
		let inner = SdkTracerProvider::builder()
			.with_span_processor(processor)
			.with_resource(resource.clone())
			.build();

		Self { inner, resource, is_shutdown: Arc::new(AtomicBool::new(false)) }
	}

	pub fn get_tracer(&self, name: &str) -> Tracer {
		self.inner.tracer(name.to_string())
	}

	pub fn resource(&self) -> &Resource {
		&self.resource
	}

	pub fn resource_attribute(&self, key: &str) -> Option<String> {
		self.resource
			.iter()
			.find(|(candidate, _)| candidate.as_str() == key)
			.map(|(_, value)| value.as_str().into_owned())
	}

	pub fn sdk(&self) -> &SdkTracerProvider {
		&self.inner
	}

	/// Whether spans started from this provider are still exported.
	pub fn is_active(&self) -> bool {
		!self.is_shutdown.load(Ordering::Acquire)
	}

	/// Flushes pending spans and shuts the exporter down. Blocks until the export thread answers;
	/// later calls are no-ops.
	pub(crate) fn shutdown_blocking(&self) -> Result<()> {
		if self.is_shutdown.swap(true, Ordering::AcqRel) {
			return Ok(());
		}

		self.inner.shutdown().map_err(|err| Error::Provider { message: err.to_string() })
	}
}
impl fmt::Debug for TracerProvider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TracerProvider")
			.field("resource", &self.resource)
			.field("is_active", &self.is_active())
			.finish_non_exhaustive()
	}
}
