//! Hooks that wire library code to the active provider.

use opentelemetry::{global, trace::noop::NoopTracerProvider};

use crate::{Result, TracerProvider};

pub trait Instrumentor
where
	Self: Send + Sync,
{
	fn name(&self) -> &str;

	fn instrument(&self, provider: &TracerProvider) -> Result<()>;

	fn uninstrument(&self);
}

/// Installs the active provider as the OpenTelemetry global, so code that cannot be handed a
/// tracer explicitly can still reach it through `opentelemetry::global::tracer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalProviderInstrumentor;
impl Instrumentor for GlobalProviderInstrumentor {
	fn name(&self) -> &str {
		"global_provider"
	}

	fn instrument(&self, provider: &TracerProvider) -> Result<()> {
		global::set_tracer_provider(provider.sdk().clone());

		Ok(())
	}

	fn uninstrument(&self) {
		global::set_tracer_provider(NoopTracerProvider::new());
	}
}
