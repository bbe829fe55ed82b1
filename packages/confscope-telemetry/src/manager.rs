use std::{
	ffi::OsString,
	future::Future,
	sync::{Arc, OnceLock},
};

use tokio::sync::Mutex;

use crate::{
	Error, ExporterFactory, GlobalProviderInstrumentor, Instrumentor, OtlpExporterFactory, Result,
	TelemetryConfig, Tracer, TracerProvider,
	exporter::{self, TRACES_HEADERS_ENV},
};

static GLOBAL: OnceLock<Arc<Mutex<TelemetryManager>>> = OnceLock::new();

struct ActivePipeline {
	config: TelemetryConfig,
	provider: TracerProvider,
	/// Header variable this pipeline set, with the value it replaced.
	env_header: Option<(&'static str, Option<OsString>)>,
}

/// Owns at most one telemetry pipeline at a time.
///
/// All operations take `&mut self`; share a manager through `Arc<tokio::sync::Mutex<_>>` so
/// that configure, use, and shutdown never interleave across requests.
pub struct TelemetryManager {
	factory: Arc<dyn ExporterFactory>,
	instrumentors: Vec<Arc<dyn Instrumentor>>,
	active: Option<ActivePipeline>,
}
impl TelemetryManager {
	pub fn new(factory: Arc<dyn ExporterFactory>) -> Self {
		Self { factory, instrumentors: Vec::new(), active: None }
	}

	pub fn with_instrumentor(mut self, instrumentor: Arc<dyn Instrumentor>) -> Self {
		self.instrumentors.push(instrumentor);

		self
	}

	/// The process-wide manager: OTLP exporter, installed as the OpenTelemetry global provider.
	pub fn global() -> Arc<Mutex<TelemetryManager>> {
		GLOBAL
			.get_or_init(|| {
				let manager = TelemetryManager::new(Arc::new(OtlpExporterFactory))
					.with_instrumentor(Arc::new(GlobalProviderInstrumentor));

				Arc::new(Mutex::new(manager))
			})
			.clone()
	}

	pub fn is_configured(&self) -> bool {
		self.active.is_some()
	}

	pub fn current_config(&self) -> Option<&TelemetryConfig> {
		self.active.as_ref().map(|active| &active.config)
	}

	pub fn provider(&self) -> Option<TracerProvider> {
		self.active.as_ref().map(|active| active.provider.clone())
	}

	/// Tears down any active pipeline, then builds and installs one for `cfg`.
	pub async fn configure(&mut self, cfg: TelemetryConfig) -> Result<TracerProvider> {
		self.shutdown().await;
		self.install(cfg)
	}

	pub async fn reconfigure(&mut self, cfg: TelemetryConfig) -> Result<TracerProvider> {
		tracing::info!("Reconfiguring telemetry.");

		self.configure(cfg).await
	}

	pub fn get_tracer(&self, name: &str) -> Option<Tracer> {
		match self.active.as_ref() {
			Some(active) => Some(active.provider.get_tracer(name)),
			None => {
				tracing::warn!("Telemetry is not configured. Call configure() first.");

				None
			},
		}
	}

	/// Stops the active pipeline. Safe to call at any time, including repeatedly.
	pub async fn shutdown(&mut self) {
		let Some(active) = self.take_active() else {
			return;
		};
		let provider = active.provider.clone();
		let result = tokio::task::spawn_blocking(move || provider.shutdown_blocking())
			.await
			.unwrap_or_else(|err| Err(Error::Provider { message: err.to_string() }));

		finish_shutdown(active, result);
	}

	/// Runs `body` under `cfg`, then shuts that pipeline down and re-applies whatever
	/// configuration was active before.
	///
	/// Teardown and restore also run when `body` panics or the returned future is dropped early.
	/// The body's result is returned even when the previous configuration cannot be restored;
	/// that failure is logged and the manager is left unconfigured.
	pub async fn temporary_config<F, Fut, T>(&mut self, cfg: TelemetryConfig, body: F) -> Result<T>
	where
		F: FnOnce(TracerProvider) -> Fut,
		Fut: Future<Output = T>,
	{
		let previous = self.current_config().cloned();
		let mut scope = TemporaryScope { manager: self, previous, finished: false };
		let provider = scope.manager.configure(cfg).await?;
		let output = body(provider).await;

		scope.finish().await;

		Ok(output)
	}

	fn install(&mut self, cfg: TelemetryConfig) -> Result<TracerProvider> {
		cfg.validate()?;

		let env_header = if cfg.use_env_headers {
			let value = exporter::format_header_list(&cfg.header_pairs());

			confscope_domain::env::set_var(TRACES_HEADERS_ENV, &value)
				.map(|prior| (TRACES_HEADERS_ENV, prior))
		} else {
			None
		};

		if env_header.is_some() {
			tracing::info!(key = TRACES_HEADERS_ENV, "Set exporter headers in the environment.");
		} else {
			tracing::info!("Passing exporter headers directly.");
		}

		let headers = (!cfg.use_env_headers).then(|| cfg.header_pairs());
		let processor =
			match self.factory.build(&cfg.endpoint, headers.as_deref(), cfg.timeout, &cfg.batch) {
				Ok(processor) => processor,
				Err(err) => {
					restore_env_header(env_header);

					return Err(err);
				},
			};
		let provider = TracerProvider::new(cfg.resource_attributes(), processor);

		for (installed, instrumentor) in self.instrumentors.iter().enumerate() {
			if let Err(err) = instrumentor.instrument(&provider) {
				for previous in &self.instrumentors[..installed] {
					previous.uninstrument();
				}

				if let Err(shutdown_err) = provider.shutdown_blocking() {
					tracing::warn!(error = %shutdown_err, "Failed to stop partial pipeline.");
				}

				restore_env_header(env_header);

				return Err(err);
			}

			tracing::debug!(instrumentor = instrumentor.name(), "Installed instrumentation.");
		}

		tracing::info!(
			endpoint = %cfg.endpoint,
			model_id = %cfg.model_id,
			env_headers = cfg.use_env_headers,
			"Telemetry configured."
		);

		self.active = Some(ActivePipeline { config: cfg, provider: provider.clone(), env_header });

		Ok(provider)
	}

	fn take_active(&mut self) -> Option<ActivePipeline> {
		let active = self.active.take()?;

		for instrumentor in &self.instrumentors {
			instrumentor.uninstrument();
		}

		Some(active)
	}

	/// Blocking shutdown for paths that cannot await.
	fn shutdown_now(&mut self) {
		if let Some(active) = self.take_active() {
			let result = active.provider.shutdown_blocking();

			finish_shutdown(active, result);
		}
	}

	fn restore_previous(&mut self, previous: Option<TelemetryConfig>) {
		let Some(previous) = previous else {
			return;
		};

		match self.install(previous) {
			Ok(_) => tracing::info!("Restored previous telemetry configuration."),
			Err(err) => tracing::warn!(
				error = %err,
				"Previous telemetry configuration could not be restored. Reconfiguration needed."
			),
		}
	}
}

/// Undoes a temporary configuration on every exit from [`TelemetryManager::temporary_config`].
struct TemporaryScope<'a> {
	manager: &'a mut TelemetryManager,
	previous: Option<TelemetryConfig>,
	finished: bool,
}
impl TemporaryScope<'_> {
	async fn finish(mut self) {
		self.manager.shutdown().await;

		let previous = self.previous.take();

		self.manager.restore_previous(previous);

		self.finished = true;
	}
}
impl Drop for TemporaryScope<'_> {
	fn drop(&mut self) {
		if self.finished {
			return;
		}

		tracing::warn!("Temporary telemetry scope ended early. Restoring previous configuration.");

		self.manager.shutdown_now();

		let previous = self.previous.take();

		self.manager.restore_previous(previous);
	}
}

fn finish_shutdown(active: ActivePipeline, result: Result<()>) {
	if let Err(err) = result {
		tracing::error!(error = %err, "Error during telemetry shutdown.");
	}

	if let Some((key, _)) = active.env_header.as_ref() {
		tracing::info!(key = %key, "Cleaned up exporter header variable.");
	}

	restore_env_header(active.env_header);

	tracing::info!(model_id = %active.config.model_id, "Telemetry shutdown complete.");
}

fn restore_env_header(env_header: Option<(&'static str, Option<OsString>)>) {
	if let Some((key, prior)) = env_header {
		confscope_domain::env::restore_var(key, prior.as_deref());
	}
}
