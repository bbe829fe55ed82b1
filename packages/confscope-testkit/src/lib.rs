mod error;

pub use error::{Error, Result};

use std::{
	env, fs,
	future::{self, Future},
	path::{Path, PathBuf},
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::{Duration, SystemTime},
};

use uuid::Uuid;

use confscope_index::{BoxFuture as IndexFuture, Document, IndexBackend, SearchIndex};
use confscope_telemetry::{
	BatchSettings, BatchSpanProcessor, Error as TelemetryError, ExporterFactory, OTelSdkResult,
	SpanData, SpanExporter,
};

/// A scratch directory under the system temp dir, removed on drop.
pub struct TempDir {
	path: PathBuf,
	cleaned: bool,
}
impl TempDir {
	pub fn new(prefix: &str) -> Result<Self> {
		let path = env::temp_dir().join(format!("{prefix}_{}", Uuid::new_v4().simple()));

		fs::create_dir_all(&path).map_err(|err| Error::io(&path, err))?;

		Ok(Self { path, cleaned: false })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
		self.path.join(name)
	}

	pub fn cleanup(mut self) -> Result<()> {
		self.cleanup_inner()
	}

	fn cleanup_inner(&mut self) -> Result<()> {
		if self.cleaned {
			return Ok(());
		}

		fs::remove_dir_all(&self.path).map_err(|err| Error::io(&self.path, err))?;

		self.cleaned = true;

		Ok(())
	}
}
impl Drop for TempDir {
	fn drop(&mut self) {
		if let Err(err) = self.cleanup_inner() {
			eprintln!("Temp directory cleanup failed: {err}.");
		}
	}
}

pub fn write_file(path: &Path, contents: &str) -> Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
	}

	fs::write(path, contents).map_err(|err| Error::io(path, err))
}

pub fn set_modified(path: &Path, modified: SystemTime) -> Result<()> {
	let file = fs::File::options().write(true).open(path).map_err(|err| Error::io(path, err))?;

	file.set_modified(modified).map_err(|err| Error::io(path, err))
}

/// Moves `path`'s modification time `offset` into the future relative to now.
pub fn touch_ahead(path: &Path, offset: Duration) -> Result<()> {
	set_modified(path, SystemTime::now() + offset)
}

#[derive(Debug, Default)]
struct Recording {
	events: Vec<String>,
	spans: Vec<SpanData>,
}

/// Exporter factory that records every build, export, and shutdown instead of sending anything.
///
/// Events are logged as `build:N` and `shutdown:N`, where `N` numbers exporters from 1 in build
/// order.
#[derive(Clone, Default)]
pub struct RecordingExporterFactory {
	recording: Arc<Mutex<Recording>>,
	builds: Arc<AtomicUsize>,
	fail_builds: Arc<AtomicBool>,
	last_headers: Arc<Mutex<Option<Vec<(String, String)>>>>,
}
impl RecordingExporterFactory {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_fail_builds(&self, fail: bool) {
		self.fail_builds.store(fail, Ordering::SeqCst);
	}

	pub fn events(&self) -> Vec<String> {
		self.lock().events.clone()
	}

	pub fn build_count(&self) -> usize {
		self.builds.load(Ordering::SeqCst)
	}

	pub fn shutdown_count(&self) -> usize {
		self.lock().events.iter().filter(|event| event.starts_with("shutdown:")).count()
	}

	pub fn exported_spans(&self) -> Vec<SpanData> {
		self.lock().spans.clone()
	}

	pub fn exported_span_names(&self) -> Vec<String> {
		self.lock().spans.iter().map(|span| span.name.to_string()).collect()
	}

	/// Headers passed to the most recent build; `None` when they were left to the environment.
	pub fn last_headers(&self) -> Option<Vec<(String, String)>> {
		self.last_headers.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
		self.recording.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl ExporterFactory for RecordingExporterFactory {
	fn build(
		&self,
		_endpoint: &str,
		headers: Option<&[(String, String)]>,
		_timeout: Duration,
		batch: &BatchSettings,
	) -> confscope_telemetry::Result<BatchSpanProcessor> {
		if self.fail_builds.load(Ordering::SeqCst) {
			return Err(TelemetryError::Exporter {
				message: "Recording build failure.".to_string(),
			});
		}

		let id = self.builds.fetch_add(1, Ordering::SeqCst) + 1;

		*self.last_headers.lock().unwrap_or_else(|err| err.into_inner()) =
			headers.map(<[_]>::to_vec);

		self.lock().events.push(format!("build:{id}"));

		let exporter = RecordingExporter { id, recording: self.recording.clone() };

		Ok(confscope_telemetry::exporter::batch_processor(exporter, batch))
	}
}

#[derive(Debug)]
struct RecordingExporter {
	id: usize,
	recording: Arc<Mutex<Recording>>,
}
impl RecordingExporter {
	fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
		self.recording.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl SpanExporter for RecordingExporter {
	fn export(&self, batch: Vec<SpanData>) -> impl Future<Output = OTelSdkResult> + Send {
		self.lock().spans.extend(batch);

		future::ready(Ok(()))
	}

	fn shutdown_with_timeout(&mut self, _timeout: Duration) -> OTelSdkResult {
		let event = format!("shutdown:{}", self.id);

		self.lock().events.push(event);

		Ok(())
	}
}

/// Wraps a backend and counts how often it builds or loads.
pub struct CountingBackend {
	inner: Arc<dyn IndexBackend>,
	builds: AtomicUsize,
	loads: AtomicUsize,
}
impl CountingBackend {
	pub fn new(inner: Arc<dyn IndexBackend>) -> Self {
		Self { inner, builds: AtomicUsize::new(0), loads: AtomicUsize::new(0) }
	}

	pub fn builds(&self) -> usize {
		self.builds.load(Ordering::SeqCst)
	}

	pub fn loads(&self) -> usize {
		self.loads.load(Ordering::SeqCst)
	}
}
impl IndexBackend for CountingBackend {
	fn build<'a>(
		&'a self,
		documents: Vec<Document>,
	) -> IndexFuture<'a, confscope_index::Result<Arc<dyn SearchIndex>>> {
		self.builds.fetch_add(1, Ordering::SeqCst);

		self.inner.build(documents)
	}

	fn load<'a>(
		&'a self,
		dir: &'a Path,
	) -> IndexFuture<'a, confscope_index::Result<Arc<dyn SearchIndex>>> {
		self.loads.fetch_add(1, Ordering::SeqCst);

		self.inner.load(dir)
	}
}
