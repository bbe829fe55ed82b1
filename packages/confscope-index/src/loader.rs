use std::{
	fs,
	path::{Path, PathBuf},
	sync::Arc,
};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
	DocumentReader, Error, IndexBackend, Result, SearchIndex,
	retry::{self, RetryPolicy},
	staleness::{self, IndexDecision},
};

/// Loads a persisted index, or rebuilds it from source documents when it is missing, empty, or
/// older than its sources.
pub struct IndexLoader {
	storage_dir: PathBuf,
	sources: Vec<PathBuf>,
	reader: Arc<dyn DocumentReader>,
	backend: Arc<dyn IndexBackend>,
	retry: RetryPolicy,
	cancel: CancellationToken,
}
impl IndexLoader {
	pub fn new(
		storage_dir: impl Into<PathBuf>,
		sources: Vec<PathBuf>,
		reader: Arc<dyn DocumentReader>,
		backend: Arc<dyn IndexBackend>,
	) -> Self {
		Self {
			storage_dir: storage_dir.into(),
			sources,
			reader,
			backend,
			retry: RetryPolicy::default(),
			cancel: CancellationToken::new(),
		}
	}

	pub fn from_config(
		index: &confscope_config::Index,
		retry: &confscope_config::Retry,
		reader: Arc<dyn DocumentReader>,
		backend: Arc<dyn IndexBackend>,
	) -> Self {
		Self::new(index.storage_dir.clone(), index.source_documents.clone(), reader, backend)
			.with_retry(RetryPolicy::from_config(retry))
	}

	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;

		self
	}

	pub fn storage_dir(&self) -> &Path {
		&self.storage_dir
	}

	pub fn decide(&self, force_rebuild: bool) -> IndexDecision {
		staleness::decide(&self.storage_dir, &self.sources, force_rebuild)
	}

	pub async fn load_or_build(&self, force_rebuild: bool) -> Result<Arc<dyn SearchIndex>> {
		if let IndexDecision::Rebuild(reason) = self.decide(force_rebuild) {
			tracing::info!(?reason, "Rebuilding index.");

			return self.rebuild().await;
		}

		tracing::info!(storage_dir = %self.storage_dir.display(), "Loading existing index.");

		let loaded = retry::retry(&self.retry, &self.cancel, "index_load", |_| {
			self.backend.load(&self.storage_dir)
		})
		.await;

		match loaded {
			Ok(index) => {
				tracing::info!(documents = index.document_count(), "Loaded existing index.");

				Ok(index)
			},
			Err(Error::Cancelled) => Err(Error::Cancelled),
			Err(err) => {
				tracing::warn!(error = %err, "Failed to load existing index; creating a new one.");

				self.rebuild().await
			},
		}
	}

	/// Builds a fresh index from the sources and swaps it into the storage directory.
	pub async fn rebuild(&self) -> Result<Arc<dyn SearchIndex>> {
		retry::retry(&self.retry, &self.cancel, "index_rebuild", |_| self.rebuild_once()).await
	}

	async fn rebuild_once(&self) -> Result<Arc<dyn SearchIndex>> {
		let sources = self.existing_sources()?;

		tracing::info!(count = sources.len(), "Reading source documents.");

		let documents = self.reader.read_documents(&sources).await?;

		if documents.is_empty() {
			return Err(Error::SourceNotFound {
				message: "Source documents produced no content to index.".to_string(),
			});
		}

		tracing::info!(documents = documents.len(), "Creating index.");

		let index = self.backend.build(documents).await?;

		self.persist_atomically(index.as_ref())?;

		tracing::info!(storage_dir = %self.storage_dir.display(), "Index created and persisted.");

		Ok(index)
	}

	fn existing_sources(&self) -> Result<Vec<PathBuf>> {
		let mut found = Vec::with_capacity(self.sources.len());

		for source in &self.sources {
			if source.is_file() {
				found.push(source.clone());
			} else {
				tracing::warn!(source = %source.display(), "Source document not found.");
			}
		}

		if found.is_empty() {
			return Err(Error::SourceNotFound {
				message: format!(
					"None of the {} configured source documents exist.",
					self.sources.len()
				),
			});
		}

		Ok(found)
	}

	// Writes into a sibling staging directory and renames it into place, so the storage
	// directory only ever holds the previous index or the complete new one.
	fn persist_atomically(&self, index: &dyn SearchIndex) -> Result<()> {
		let parent = self
			.storage_dir
			.parent()
			.filter(|parent| !parent.as_os_str().is_empty())
			.unwrap_or(Path::new("."));
		let name = self
			.storage_dir
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.unwrap_or_else(|| "index".to_string());
		let run = Uuid::new_v4().simple();
		let staging = parent.join(format!(".{name}.staging-{run}"));
		let backup = parent.join(format!(".{name}.previous-{run}"));

		fs::create_dir_all(&staging).map_err(|err| Error::io(&staging, err))?;

		if let Err(err) = index.persist(&staging) {
			remove_dir_quietly(&staging);

			return Err(err);
		}

		let had_previous = self.storage_dir.exists();

		if had_previous {
			fs::rename(&self.storage_dir, &backup).map_err(|err| {
				remove_dir_quietly(&staging);

				Error::io(&self.storage_dir, err)
			})?;
		}
		if let Err(err) = fs::rename(&staging, &self.storage_dir) {
			if had_previous && let Err(restore_err) = fs::rename(&backup, &self.storage_dir) {
				tracing::error!(error = %restore_err, "Failed to restore previous index.");
			}

			remove_dir_quietly(&staging);

			return Err(Error::io(&self.storage_dir, err));
		}
		if had_previous {
			remove_dir_quietly(&backup);
		}

		Ok(())
	}
}

fn remove_dir_quietly(path: &Path) {
	if let Err(err) = fs::remove_dir_all(path) {
		tracing::warn!(path = %path.display(), error = %err, "Failed to remove directory.");
	}
}
