use std::{
	fs,
	path::{Path, PathBuf},
	time::SystemTime,
};

use crate::{Error, Result};

pub const VECTOR_STORE_FILE: &str = "default__vector_store.json";
pub const INDEX_STORE_FILE: &str = "index_store.json";
pub const DOC_STORE_FILE: &str = "docstore.json";

/// Files a persisted index must contain, each non-empty, to be considered loadable.
pub const REQUIRED_FILES: [&str; 3] = [VECTOR_STORE_FILE, INDEX_STORE_FILE, DOC_STORE_FILE];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
	Forced,
	MissingFile { file: &'static str },
	EmptyFile { file: &'static str },
	StaleSource { source: PathBuf },
	UnreadableMetadata { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexDecision {
	Load,
	Rebuild(RebuildReason),
}
impl IndexDecision {
	pub fn is_rebuild(&self) -> bool {
		matches!(self, Self::Rebuild(_))
	}
}

/// Modification times compared to detect a stale index. Captured fresh for every decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStalenessSnapshot {
	pub oldest_index_file: SystemTime,
	pub newest_source: Option<(PathBuf, SystemTime)>,
}
impl IndexStalenessSnapshot {
	pub fn capture(storage_dir: &Path, sources: &[PathBuf]) -> Result<Self> {
		let mut oldest_index_file: Option<SystemTime> = None;

		for file in REQUIRED_FILES {
			let path = storage_dir.join(file);
			let modified = modified_at(&path)?;

			oldest_index_file = Some(match oldest_index_file {
				Some(current) => current.min(modified),
				None => modified,
			});
		}

		let Some(oldest_index_file) = oldest_index_file else {
			return Err(Error::Corrupt {
				path: storage_dir.to_path_buf(),
				message: "No index files to compare.".to_string(),
			});
		};
		let mut newest_source: Option<(PathBuf, SystemTime)> = None;

		for source in sources {
			if !source.exists() {
				continue;
			}

			let modified = modified_at(source)?;

			if newest_source.as_ref().is_none_or(|(_, newest)| modified > *newest) {
				newest_source = Some((source.clone(), modified));
			}
		}

		Ok(Self { oldest_index_file, newest_source })
	}

	pub fn stale_source(&self) -> Option<&Path> {
		self.newest_source
			.as_ref()
			.filter(|(_, modified)| *modified > self.oldest_index_file)
			.map(|(path, _)| path.as_path())
	}
}

/// Decides between loading and rebuilding. Touches only file metadata and never retries.
pub fn decide(storage_dir: &Path, sources: &[PathBuf], force_rebuild: bool) -> IndexDecision {
	if force_rebuild {
		tracing::info!("Force rebuild requested.");

		return IndexDecision::Rebuild(RebuildReason::Forced);
	}

	for file in REQUIRED_FILES {
		match fs::metadata(storage_dir.join(file)) {
			Err(_) => {
				tracing::info!(file, "Required index file missing.");

				return IndexDecision::Rebuild(RebuildReason::MissingFile { file });
			},
			Ok(meta) if meta.len() == 0 => {
				tracing::info!(file, "Required index file is empty.");

				return IndexDecision::Rebuild(RebuildReason::EmptyFile { file });
			},
			Ok(_) => {},
		}
	}

	match IndexStalenessSnapshot::capture(storage_dir, sources) {
		Ok(snapshot) => match snapshot.stale_source() {
			Some(source) => {
				tracing::info!(source = %source.display(), "Source document is newer than index.");

				IndexDecision::Rebuild(RebuildReason::StaleSource { source: source.to_path_buf() })
			},
			None => {
				tracing::info!("Index is up to date.");

				IndexDecision::Load
			},
		},
		Err(err) => {
			tracing::warn!(error = %err, "Failed to check modification times; rebuilding.");

			IndexDecision::Rebuild(RebuildReason::UnreadableMetadata { message: err.to_string() })
		},
	}
}

fn modified_at(path: &Path) -> Result<SystemTime> {
	fs::metadata(path).and_then(|meta| meta.modified()).map_err(|err| Error::io(path, err))
}
