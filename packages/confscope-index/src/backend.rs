use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{BoxFuture, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
	pub id: String,
	pub source: PathBuf,
	pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
	pub id: String,
	pub source: PathBuf,
	pub score: f32,
	pub text: String,
}

pub trait DocumentReader
where
	Self: Send + Sync,
{
	/// Reads every path in `paths`. A missing file is an error.
	fn read_documents<'a>(&'a self, paths: &'a [PathBuf]) -> BoxFuture<'a, Result<Vec<Document>>>;
}

pub trait IndexBackend
where
	Self: Send + Sync,
{
	fn build<'a>(&'a self, documents: Vec<Document>) -> BoxFuture<'a, Result<Arc<dyn SearchIndex>>>;

	fn load<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Result<Arc<dyn SearchIndex>>>;
}

pub trait SearchIndex
where
	Self: Send + Sync,
{
	/// Writes the required index files into `dir`, which already exists.
	fn persist(&self, dir: &Path) -> Result<()>;

	fn as_retriever(&self, top_k: usize) -> Box<dyn Retriever>;

	fn document_count(&self) -> usize;
}

pub trait Retriever
where
	Self: Send + Sync,
{
	fn retrieve(&self, query: &str) -> Vec<ScoredDocument>;
}
