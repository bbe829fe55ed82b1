//! File-backed reference backend: plain-text sources, term-frequency vectors, and a
//! term-overlap retriever. Enough to exercise the loader end to end.

use std::{
	collections::{BTreeMap, HashMap},
	fs,
	path::{Path, PathBuf},
	sync::Arc,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
	BoxFuture, Document, DocumentReader, Error, IndexBackend, Result, Retriever, ScoredDocument,
	SearchIndex,
	staleness::{DOC_STORE_FILE, INDEX_STORE_FILE, VECTOR_STORE_FILE},
};

const INDEX_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextReader;
impl DocumentReader for PlainTextReader {
	fn read_documents<'a>(&'a self, paths: &'a [PathBuf]) -> BoxFuture<'a, Result<Vec<Document>>> {
		Box::pin(async move {
			let mut documents = Vec::with_capacity(paths.len());

			for path in paths {
				let text =
					tokio::fs::read_to_string(path).await.map_err(|err| Error::io(path, err))?;

				documents.push(Document {
					id: path.display().to_string(),
					source: path.clone(),
					text,
				});
			}

			Ok(documents)
		})
	}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordBackend;
impl IndexBackend for KeywordBackend {
	fn build<'a>(
		&'a self,
		documents: Vec<Document>,
	) -> BoxFuture<'a, Result<Arc<dyn SearchIndex>>> {
		Box::pin(async move {
			let index: Arc<dyn SearchIndex> = Arc::new(KeywordIndex::from_documents(documents));

			Ok(index)
		})
	}

	fn load<'a>(&'a self, dir: &'a Path) -> BoxFuture<'a, Result<Arc<dyn SearchIndex>>> {
		Box::pin(async move {
			let index: Arc<dyn SearchIndex> = Arc::new(KeywordIndex::load(dir)?);

			Ok(index)
		})
	}
}

#[derive(Debug, Serialize, Deserialize)]
struct DocStore {
	documents: Vec<Document>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexStore {
	schema_version: u32,
	index_id: Uuid,
	document_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorStore {
	term_frequencies: BTreeMap<String, BTreeMap<String, u32>>,
}

#[derive(Debug)]
struct KeywordData {
	index_id: Uuid,
	documents: Vec<Document>,
	term_frequencies: Vec<HashMap<String, u32>>,
}

#[derive(Debug, Clone)]
pub struct KeywordIndex {
	data: Arc<KeywordData>,
}
impl KeywordIndex {
	pub fn from_documents(documents: Vec<Document>) -> Self {
		let term_frequencies = documents.iter().map(|doc| term_frequencies(&doc.text)).collect();

		let data = KeywordData { index_id: Uuid::new_v4(), documents, term_frequencies };

		Self { data: Arc::new(data) }
	}

	pub fn load(dir: &Path) -> Result<Self> {
		let index_store: IndexStore = read_json(&dir.join(INDEX_STORE_FILE))?;

		if index_store.schema_version != INDEX_SCHEMA_VERSION {
			return Err(Error::Corrupt {
				path: dir.join(INDEX_STORE_FILE),
				message: format!("Unsupported schema version {}.", index_store.schema_version),
			});
		}

		let doc_store: DocStore = read_json(&dir.join(DOC_STORE_FILE))?;
		let vector_store: VectorStore = read_json(&dir.join(VECTOR_STORE_FILE))?;

		if doc_store.documents.len() != index_store.document_count {
			return Err(Error::Corrupt {
				path: dir.join(DOC_STORE_FILE),
				message: "Document count does not match index metadata.".to_string(),
			});
		}

		let mut term_frequencies = Vec::with_capacity(doc_store.documents.len());

		for doc in &doc_store.documents {
			let Some(terms) = vector_store.term_frequencies.get(&doc.id) else {
				return Err(Error::Corrupt {
					path: dir.join(VECTOR_STORE_FILE),
					message: format!("Missing term vector for document {}.", doc.id),
				});
			};

			term_frequencies.push(
				terms.iter().map(|(term, count)| (term.clone(), *count)).collect::<HashMap<_, _>>(),
			);
		}

		Ok(Self {
			data: Arc::new(KeywordData {
				index_id: index_store.index_id,
				documents: doc_store.documents,
				term_frequencies,
			}),
		})
	}

	pub fn index_id(&self) -> Uuid {
		self.data.index_id
	}

	pub fn documents(&self) -> &[Document] {
		&self.data.documents
	}
}
impl SearchIndex for KeywordIndex {
	fn persist(&self, dir: &Path) -> Result<()> {
		let data = &self.data;
		let vector_store = VectorStore {
			term_frequencies: data
				.documents
				.iter()
				.zip(&data.term_frequencies)
				.map(|(doc, terms)| {
					let terms = terms
						.iter()
						.map(|(term, count)| (term.clone(), *count))
						.collect::<BTreeMap<_, _>>();

					(doc.id.clone(), terms)
				})
				.collect(),
		};
		let index_store = IndexStore {
			schema_version: INDEX_SCHEMA_VERSION,
			index_id: data.index_id,
			document_count: data.documents.len(),
		};
		let doc_store = DocStore { documents: data.documents.clone() };

		write_json(&dir.join(VECTOR_STORE_FILE), &vector_store)?;
		write_json(&dir.join(DOC_STORE_FILE), &doc_store)?;
		write_json(&dir.join(INDEX_STORE_FILE), &index_store)?;

		Ok(())
	}

	fn as_retriever(&self, top_k: usize) -> Box<dyn Retriever> {
		Box::new(KeywordRetriever { data: self.data.clone(), top_k })
	}

	fn document_count(&self) -> usize {
		self.data.documents.len()
	}
}

struct KeywordRetriever {
	data: Arc<KeywordData>,
	top_k: usize,
}
impl Retriever for KeywordRetriever {
	fn retrieve(&self, query: &str) -> Vec<ScoredDocument> {
		let query_terms = tokenize(query).collect::<Vec<_>>();

		if query_terms.is_empty() {
			return Vec::new();
		}

		let mut scored = self
			.data
			.documents
			.iter()
			.zip(&self.data.term_frequencies)
			.filter_map(|(doc, terms)| {
				let hits: u32 = query_terms.iter().filter_map(|term| terms.get(term)).sum();

				(hits > 0).then(|| ScoredDocument {
					id: doc.id.clone(),
					source: doc.source.clone(),
					score: hits as f32 / query_terms.len() as f32,
					text: doc.text.clone(),
				})
			})
			.collect::<Vec<_>>();

		scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
		scored.truncate(self.top_k);

		scored
	}
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
	text.split(|ch: char| !ch.is_alphanumeric())
		.filter(|token| !token.is_empty())
		.map(|token| token.to_lowercase())
}

fn term_frequencies(text: &str) -> HashMap<String, u32> {
	let mut counts = HashMap::new();

	for token in tokenize(text) {
		*counts.entry(token).or_insert(0) += 1;
	}

	counts
}

fn read_json<T>(path: &Path) -> Result<T>
where
	T: DeserializeOwned,
{
	let raw = fs::read(path).map_err(|err| Error::io(path, err))?;

	serde_json::from_slice(&raw)
		.map_err(|err| Error::Corrupt { path: path.to_path_buf(), message: err.to_string() })
}

fn write_json<T>(path: &Path, value: &T) -> Result<()>
where
	T: Serialize,
{
	let raw = serde_json::to_vec_pretty(value)?;

	fs::write(path, raw).map_err(|err| Error::io(path, err))
}
