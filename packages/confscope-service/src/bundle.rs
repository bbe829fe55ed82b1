use std::sync::Arc;

use opentelemetry::{
	KeyValue,
	trace::{Span as _, Tracer as _},
};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use confscope_config::Config;
use confscope_domain::CacheFingerprint;
use confscope_index::{
	DocumentReader, IndexBackend, IndexLoader, Retriever, ScoredDocument, SearchIndex,
};
use confscope_telemetry::TelemetryManager;

use crate::{BuildContext, Result};

/// Builds [`QueryBundle`]s from the index settings of one configuration.
pub struct BundleFactory {
	index: confscope_config::Index,
	retry: confscope_config::Retry,
	tracer_name: String,
	reader: Arc<dyn DocumentReader>,
	backend: Arc<dyn IndexBackend>,
	cancel: CancellationToken,
}
impl BundleFactory {
	pub fn from_config(
		cfg: &Config,
		reader: Arc<dyn DocumentReader>,
		backend: Arc<dyn IndexBackend>,
	) -> Self {
		Self {
			index: cfg.index.clone(),
			retry: cfg.retry.clone(),
			tracer_name: cfg.telemetry.tracer_name.clone(),
			reader,
			backend,
			cancel: CancellationToken::new(),
		}
	}

	pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;

		self
	}

	pub async fn build(&self, ctx: BuildContext) -> Result<QueryBundle> {
		let tracer = ctx.provider.as_ref().map(|provider| provider.get_tracer(&self.tracer_name));
		let mut span = tracer.as_ref().map(|tracer| tracer.start("build_components"));

		if let Some(span) = span.as_mut() {
			span.set_attribute(KeyValue::new("fingerprint", ctx.fingerprint.to_string()));
		}

		let loader = IndexLoader::from_config(
			&self.index,
			&self.retry,
			self.reader.clone(),
			self.backend.clone(),
		)
		.with_cancellation(self.cancel.clone());
		let index = loader.load_or_build(self.index.force_rebuild).await?;

		if let Some(span) = span.as_mut() {
			let documents = count_value(index.document_count());

			span.set_attribute(KeyValue::new("index.documents", documents));
			span.end();
		}

		let retriever = index.as_retriever(self.index.top_k);

		Ok(QueryBundle {
			fingerprint: ctx.fingerprint,
			index,
			retriever,
			telemetry: ctx.telemetry,
			tracer_name: self.tracer_name.clone(),
		})
	}
}

/// The components needed to answer queries under one override set.
pub struct QueryBundle {
	fingerprint: CacheFingerprint,
	index: Arc<dyn SearchIndex>,
	retriever: Box<dyn Retriever>,
	/// Tracers come from whichever pipeline is active when a query runs.
	telemetry: Option<Arc<Mutex<TelemetryManager>>>,
	tracer_name: String,
}
impl QueryBundle {
	pub fn fingerprint(&self) -> &CacheFingerprint {
		&self.fingerprint
	}

	pub fn document_count(&self) -> usize {
		self.index.document_count()
	}

	pub fn is_traced(&self) -> bool {
		self.telemetry.is_some()
	}

	pub async fn query(&self, text: &str) -> QueryResponse {
		let tracer = match self.telemetry.as_ref() {
			Some(telemetry) => telemetry.lock().await.get_tracer(&self.tracer_name),
			None => None,
		};
		let mut span = tracer.as_ref().map(|tracer| tracer.start("query"));
		let results = self.retriever.retrieve(text);
		let trace_id = span
			.as_ref()
			.filter(|span| span.is_recording())
			.map(|span| span.span_context().trace_id().to_string());

		if let Some(span) = span.as_mut() {
			span.set_attribute(KeyValue::new("query.text", text.to_string()));
			span.set_attribute(KeyValue::new("query.results", count_value(results.len())));
			span.end();
		}

		tracing::debug!(
			fingerprint = %self.fingerprint,
			results = results.len(),
			"Query answered."
		);

		QueryResponse {
			fingerprint: self.fingerprint.to_string(),
			query: text.to_string(),
			results,
			trace_id,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
	pub fingerprint: String,
	pub query: String,
	pub results: Vec<ScoredDocument>,
	pub trace_id: Option<String>,
}

fn count_value(count: usize) -> i64 {
	i64::try_from(count).unwrap_or(i64::MAX)
}
