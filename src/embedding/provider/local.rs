// Copyright 2025 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Local in-process embedding model (§4.6). Texts are prefixed with a
//! task-dependent instruction string before embedding; FastEmbed performs the
//! model's own pooling internally, so last-token pooling is the model's
//! concern, not this wrapper's (see DESIGN.md for the fidelity note). Batches
//! run with an adaptive timeout: the first batch gets longer to amortize
//! warm-up, subsequent batches get a shorter one; on timeout the batch is
//! filled with zero vectors and processing continues.

use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{EMBEDDER_FIRST_BATCH_TIMEOUT_SECS, EMBEDDER_SUBSEQUENT_BATCH_TIMEOUT_SECS};
use crate::embedding::types::{detect_query_task, prefix_for, EmbedKind, QueryTask};

use super::Embedder;

fn map_model_name(name: &str) -> EmbeddingModel {
	match name {
		"jinaai/jina-embeddings-v2-base-code" => EmbeddingModel::JinaEmbeddingsV2BaseCode,
		"BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
		"BAAI/bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
		"sentence-transformers/all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
		_ => EmbeddingModel::JinaEmbeddingsV2BaseCode,
	}
}

pub struct LocalEmbedder {
	model: Arc<TextEmbedding>,
	dimension: Option<usize>,
	first_batch_done: AtomicBool,
}

impl LocalEmbedder {
	pub fn new(model_name: &str) -> Result<Self> {
		let cache_dir = crate::storage::get_fastembed_cache_dir().context("resolving FastEmbed cache directory")?;
		let model = TextEmbedding::try_new(
			InitOptions::new(map_model_name(model_name))
				.with_show_download_progress(true)
				.with_cache_dir(cache_dir),
		)
		.context("initializing local embedding model")?;

		Ok(Self {
			model: Arc::new(model),
			dimension: None,
			first_batch_done: AtomicBool::new(false),
		})
	}

	fn prefix_texts(&self, texts: &[String], kind: EmbedKind) -> Vec<String> {
		let task = if kind == EmbedKind::Query {
			texts.first().map(|t| detect_query_task(t)).or(Some(QueryTask::Nl2Code))
		} else {
			None
		};
		let prefix = prefix_for(kind, task);
		texts.iter().map(|t| format!("{}{}", prefix, t)).collect()
	}
}

#[async_trait::async_trait]
impl Embedder for LocalEmbedder {
	async fn embed(&self, texts: &[String], kind: EmbedKind) -> Vec<Vec<f32>> {
		if texts.is_empty() {
			return vec![];
		}

		let prefixed = self.prefix_texts(texts, kind);
		let model = Arc::clone(&self.model);
		let dim_hint = self.dimension.unwrap_or(768);
		let len = texts.len();

		let first = !self.first_batch_done.swap(true, Ordering::SeqCst);
		let timeout = Duration::from_secs(if first {
			EMBEDDER_FIRST_BATCH_TIMEOUT_SECS
		} else {
			EMBEDDER_SUBSEQUENT_BATCH_TIMEOUT_SECS
		});

		let task = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
			model.embed(prefixed, None).context("local model embed() failed")
		});

		match tokio::time::timeout(timeout, task).await {
			Ok(Ok(Ok(vectors))) => vectors,
			Ok(Ok(Err(e))) => {
				tracing::error!("local embedding batch failed: {}", e);
				vec![vec![0.0; dim_hint]; len]
			}
			Ok(Err(e)) => {
				tracing::error!("local embedding task panicked: {}", e);
				vec![vec![0.0; dim_hint]; len]
			}
			Err(_) => {
				tracing::error!("local embedding batch timed out after {:?}", timeout);
				vec![vec![0.0; dim_hint]; len]
			}
		}
	}

	fn dimension(&self) -> Option<usize> {
		self.dimension
	}
}
