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

//! Query Engine (§4.11): embeds a query, asks the Vector Store for nearest
//! neighbors, converts cosine distance to a similarity score, and optionally
//! attaches surrounding source lines as context.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::embedding::{EmbedKind, Embedder};
use crate::store::VectorStore;

/// One ranked hit, with optional surrounding context lines.
#[derive(Debug, Clone)]
pub struct SearchResult {
	pub file_path: String,
	pub line_start: usize,
	pub line_end: usize,
	pub content: String,
	pub score: f32,
	pub language: String,
	pub context_before: Option<Vec<String>>,
	pub context_after: Option<Vec<String>>,
}

pub struct QueryEngine {
	store: Arc<VectorStore>,
	embedder: Arc<dyn Embedder>,
	search_config: SearchConfig,
}

impl QueryEngine {
	pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn Embedder>, search_config: SearchConfig) -> Self {
		Self { store, embedder, search_config }
	}

	/// Search one branch of one root. `top_k` and `include_context` default to
	/// the configured top-k and `true` respectively.
	pub async fn search(&self, query: &str, root: &Path, branch: &str, top_k: Option<usize>, include_context: bool) -> Vec<SearchResult> {
		if query.trim().is_empty() {
			return vec![];
		}
		let top_k = top_k.unwrap_or(self.search_config.top_k);

		let vectors = self.embedder.embed(&[query.to_string()], EmbedKind::Query).await;
		let vector = match vectors.into_iter().next() {
			Some(v) if !v.is_empty() => v,
			_ => return vec![],
		};

		let hits = match self.store.search(root, branch, &vector, top_k).await {
			Ok(hits) => hits,
			Err(e) => {
				tracing::error!("search failed for {} on branch {}: {}", root.display(), branch, e);
				return vec![];
			}
		};

		let mut results = Vec::with_capacity(hits.len());
		for hit in hits {
			// Cosine distance is in [0, 2]; fold it onto a [0, 1] similarity score.
			let similarity = (1.0 - hit.distance / 2.0).clamp(0.0, 1.0);
			if similarity < self.search_config.min_similarity {
				continue;
			}

			let (context_before, context_after) = if include_context {
				self.load_context(root, &hit.file_path, hit.line_start, hit.line_end)
			} else {
				(None, None)
			};

			results.push(SearchResult {
				file_path: hit.file_path,
				line_start: hit.line_start,
				line_end: hit.line_end,
				content: hit.content,
				score: similarity,
				language: hit.language,
				context_before,
				context_after,
			});
		}
		results
	}

	/// Search every branch the store has seen chunks for, per root. A root
	/// that has never been indexed simply reports no branches.
	pub async fn search_all_branches(&self, query: &str, root: &Path, top_k: Option<usize>) -> HashMap<String, Vec<SearchResult>> {
		let branches = self.store.list_branches(root).await.unwrap_or_default();
		let mut out = HashMap::with_capacity(branches.len());
		for branch in branches {
			let results = self.search(query, root, &branch, top_k, true).await;
			out.insert(branch, results);
		}
		out
	}

	/// Read `context_lines_{before,after}` lines around `[line_start, line_end]`
	/// (1-based, inclusive). Returns `(None, None)` if the source file is
	/// missing or unreadable — a stale hit should still surface, just without
	/// context.
	fn load_context(&self, root: &Path, file_path: &str, line_start: usize, line_end: usize) -> (Option<Vec<String>>, Option<Vec<String>>) {
		let content = match std::fs::read_to_string(root.join(file_path)) {
			Ok(c) => c,
			Err(_) => return (None, None),
		};
		let lines: Vec<&str> = content.lines().collect();

		let before_end = line_start.saturating_sub(1).min(lines.len());
		let before_start = before_end.saturating_sub(self.search_config.context_lines_before);
		let before = lines.get(before_start..before_end).map(|s| s.iter().map(|l| l.to_string()).collect());

		let after_start = line_end.min(lines.len());
		let after_end = (after_start + self.search_config.context_lines_after).min(lines.len());
		let after = lines.get(after_start..after_end).map(|s| s.iter().map(|l| l.to_string()).collect());

		(before, after)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::SearchConfig;
	use tempfile::tempdir;

	struct EchoEmbedder;

	#[async_trait::async_trait]
	impl Embedder for EchoEmbedder {
		async fn embed(&self, texts: &[String], _kind: EmbedKind) -> Vec<Vec<f32>> {
			texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect()
		}
		fn dimension(&self) -> Option<usize> {
			Some(4)
		}
	}

	fn engine_with(store: Arc<VectorStore>, config: SearchConfig) -> QueryEngine {
		let embedder: Arc<dyn Embedder> = Arc::new(EchoEmbedder);
		QueryEngine::new(store, embedder, config)
	}

	#[tokio::test]
	async fn empty_query_returns_no_results() {
		let dir = tempdir().unwrap();
		let store = Arc::new(VectorStore::open(dir.path(), 4).await.unwrap());
		let engine = engine_with(store, SearchConfig::default());
		let results = engine.search("   ", Path::new("/some/root"), "main", None, true).await;
		assert!(results.is_empty());
	}

	#[tokio::test]
	async fn unindexed_root_returns_no_results() {
		let dir = tempdir().unwrap();
		let store = Arc::new(VectorStore::open(dir.path(), 4).await.unwrap());
		let engine = engine_with(store, SearchConfig::default());
		let results = engine.search("add two numbers", Path::new("/some/root"), "main", None, true).await;
		assert!(results.is_empty());
	}

	#[tokio::test]
	async fn search_all_branches_is_empty_for_an_unindexed_root() {
		let dir = tempdir().unwrap();
		let store = Arc::new(VectorStore::open(dir.path(), 4).await.unwrap());
		let engine = engine_with(store, SearchConfig::default());
		let results = engine.search_all_branches("add two numbers", Path::new("/some/root"), None).await;
		assert!(results.is_empty());
	}

	#[test]
	fn context_window_never_reads_out_of_bounds() {
		let dir = tempdir().unwrap();
		std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();
		let rt = tokio::runtime::Runtime::new().unwrap();
		rt.block_on(async {
			let store = Arc::new(VectorStore::open(dir.path(), 4).await.unwrap());
			let mut cfg = SearchConfig::default();
			cfg.context_lines_before = 5;
			cfg.context_lines_after = 5;
			let engine = engine_with(store, cfg);
			let (before, after) = engine.load_context(dir.path(), "a.txt", 1, 3);
			assert_eq!(before, Some(vec![]));
			assert_eq!(after, Some(vec![]));
		});
	}
}
