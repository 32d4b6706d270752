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

//! Vector Store wrapper (§4.7): one LanceDB table per root, named
//! deterministically from the absolute path, plus a global `embedding_cache`
//! table keyed by content hash. All metadata is stored as strings for
//! portability; numeric fields are parsed back on read.

pub mod schema;

use anyhow::Result;
use arrow::array::{Array, StringArray};
use arrow::record_batch::RecordBatchIterator;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

use crate::chunker::Chunk;
use crate::constants::EMBEDDING_CACHE_COLLECTION;

/// One nearest-neighbor hit (§4.7 search).
#[derive(Debug, Clone)]
pub struct SearchHit {
	pub content: String,
	pub file_path: String,
	pub file_hash: String,
	pub mtime: i64,
	pub size: u64,
	pub line_start: usize,
	pub line_end: usize,
	pub char_start: usize,
	pub char_end: usize,
	pub content_hash: String,
	pub file_type: String,
	pub language: String,
	pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct IndexedFileInfo {
	pub hash: String,
	pub mtime: i64,
	pub size: u64,
}

fn collection_name_for_root(root: &Path) -> String {
	let mut hasher = Sha256::new();
	hasher.update(root.to_string_lossy().as_bytes());
	format!("root_{:x}", hasher.finalize())[..24].to_string()
}

pub struct VectorStore {
	db: Connection,
	dimension: usize,
}

impl VectorStore {
	pub async fn open(data_dir: &Path, dimension: usize) -> Result<Self> {
		std::fs::create_dir_all(data_dir)?;
		let db = connect(data_dir.to_string_lossy().as_ref()).execute().await?;
		Ok(Self { db, dimension })
	}

	async fn table_exists(&self, name: &str) -> Result<bool> {
		Ok(self.db.table_names().execute().await?.contains(&name.to_string()))
	}

	pub async fn get_or_create_collection(&self, root: &Path) -> Result<String> {
		let name = collection_name_for_root(root);
		if !self.table_exists(&name).await? {
			let schema = schema::chunk_schema(self.dimension);
			self.db.create_empty_table(&name, schema).execute().await?;
		}
		Ok(name)
	}

	async fn ensure_embedding_cache(&self) -> Result<()> {
		if !self.table_exists(EMBEDDING_CACHE_COLLECTION).await? {
			let schema = schema::embedding_cache_schema(self.dimension);
			self.db.create_empty_table(EMBEDDING_CACHE_COLLECTION, schema).execute().await?;
		}
		Ok(())
	}

	/// Upsert a batch of chunks (with their embeddings) for one file, with
	/// deterministic ids `<branch>:<rel_path>:<line_start>-<line_end>:<ordinal>`.
	#[allow(clippy::too_many_arguments)]
	pub async fn add_chunks(
		&self,
		root: &Path,
		branch: &str,
		file_path: &str,
		file_hash: &str,
		mtime: i64,
		size: u64,
		chunks: &[Chunk],
		embeddings: &[Vec<f32>],
	) -> Result<()> {
		if chunks.is_empty() {
			return Ok(());
		}
		anyhow::ensure!(chunks.len() == embeddings.len(), "chunk/embedding count mismatch");

		let collection = self.get_or_create_collection(root).await?;
		let table = self.db.open_table(&collection).execute().await?;

		let ids: Vec<String> = chunks
			.iter()
			.enumerate()
			.map(|(ordinal, c)| format!("{}:{}:{}-{}:{}", branch, file_path, c.line_start, c.line_end, ordinal))
			.collect();

		let batch = schema::build_chunk_batch(
			self.dimension,
			&ids,
			branch,
			file_path,
			file_hash,
			mtime,
			size,
			chunks,
			embeddings,
		)?;
		let reader = RecordBatchIterator::new(vec![Ok(batch)], schema::chunk_schema(self.dimension));
		table.add(Box::new(reader)).execute().await?;
		Ok(())
	}

	/// Nearest neighbors filtered by branch equality.
	pub async fn search(&self, root: &Path, branch: &str, query_vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
		let collection = collection_name_for_root(root);
		if !self.table_exists(&collection).await? {
			return Ok(vec![]);
		}
		let table = self.db.open_table(&collection).execute().await?;

		let mut stream = table
			.query()
			.nearest_to(query_vector)?
			.distance_type(DistanceType::Cosine)
			.limit(top_k)
			.only_if(format!("branch = '{}'", escape(branch)))
			.execute()
			.await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			hits.extend(schema::batch_to_hits(&batch)?);
		}
		Ok(hits)
	}

	/// Delete all chunks for (branch, file); returns the count deleted.
	pub async fn delete_file_chunks(&self, root: &Path, branch: &str, file_path: &str) -> Result<u64> {
		let collection = collection_name_for_root(root);
		if !self.table_exists(&collection).await? {
			return Ok(0);
		}
		let table = self.db.open_table(&collection).execute().await?;
		let filter = format!("branch = '{}' AND file_path = '{}'", escape(branch), escape(file_path));

		let before = count_matching(&table, &filter).await.unwrap_or(0);
		table.delete(&filter).await?;
		Ok(before)
	}

	/// Batched deletion of paths present in the store but absent from `valid_paths`.
	pub async fn cleanup_orphaned_files(&self, root: &Path, branch: &str, valid_paths: &[String]) -> Result<u64> {
		let collection = collection_name_for_root(root);
		if !self.table_exists(&collection).await? {
			return Ok(0);
		}
		let table = self.db.open_table(&collection).execute().await?;

		let existing = self.get_indexed_files(root, branch).await?;
		let valid: std::collections::HashSet<&String> = valid_paths.iter().collect();
		let orphans: Vec<String> = existing.keys().filter(|p| !valid.contains(p)).cloned().collect();

		let mut deleted = 0u64;
		for batch in orphans.chunks(crate::constants::ORPHAN_CLEANUP_BATCH_SIZE) {
			let quoted: Vec<String> = batch.iter().map(|p| format!("'{}'", escape(p))).collect();
			let filter = format!("branch = '{}' AND file_path IN ({})", escape(branch), quoted.join(", "));
			let before = count_matching(&table, &filter).await.unwrap_or(0);
			table.delete(&filter).await?;
			deleted += before;
		}
		Ok(deleted)
	}

	/// Per-path `{hash, mtime, size}`, deduplicated (first occurrence wins).
	pub async fn get_indexed_files(&self, root: &Path, branch: &str) -> Result<HashMap<String, IndexedFileInfo>> {
		let collection = collection_name_for_root(root);
		if !self.table_exists(&collection).await? {
			return Ok(HashMap::new());
		}
		let table = self.db.open_table(&collection).execute().await?;
		let filter = format!("branch = '{}'", escape(branch));

		let mut stream = table.query().only_if(filter).execute().await?;
		let mut out = HashMap::new();
		while let Some(batch) = stream.try_next().await? {
			for (path, hash, mtime, size) in schema::batch_file_metadata(&batch)? {
				out.entry(path).or_insert(IndexedFileInfo { hash, mtime, size });
			}
		}
		Ok(out)
	}

	/// Per-path chunk counts, from metadata only (no embeddings fetched).
	pub async fn get_file_chunk_counts(&self, root: &Path, branch: &str) -> Result<HashMap<String, u64>> {
		let collection = collection_name_for_root(root);
		if !self.table_exists(&collection).await? {
			return Ok(HashMap::new());
		}
		let table = self.db.open_table(&collection).execute().await?;
		let filter = format!("branch = '{}'", escape(branch));

		let mut stream = table.query().only_if(filter).select(lancedb::query::Select::Columns(vec!["file_path".to_string()])).execute().await?;
		let mut counts = HashMap::new();
		while let Some(batch) = stream.try_next().await? {
			if let Some(col) = batch.column_by_name("file_path") {
				if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
					for i in 0..arr.len() {
						*counts.entry(arr.value(i).to_string()).or_insert(0u64) += 1;
					}
				}
			}
		}
		Ok(counts)
	}

	/// Count of ids for a branch.
	pub async fn get_branch_chunk_count(&self, root: &Path, branch: &str) -> Result<u64> {
		let collection = collection_name_for_root(root);
		if !self.table_exists(&collection).await? {
			return Ok(0);
		}
		let table = self.db.open_table(&collection).execute().await?;
		count_matching(&table, &format!("branch = '{}'", escape(branch))).await
	}

	/// Distinct branch values observed in a root's collection.
	pub async fn list_branches(&self, root: &Path) -> Result<Vec<String>> {
		let collection = collection_name_for_root(root);
		if !self.table_exists(&collection).await? {
			return Ok(vec![]);
		}
		let table = self.db.open_table(&collection).execute().await?;
		let mut stream = table.query().select(lancedb::query::Select::Columns(vec!["branch".to_string()])).execute().await?;
		let mut seen = std::collections::BTreeSet::new();
		while let Some(batch) = stream.try_next().await? {
			if let Some(col) = batch.column_by_name("branch") {
				if let Some(arr) = col.as_any().downcast_ref::<StringArray>() {
					for i in 0..arr.len() {
						seen.insert(arr.value(i).to_string());
					}
				}
			}
		}
		Ok(seen.into_iter().collect())
	}

	/// Look up cached embeddings by content hash.
	pub async fn get_cached_embeddings(&self, hashes: &[String]) -> Result<HashMap<String, Vec<f32>>> {
		self.ensure_embedding_cache().await?;
		if hashes.is_empty() {
			return Ok(HashMap::new());
		}
		let table = self.db.open_table(EMBEDDING_CACHE_COLLECTION).execute().await?;
		let quoted: Vec<String> = hashes.iter().map(|h| format!("'{}'", escape(h))).collect();
		let filter = format!("content_hash IN ({})", quoted.join(", "));

		let mut stream = table.query().only_if(filter).execute().await?;
		let mut out = HashMap::new();
		while let Some(batch) = stream.try_next().await? {
			for (hash, vector) in schema::batch_to_cache_entries(&batch)? {
				out.insert(hash, vector);
			}
		}
		Ok(out)
	}

	/// Upsert embeddings into the global cache, de-duplicating by hash (keep first).
	pub async fn cache_embeddings(&self, hashes: &[String], vectors: &[Vec<f32>]) -> Result<()> {
		self.ensure_embedding_cache().await?;
		anyhow::ensure!(hashes.len() == vectors.len(), "hash/vector count mismatch");
		if hashes.is_empty() {
			return Ok(());
		}

		let mut seen = std::collections::HashSet::new();
		let mut dedup_hashes = Vec::new();
		let mut dedup_vectors = Vec::new();
		for (h, v) in hashes.iter().zip(vectors.iter()) {
			if seen.insert(h.clone()) {
				dedup_hashes.push(h.clone());
				dedup_vectors.push(v.clone());
			}
		}

		let table = self.db.open_table(EMBEDDING_CACHE_COLLECTION).execute().await?;
		// Remove any pre-existing rows for these hashes before inserting fresh ones (upsert).
		let quoted: Vec<String> = dedup_hashes.iter().map(|h| format!("'{}'", escape(h))).collect();
		let _ = table.delete(&format!("content_hash IN ({})", quoted.join(", "))).await;

		let batch = schema::build_cache_batch(self.dimension, &dedup_hashes, &dedup_vectors)?;
		let reader = RecordBatchIterator::new(vec![Ok(batch)], schema::embedding_cache_schema(self.dimension));
		table.add(Box::new(reader)).execute().await?;
		Ok(())
	}
}

async fn count_matching(table: &lancedb::Table, filter: &str) -> Result<u64> {
	let mut stream = table
		.query()
		.only_if(filter.to_string())
		.select(lancedb::query::Select::Columns(vec!["id".to_string()]))
		.execute()
		.await?;
	let mut count = 0u64;
	while let Some(batch) = stream.try_next().await? {
		count += batch.num_rows() as u64;
	}
	Ok(count)
}

fn escape(s: &str) -> String {
	s.replace('\'', "''")
}
