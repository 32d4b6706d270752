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

//! Arrow schemas and batch conversion for the per-root chunk table and the
//! global embedding cache table. Metadata is stored as strings; numeric
//! fields (`mtime`, `size`, line/char offsets) are parsed back on read.

use anyhow::Result;
use arrow::array::{Array, FixedSizeListArray, Float32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use crate::chunker::Chunk;

fn embedding_field(dimension: usize) -> Field {
	Field::new(
		"embedding",
		DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension as i32),
		true,
	)
}

pub fn chunk_schema(dimension: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("branch", DataType::Utf8, false),
		Field::new("file_path", DataType::Utf8, false),
		Field::new("file_hash", DataType::Utf8, false),
		Field::new("mtime", DataType::Utf8, false),
		Field::new("size", DataType::Utf8, false),
		Field::new("line_start", DataType::Utf8, false),
		Field::new("line_end", DataType::Utf8, false),
		Field::new("char_start", DataType::Utf8, false),
		Field::new("char_end", DataType::Utf8, false),
		Field::new("content_hash", DataType::Utf8, false),
		Field::new("content", DataType::Utf8, false),
		Field::new("file_type", DataType::Utf8, false),
		Field::new("language", DataType::Utf8, false),
		embedding_field(dimension),
	]))
}

pub fn embedding_cache_schema(dimension: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("content_hash", DataType::Utf8, false),
		embedding_field(dimension),
	]))
}

fn embedding_array(dimension: usize, vectors: &[Vec<f32>]) -> FixedSizeListArray {
	let mut flattened = Vec::with_capacity(vectors.len() * dimension);
	for v in vectors {
		if v.len() == dimension {
			flattened.extend_from_slice(v);
		} else {
			flattened.extend(std::iter::repeat(0.0f32).take(dimension));
		}
	}
	FixedSizeListArray::new(
		Arc::new(Field::new("item", DataType::Float32, true)),
		dimension as i32,
		Arc::new(Float32Array::from(flattened)),
		None,
	)
}

#[allow(clippy::too_many_arguments)]
pub fn build_chunk_batch(
	dimension: usize,
	ids: &[String],
	branch: &str,
	file_path: &str,
	file_hash: &str,
	mtime: i64,
	size: u64,
	chunks: &[Chunk],
	embeddings: &[Vec<f32>],
) -> Result<RecordBatch> {
	let n = chunks.len();
	let branches: Vec<&str> = std::iter::repeat(branch).take(n).collect();
	let paths: Vec<&str> = std::iter::repeat(file_path).take(n).collect();
	let file_hashes: Vec<&str> = std::iter::repeat(file_hash).take(n).collect();
	let mtimes: Vec<String> = std::iter::repeat(mtime.to_string()).take(n).collect();
	let sizes: Vec<String> = std::iter::repeat(size.to_string()).take(n).collect();
	let line_starts: Vec<String> = chunks.iter().map(|c| c.line_start.to_string()).collect();
	let line_ends: Vec<String> = chunks.iter().map(|c| c.line_end.to_string()).collect();
	let char_starts: Vec<String> = chunks.iter().map(|c| c.char_start.to_string()).collect();
	let char_ends: Vec<String> = chunks.iter().map(|c| c.char_end.to_string()).collect();
	let content_hashes: Vec<&str> = chunks.iter().map(|c| c.content_hash.as_str()).collect();
	let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
	let file_types: Vec<&str> = chunks.iter().map(|c| c.file_type.as_str()).collect();
	let languages: Vec<&str> = chunks.iter().map(|c| c.language.as_str()).collect();

	Ok(RecordBatch::try_new(
		chunk_schema(dimension),
		vec![
			Arc::new(StringArray::from(ids.to_vec())),
			Arc::new(StringArray::from(branches)),
			Arc::new(StringArray::from(paths)),
			Arc::new(StringArray::from(file_hashes)),
			Arc::new(StringArray::from(mtimes)),
			Arc::new(StringArray::from(sizes)),
			Arc::new(StringArray::from(line_starts)),
			Arc::new(StringArray::from(line_ends)),
			Arc::new(StringArray::from(char_starts)),
			Arc::new(StringArray::from(char_ends)),
			Arc::new(StringArray::from(content_hashes)),
			Arc::new(StringArray::from(contents)),
			Arc::new(StringArray::from(file_types)),
			Arc::new(StringArray::from(languages)),
			Arc::new(embedding_array(dimension, embeddings)),
		],
	)?)
}

pub fn build_cache_batch(dimension: usize, hashes: &[String], vectors: &[Vec<f32>]) -> Result<RecordBatch> {
	Ok(RecordBatch::try_new(
		embedding_cache_schema(dimension),
		vec![
			Arc::new(StringArray::from(hashes.to_vec())),
			Arc::new(embedding_array(dimension, vectors)),
		],
	)?)
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

fn parse_col<T: std::str::FromStr>(batch: &RecordBatch, name: &str, i: usize) -> Result<T>
where
	T::Err: std::fmt::Display,
{
	let col = string_col(batch, name).ok_or_else(|| anyhow::anyhow!("missing {} column", name))?;
	col.value(i).parse::<T>().map_err(|e| anyhow::anyhow!("invalid {} value {:?}: {}", name, col.value(i), e))
}

/// Extract `(path, hash, mtime, size)` per row, for `get_indexed_files`.
pub fn batch_file_metadata(batch: &RecordBatch) -> Result<Vec<(String, String, i64, u64)>> {
	let paths = string_col(batch, "file_path").ok_or_else(|| anyhow::anyhow!("missing file_path column"))?;
	let hashes = string_col(batch, "file_hash").ok_or_else(|| anyhow::anyhow!("missing file_hash column"))?;

	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let mtime: i64 = parse_col(batch, "mtime", i)?;
		let size: u64 = parse_col(batch, "size", i)?;
		out.push((paths.value(i).to_string(), hashes.value(i).to_string(), mtime, size));
	}
	Ok(out)
}

/// Extract `(content_hash, vector)` per row, for the embedding cache.
pub fn batch_to_cache_entries(batch: &RecordBatch) -> Result<Vec<(String, Vec<f32>)>> {
	let hashes = string_col(batch, "content_hash").ok_or_else(|| anyhow::anyhow!("missing content_hash column"))?;
	let embeddings = batch
		.column_by_name("embedding")
		.and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
		.ok_or_else(|| anyhow::anyhow!("missing embedding column"))?;

	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let values = embeddings.value(i);
		let floats = values.as_any().downcast_ref::<Float32Array>().ok_or_else(|| anyhow::anyhow!("embedding row not float32"))?;
		out.push((hashes.value(i).to_string(), floats.values().to_vec()));
	}
	Ok(out)
}

/// Extract search hits from a vector-search result batch (includes `_distance`).
pub fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<super::SearchHit>> {
	let contents = string_col(batch, "content").ok_or_else(|| anyhow::anyhow!("missing content column"))?;
	let paths = string_col(batch, "file_path").ok_or_else(|| anyhow::anyhow!("missing file_path column"))?;
	let file_hashes = string_col(batch, "file_hash").ok_or_else(|| anyhow::anyhow!("missing file_hash column"))?;
	let content_hashes = string_col(batch, "content_hash").ok_or_else(|| anyhow::anyhow!("missing content_hash column"))?;
	let file_types = string_col(batch, "file_type").ok_or_else(|| anyhow::anyhow!("missing file_type column"))?;
	let languages = string_col(batch, "language").ok_or_else(|| anyhow::anyhow!("missing language column"))?;
	let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());

	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		let mtime: i64 = parse_col(batch, "mtime", i)?;
		let size: u64 = parse_col(batch, "size", i)?;
		let line_start: usize = parse_col(batch, "line_start", i)?;
		let line_end: usize = parse_col(batch, "line_end", i)?;
		let char_start: usize = parse_col(batch, "char_start", i)?;
		let char_end: usize = parse_col(batch, "char_end", i)?;
		out.push(super::SearchHit {
			content: contents.value(i).to_string(),
			file_path: paths.value(i).to_string(),
			file_hash: file_hashes.value(i).to_string(),
			mtime,
			size,
			line_start,
			line_end,
			char_start,
			char_end,
			content_hash: content_hashes.value(i).to_string(),
			file_type: file_types.value(i).to_string(),
			language: languages.value(i).to_string(),
			distance: distances.map(|d| d.value(i)).unwrap_or(0.0),
		});
	}
	Ok(out)
}
