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

//! Fast-restart metadata cache (§4.9): one binary file per root, organized by
//! branch, holding the set of known files and ignore-file fingerprints.
//! Writes are atomic (write-to-temp then rename). Store > cache: on load the
//! engine reconciles this cache against the vector store, which is the
//! authoritative source of truth.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ignore_matcher::IgnoreFileFingerprint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFingerprint {
	pub hash: String,
	pub mtime: i64,
	pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchCache {
	pub ignore_files: HashMap<String, IgnoreFileFingerprint>,
	pub indexed_files: HashMap<String, FileFingerprint>,
	pub chunk_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataCache {
	pub branches: HashMap<String, BranchCache>,
}

impl MetadataCache {
	pub fn branch(&self, branch: &str) -> BranchCache {
		self.branches.get(branch).cloned().unwrap_or_default()
	}

	pub fn set_branch(&mut self, branch: &str, cache: BranchCache) {
		self.branches.insert(branch.to_string(), cache);
	}
}

pub fn cache_path(root: &Path) -> PathBuf {
	root.join(crate::constants::METADATA_DIR).join(crate::constants::METADATA_CACHE_FILE)
}

/// Load the cache from disk. Missing or corrupt files are treated as empty
/// (a corrupt cache must never block indexing; it just forces a full rescan).
pub fn load(root: &Path) -> MetadataCache {
	let path = cache_path(root);
	match std::fs::read(&path) {
		Ok(bytes) => bincode::deserialize(&bytes).unwrap_or_else(|e| {
			tracing::warn!("metadata cache at {} is corrupt ({}), starting fresh", path.display(), e);
			MetadataCache::default()
		}),
		Err(_) => MetadataCache::default(),
	}
}

/// Save atomically: write to a temp file in the same directory, then rename.
pub fn save(root: &Path, cache: &MetadataCache) -> Result<()> {
	let dir = root.join(crate::constants::METADATA_DIR);
	std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

	let path = cache_path(root);
	let tmp_path = dir.join(format!(
		"{}.tmp-{}",
		crate::constants::METADATA_CACHE_FILE,
		std::process::id()
	));

	let bytes = bincode::serialize(cache)?;
	std::fs::write(&tmp_path, &bytes).with_context(|| format!("writing {}", tmp_path.display()))?;
	std::fs::rename(&tmp_path, &path).with_context(|| format!("renaming to {}", path.display()))?;
	Ok(())
}

/// Normalize a path to a workspace-relative, forward-slash key.
pub fn normalize_key(root: &Path, path: &Path) -> String {
	let relative = path.strip_prefix(root).unwrap_or(path);
	relative.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn save_then_load_round_trips() {
		let dir = tempdir().unwrap();
		let mut cache = MetadataCache::default();
		let mut branch_cache = BranchCache::default();
		branch_cache.indexed_files.insert(
			"a.py".to_string(),
			FileFingerprint { hash: "abc".to_string(), mtime: 123, size: 10 },
		);
		branch_cache.chunk_count = 5;
		cache.set_branch("main", branch_cache);

		save(dir.path(), &cache).unwrap();
		let loaded = load(dir.path());
		assert_eq!(loaded.branch("main").chunk_count, 5);
		assert_eq!(loaded.branch("main").indexed_files.get("a.py").unwrap().hash, "abc");
	}

	#[test]
	fn missing_file_loads_as_empty() {
		let dir = tempdir().unwrap();
		let cache = load(dir.path());
		assert!(cache.branches.is_empty());
	}

	#[test]
	fn corrupt_file_loads_as_empty_without_erroring() {
		let dir = tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join(".fskb")).unwrap();
		std::fs::write(cache_path(dir.path()), b"not a valid bincode payload at all").unwrap();
		let cache = load(dir.path());
		assert!(cache.branches.is_empty());
	}

	#[test]
	fn normalize_key_strips_root_and_uses_forward_slashes() {
		let root = Path::new("/workspace/project");
		let key = normalize_key(root, Path::new("/workspace/project/src/main.rs"));
		assert_eq!(key, "src/main.rs");
	}
}
