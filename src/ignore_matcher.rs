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

//! Gitignore-style ignore matcher (§4.1): rules compiled from a built-in default
//! set plus the root's `.gitignore` and `.fskbignore`, with per-path and
//! per-directory memoization and Git's ancestor short-circuit.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_IGNORE_PATTERNS, FSKBIGNORE_FILE};

/// Fingerprint of an ignore file on disk (§3 IgnoreFileFingerprint).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IgnoreFileFingerprint {
	pub relative_path: String,
	pub mtime: i64,
	pub size: u64,
	pub content_hash: String,
}

impl IgnoreFileFingerprint {
	/// Cheap (mtime, size) probe without reading content. `None` if the file is absent.
	pub fn probe(root: &Path, relative_path: &str) -> Option<(i64, u64)> {
		let meta = std::fs::metadata(root.join(relative_path)).ok()?;
		let mtime = meta
			.modified()
			.ok()
			.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
			.map(|d| d.as_secs() as i64)
			.unwrap_or(0);
		Some((mtime, meta.len()))
	}

	/// Full fingerprint including a content hash; `None` if the file is absent or unreadable.
	pub fn compute(root: &Path, relative_path: &str) -> Option<Self> {
		let (mtime, size) = Self::probe(root, relative_path)?;
		let content = std::fs::read(root.join(relative_path)).ok()?;
		let mut hasher = Sha256::new();
		hasher.update(&content);
		let content_hash = format!("{:x}", hasher.finalize());
		Some(Self {
			relative_path: relative_path.to_string(),
			mtime,
			size,
			content_hash,
		})
	}

	/// Whether the file on disk has changed relative to this fingerprint, using the
	/// mtime/size fast reject before falling back to a content hash comparison.
	pub fn has_changed(&self, root: &Path) -> bool {
		match Self::probe(root, &self.relative_path) {
			None => true, // file vanished (or never existed): treat as changed
			Some((mtime, size)) => {
				if mtime == self.mtime && size == self.size {
					return false;
				}
				match Self::compute(root, &self.relative_path) {
					Some(fresh) => fresh.content_hash != self.content_hash,
					None => true,
				}
			}
		}
	}
}

/// The set of ignore files an `IgnoreMatcher` tracks for a root, keyed by
/// relative path (`.gitignore`, `.fskbignore`).
pub fn tracked_ignore_files(use_fskbignore: bool) -> Vec<&'static str> {
	if use_fskbignore {
		vec![".gitignore", FSKBIGNORE_FILE]
	} else {
		vec![".gitignore"]
	}
}

struct Caches {
	file_cache: HashMap<PathBuf, bool>,
	dir_cache: HashMap<PathBuf, bool>,
}

impl Caches {
	fn new() -> Self {
		Self {
			file_cache: HashMap::new(),
			dir_cache: HashMap::new(),
		}
	}
}

/// Compiled ignore rules for one root, with memoized lookups.
pub struct IgnoreMatcher {
	root: PathBuf,
	use_fskbignore: bool,
	matcher: RwLock<Gitignore>,
	caches: RwLock<Caches>,
}

impl IgnoreMatcher {
	pub fn new(root: &Path, use_fskbignore: bool) -> Self {
		let matcher = Self::compile(root, use_fskbignore);
		Self {
			root: root.to_path_buf(),
			use_fskbignore,
			matcher: RwLock::new(matcher),
			caches: RwLock::new(Caches::new()),
		}
	}

	fn compile(root: &Path, use_fskbignore: bool) -> Gitignore {
		let mut builder = GitignoreBuilder::new(root);

		for pattern in DEFAULT_IGNORE_PATTERNS {
			if let Err(e) = builder.add_line(None, pattern) {
				tracing::warn!("skipping malformed built-in ignore pattern {:?}: {}", pattern, e);
			}
		}

		let gitignore_path = root.join(".gitignore");
		if gitignore_path.exists() {
			if let Some(e) = builder.add(&gitignore_path) {
				tracing::warn!("failed to read {}: {}", gitignore_path.display(), e);
			}
		}

		if use_fskbignore {
			let fskbignore_path = root.join(FSKBIGNORE_FILE);
			if fskbignore_path.exists() {
				if let Some(e) = builder.add(&fskbignore_path) {
					tracing::warn!("failed to read {}: {}", fskbignore_path.display(), e);
				}
			}
		}

		builder.build().unwrap_or_else(|e| {
			tracing::warn!("failed to compile ignore rules for {}: {}; treating as empty", root.display(), e);
			Gitignore::empty()
		})
	}

	/// Re-read source files and invalidate both caches.
	pub fn reload(&self) {
		let fresh = Self::compile(&self.root, self.use_fskbignore);
		*self.matcher.write() = fresh;
		let mut caches = self.caches.write();
		caches.file_cache.clear();
		caches.dir_cache.clear();
	}

	/// Decide whether `path` (absolute or root-relative) is ignored.
	///
	/// First consults the path cache; if absent, walks ancestor directories and
	/// short-circuits on the first cached "ignored" ancestor (Git's behavior);
	/// only evaluates the compiled rules against `path` itself when no cached
	/// ancestor answers.
	pub fn should_ignore(&self, path: &Path, is_dir: bool) -> bool {
		let abs = if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) };

		{
			let caches = self.caches.read();
			let cache = if is_dir { &caches.dir_cache } else { &caches.file_cache };
			if let Some(result) = cache.get(&abs) {
				return *result;
			}
		}

		// Walk ancestors (directories only) looking for a cached "ignored" answer.
		let mut ancestor = abs.parent();
		while let Some(dir) = ancestor {
			if dir == self.root || !dir.starts_with(&self.root) {
				break;
			}
			if let Some(true) = self.caches.read().dir_cache.get(dir) {
				self.store(&abs, is_dir, true);
				return true;
			}
			ancestor = dir.parent();
		}

		let matched = self.matcher.read().matched(&abs, is_dir).is_ignore();
		self.store(&abs, is_dir, matched);
		matched
	}

	fn store(&self, abs: &Path, is_dir: bool, result: bool) {
		let mut caches = self.caches.write();
		if is_dir {
			caches.dir_cache.insert(abs.to_path_buf(), result);
		} else {
			caches.file_cache.insert(abs.to_path_buf(), result);
		}
	}

	/// Cache sizes, exposed for observability.
	pub fn cache_stats(&self) -> (usize, usize) {
		let caches = self.caches.read();
		(caches.file_cache.len(), caches.dir_cache.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::tempdir;

	#[test]
	fn default_patterns_ignore_git_dir() {
		let dir = tempdir().unwrap();
		let matcher = IgnoreMatcher::new(dir.path(), true);
		assert!(matcher.should_ignore(&dir.path().join(".git"), true));
	}

	#[test]
	fn gitignore_rule_is_applied() {
		let dir = tempdir().unwrap();
		fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
		let matcher = IgnoreMatcher::new(dir.path(), true);
		assert!(matcher.should_ignore(&dir.path().join("debug.log"), false));
		assert!(!matcher.should_ignore(&dir.path().join("main.rs"), false));
	}

	#[test]
	fn reload_picks_up_new_rules() {
		let dir = tempdir().unwrap();
		let matcher = IgnoreMatcher::new(dir.path(), true);
		assert!(!matcher.should_ignore(&dir.path().join("b.log"), false));

		fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
		matcher.reload();
		let (file_cache, _dir_cache) = matcher.cache_stats();
		assert_eq!(file_cache, 0, "reload must clear caches");

		assert!(matcher.should_ignore(&dir.path().join("b.log"), false));
		let (file_cache, _dir_cache) = matcher.cache_stats();
		assert_eq!(file_cache, 1, "should_ignore repopulates the cache after reload");
	}

	#[test]
	fn ancestor_short_circuit_ignores_descendants() {
		let dir = tempdir().unwrap();
		fs::write(dir.path().join(".gitignore"), "vendor/\n").unwrap();
		fs::create_dir_all(dir.path().join("vendor/pkg")).unwrap();
		let matcher = IgnoreMatcher::new(dir.path(), true);

		assert!(matcher.should_ignore(&dir.path().join("vendor"), true));
		assert!(matcher.should_ignore(&dir.path().join("vendor/pkg/file.rs"), false));
	}

	#[test]
	fn fingerprint_detects_content_change_after_touch() {
		let dir = tempdir().unwrap();
		let path = dir.path().join(".gitignore");
		fs::write(&path, "*.log\n").unwrap();
		let fp = IgnoreFileFingerprint::compute(dir.path(), ".gitignore").unwrap();
		assert!(!fp.has_changed(dir.path()));

		fs::write(&path, "*.tmp\n").unwrap();
		assert!(fp.has_changed(dir.path()));
	}
}
