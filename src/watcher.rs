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

//! File Watcher (§4.3): OS change notifications with debounce; classifies
//! events; tells text files from binary by extension + content sniff; recursive
//! initial scan with Git-style early termination.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::constants::{
	FSKBIGNORE_FILE, SNIFF_CONTROL_RATIO_REJECT, SNIFF_LATIN1_CONTROL_RATIO_REJECT, SNIFF_MAX_SIZE_BYTES,
	SNIFF_NUL_RATIO_REJECT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	Modified,
	Created,
	Deleted,
}

/// Fast path: known binary magic bytes, checked at offset 0 (and offset 4 for
/// a couple of container formats that carry a 4-byte size prefix).
const BINARY_MAGIC: &[&[u8]] = &[
	b"\x7fELF",     // ELF
	b"MZ",          // PE/DOS
	b"\x89PNG",     // PNG
	b"\xff\xd8\xff", // JPEG
	b"GIF8",        // GIF
	b"%PDF",        // PDF
	b"PK\x03\x04",  // ZIP
	b"\x1f\x8b",    // GZIP
	b"BM",          // BMP
	b"II*\0",       // TIFF little-endian
	b"MM\0*",       // TIFF big-endian
	b"RIFF",        // WAV/AVI container
];

fn has_binary_magic(bytes: &[u8]) -> bool {
	BINARY_MAGIC.iter().any(|magic| bytes.starts_with(magic)) || (bytes.len() > 8 && BINARY_MAGIC.iter().any(|magic| bytes[4..].starts_with(magic)))
}

/// Decide whether `path` is a text file, per §4.3: fast path on extension
/// allow-list, slow path (small files without a known extension) sniffs content.
pub fn is_text_file(path: &Path, text_extensions: &[String]) -> bool {
	if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
		if text_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
			return true;
		}
	}

	let meta = match std::fs::metadata(path) {
		Ok(m) => m,
		Err(_) => return false,
	};
	if !meta.is_file() || meta.len() >= SNIFF_MAX_SIZE_BYTES {
		return false;
	}

	let bytes = match std::fs::read(path) {
		Ok(b) => b,
		Err(_) => return false,
	};
	sniff_text(&bytes)
}

fn sniff_text(bytes: &[u8]) -> bool {
	if bytes.is_empty() {
		return true;
	}
	if has_binary_magic(bytes) {
		return false;
	}

	let nul_count = bytes.iter().filter(|b| **b == 0).count();
	if nul_count as f64 / bytes.len() as f64 > SNIFF_NUL_RATIO_REJECT {
		return false;
	}

	let control_count = bytes
		.iter()
		.filter(|b| matches!(**b, 0..=8 | 11 | 12 | 14..=31 | 127))
		.count();
	if control_count as f64 / bytes.len() as f64 > SNIFF_CONTROL_RATIO_REJECT {
		return false;
	}

	if std::str::from_utf8(bytes).is_ok() {
		return true;
	}

	// Latin-1/CP1252 trial: every byte is valid, so only the control ratio gates it,
	// and that ratio must be tighter than the UTF-8 path's.
	control_count as f64 / bytes.len() as f64 < SNIFF_LATIN1_CONTROL_RATIO_REJECT
}

/// A debounced, classified event delivered to the engine.
#[derive(Debug, Clone)]
pub struct WatchEvent {
	pub path: PathBuf,
	pub kind: EventKind,
}

pub struct FileWatcher {
	root: PathBuf,
	debounce_delay: Duration,
	_inner: Mutex<Option<RecommendedWatcher>>,
	running: Arc<AtomicBool>,
}

impl FileWatcher {
	pub fn new(root: &Path, debounce_delay_ms: u64) -> Self {
		Self {
			root: root.to_path_buf(),
			debounce_delay: Duration::from_millis(debounce_delay_ms),
			_inner: Mutex::new(None),
			running: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Start watching. `on_event` fires for debounced, classified events;
	/// `on_ignore_file_change` fires immediately (not debounced) whenever
	/// `.gitignore`/`.fskbignore` changes.
	pub fn start<F, G>(&self, text_extensions: Vec<String>, on_event: F, on_ignore_file_change: G) -> anyhow::Result<()>
	where
		F: Fn(WatchEvent) + Send + Sync + 'static,
		G: Fn(PathBuf) + Send + Sync + 'static,
	{
		self.running.store(true, Ordering::SeqCst);

		let (tx, rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();
		let mut watcher = notify::recommended_watcher(move |res| {
			let _ = tx.send(res);
		})?;
		watcher.watch(&self.root, RecursiveMode::Recursive)?;
		*self._inner.lock() = Some(watcher);

		let running = Arc::clone(&self.running);
		let debounce_delay = self.debounce_delay;
		let on_event = Arc::new(on_event);
		let on_ignore_file_change = Arc::new(on_ignore_file_change);
		let text_extensions = Arc::new(text_extensions);

		std::thread::spawn(move || {
			let pending: Mutex<HashMap<PathBuf, (EventKind, Instant)>> = Mutex::new(HashMap::new());

			loop {
				if !running.load(Ordering::SeqCst) {
					break;
				}
				match rx.recv_timeout(Duration::from_millis(200)) {
					Ok(Ok(event)) => {
						for path in event.paths {
							let kind = classify(&event.kind);
							let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
							if file_name == ".gitignore" || file_name == FSKBIGNORE_FILE {
								on_ignore_file_change(path.clone());
								continue;
							}
							pending.lock().insert(path, (kind, Instant::now()));
						}
					}
					Ok(Err(_)) => {}
					Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
					Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
				}

				let now = Instant::now();
				let mut ready = Vec::new();
				{
					let mut guard = pending.lock();
					guard.retain(|path, (kind, ts)| {
						if now.duration_since(*ts) >= debounce_delay {
							ready.push((path.clone(), *kind));
							false
						} else {
							true
						}
					});
				}

				for (path, kind) in ready {
					if kind == EventKind::Deleted {
						on_event(WatchEvent { path, kind });
						continue;
					}
					if is_text_file(&path, &text_extensions) {
						on_event(WatchEvent { path, kind });
					}
				}
			}
		});

		Ok(())
	}

	pub fn stop(&self) {
		self.running.store(false, Ordering::SeqCst);
	}
}

/// One file found by [`scan_tree`]: enough to drive the §4.10 initial-scan
/// ladder without forcing a content read for every entry.
#[derive(Debug, Clone)]
pub struct ScannedFile {
	pub relative_path: String,
	pub absolute_path: PathBuf,
	pub mtime: i64,
	pub size: u64,
}

fn mtime_secs(meta: &std::fs::Metadata) -> i64 {
	meta.modified()
		.ok()
		.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
		.map(|d| d.as_secs() as i64)
		.unwrap_or(0)
}

/// Recursively walk `root`, pruning ignored and explicitly skipped directories
/// before descending into them (Git's early-termination behavior, so a large
/// ignored subtree like `node_modules/` is never even stat'd). Yields only
/// files that pass the text-file check and the size ceiling. `progress` is
/// called periodically with a running count of files visited so far.
pub fn scan_tree(
	root: &Path,
	ignore: &crate::ignore_matcher::IgnoreMatcher,
	text_extensions: &[String],
	max_file_size_bytes: u64,
	skip_directories: &[String],
	mut progress: impl FnMut(usize),
) -> Vec<ScannedFile> {
	let mut out = Vec::new();
	let mut stack = vec![root.to_path_buf()];
	let mut visited = 0usize;

	while let Some(dir) = stack.pop() {
		let entries = match std::fs::read_dir(&dir) {
			Ok(e) => e,
			Err(_) => continue,
		};

		for entry in entries.flatten() {
			let path = entry.path();
			let file_type = match entry.file_type() {
				Ok(ft) => ft,
				Err(_) => continue,
			};
			let name = entry.file_name().to_string_lossy().to_string();

			if file_type.is_dir() {
				if skip_directories.iter().any(|d| d == &name) || ignore.should_ignore(&path, true) {
					continue;
				}
				stack.push(path);
				continue;
			}

			if !file_type.is_file() {
				continue;
			}
			if ignore.should_ignore(&path, false) {
				continue;
			}

			visited += 1;
			if visited % 256 == 0 {
				progress(visited);
			}

			let meta = match entry.metadata() {
				Ok(m) => m,
				Err(_) => continue,
			};
			if meta.len() > max_file_size_bytes {
				continue;
			}
			if !is_text_file(&path, text_extensions) {
				continue;
			}

			out.push(ScannedFile {
				relative_path: crate::metadata_cache::normalize_key(root, &path),
				absolute_path: path,
				mtime: mtime_secs(&meta),
				size: meta.len(),
			});
		}
	}

	progress(visited);
	out
}

fn classify(kind: &notify::EventKind) -> EventKind {
	use notify::EventKind as NK;
	match kind {
		NK::Remove(_) => EventKind::Deleted,
		NK::Create(_) => EventKind::Created,
		_ => EventKind::Modified,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extension_allow_list_is_fast_path() {
		let exts = vec!["rs".to_string()];
		let path = Path::new("/nonexistent/but/has/extension.rs");
		assert!(is_text_file(path, &exts));
	}

	#[test]
	fn sniff_rejects_known_binary_magic() {
		assert!(!sniff_text(b"\x7fELF\x02\x01\x01\x00rest"));
		assert!(!sniff_text(b"MZ\x90\x00\x03\x00\x00\x00"));
	}

	#[test]
	fn sniff_accepts_plain_utf8_text() {
		assert!(sniff_text("hello world\nsecond line\n".as_bytes()));
	}

	#[test]
	fn sniff_rejects_high_nul_ratio() {
		let bytes = vec![0u8; 100];
		assert!(!sniff_text(&bytes));
	}

	#[test]
	fn sniff_accepts_empty_content() {
		assert!(sniff_text(&[]));
	}

	#[test]
	fn scan_tree_prunes_ignored_directories_and_skips_binaries() {
		use crate::ignore_matcher::IgnoreMatcher;
		use tempfile::tempdir;

		let dir = tempdir().unwrap();
		std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
		std::fs::write(dir.path().join("node_modules/pkg/index.js"), "module.exports = {}").unwrap();
		std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
		std::fs::write(dir.path().join("photo.png"), b"\x89PNGrest").unwrap();

		let ignore = IgnoreMatcher::new(dir.path(), true);
		let exts = vec!["rs".to_string()];
		let entries = scan_tree(dir.path(), &ignore, &exts, 10 * 1024 * 1024, &[], |_| {});

		let paths: Vec<&str> = entries.iter().map(|e| e.relative_path.as_str()).collect();
		assert_eq!(paths, vec!["main.rs"]);
	}
}
