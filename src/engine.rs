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

//! Indexing Engine (§4.10): the coordinator that ties every other component
//! together. One `IndexingEngine` per process watches zero or more roots,
//! each with its own ignore matcher, branch tracker and file watcher, and
//! drains a single priority work queue shared across all of them.

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::branch::BranchTracker;
use crate::chunker;
use crate::config::Config;
use crate::constants::{
	METADATA_SAVE_EVERY_N_FILES, SCAN_ENQUEUE_BATCH_SIZE, SHUTDOWN_METADATA_SAVE_SECS, SHUTDOWN_WORKER_WAIT_SECS,
	WORKER_DEQUEUE_TIMEOUT_SECS,
};
use crate::embedding::{EmbedKind, Embedder};
use crate::governor::ResourceGovernor;
use crate::ignore_matcher::{self, IgnoreFileFingerprint, IgnoreMatcher};
use crate::merkle::{self, MerkleNode};
use crate::metadata_cache::{self, FileFingerprint, MetadataCache};
use crate::store::VectorStore;
use crate::watcher::{self, EventKind, FileWatcher, WatchEvent};

fn sha256_hex(bytes: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(bytes);
	format!("{:x}", hasher.finalize())
}

/// Decode raw file bytes into text, accepting UTF-8 and falling back to a
/// lossless Latin-1 mapping (the same tolerance `watcher::sniff_text` applies
/// when deciding a file is text in the first place).
fn decode_text(bytes: &[u8]) -> Option<String> {
	match std::str::from_utf8(bytes) {
		Ok(s) => Some(s.to_string()),
		Err(_) => Some(bytes.iter().map(|&b| b as char).collect()),
	}
}

/// Why a work item was enqueued; also its scheduling priority (§3 WorkItem).
/// Lower priority numbers run first: live filesystem events always overtake
/// bulk-scan backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
	Modified,
	Created,
	Deleted,
	BulkInitialScan,
}

impl WorkKind {
	fn priority(self) -> u8 {
		match self {
			WorkKind::Modified | WorkKind::Deleted => 0,
			WorkKind::Created => 1,
			WorkKind::BulkInitialScan => 2,
		}
	}
}

#[derive(Debug, Clone)]
struct WorkItem {
	priority: u8,
	sequence: u64,
	root: PathBuf,
	file: PathBuf,
	kind: WorkKind,
}

impl PartialEq for WorkItem {
	fn eq(&self, other: &Self) -> bool {
		self.priority == other.priority && self.sequence == other.sequence
	}
}
impl Eq for WorkItem {}

// Reversed so a max-heap (`BinaryHeap`) pops the smallest priority number,
// and within a priority tier the smallest sequence number (oldest first).
impl Ord for WorkItem {
	fn cmp(&self, other: &Self) -> CmpOrdering {
		other.priority.cmp(&self.priority).then_with(|| other.sequence.cmp(&self.sequence))
	}
}
impl PartialOrd for WorkItem {
	fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
		Some(self.cmp(other))
	}
}

struct WorkQueue {
	heap: Mutex<BinaryHeap<WorkItem>>,
	notify: Notify,
	sequence: AtomicU64,
}

impl WorkQueue {
	fn new() -> Self {
		Self {
			heap: Mutex::new(BinaryHeap::new()),
			notify: Notify::new(),
			sequence: AtomicU64::new(0),
		}
	}

	fn push(&self, root: PathBuf, file: PathBuf, kind: WorkKind) {
		let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
		self.heap.lock().push(WorkItem { priority: kind.priority(), sequence, root, file, kind });
		self.notify.notify_one();
	}

	fn requeue(&self, item: WorkItem) {
		self.heap.lock().push(item);
		self.notify.notify_one();
	}

	/// Wait up to `timeout` for an item to become available. A single attempt;
	/// returns `None` on timeout rather than looping, so callers stay responsive
	/// to shutdown.
	async fn pop_timeout(&self, timeout: Duration) -> Option<WorkItem> {
		if let Some(item) = self.heap.lock().pop() {
			return Some(item);
		}
		let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
		self.heap.lock().pop()
	}

	fn len(&self) -> usize {
		self.heap.lock().len()
	}

	fn clear(&self) {
		self.heap.lock().clear();
	}
}

#[derive(Debug, Clone, Default)]
struct RootStats {
	files_scanned: u64,
	files_indexed: u64,
	chunks_created: u64,
	chunks_embedded: u64,
	errors: u64,
	current_file: Option<String>,
}

/// Snapshot of one root's indexing progress, exposed for a CLI status line.
#[derive(Debug, Clone)]
pub struct RootStatus {
	pub path: PathBuf,
	pub branch: String,
	pub paused: bool,
	pub files_scanned: u64,
	pub files_indexed: u64,
	pub chunks_created: u64,
	pub chunks_embedded: u64,
	pub errors: u64,
	pub current_file: Option<String>,
	pub queue_size: usize,
}

struct RootState {
	path: PathBuf,
	ignore_matcher: Arc<IgnoreMatcher>,
	branch_tracker: Arc<BranchTracker>,
	watcher: Arc<FileWatcher>,
	paused: AtomicBool,
	idle_saved: AtomicBool,
	stats: RwLock<RootStats>,
	indexed_files: RwLock<HashMap<String, FileFingerprint>>,
	metadata_cache: RwLock<MetadataCache>,
	ignore_fingerprints: RwLock<HashMap<String, IgnoreFileFingerprint>>,
	previous_merkle: RwLock<Option<MerkleNode>>,
	branch_monitor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RootState {
	fn current_branch(&self) -> String {
		self.branch_tracker.current_branch()
	}
}

/// Coordinates indexing across every watched root: initial scans, live
/// filesystem events, branch switches and ignore-file changes all funnel
/// through the same priority work queue and a small pool of workers.
pub struct IndexingEngine {
	store: Arc<VectorStore>,
	embedder: Arc<dyn Embedder>,
	config: Config,
	governor: Arc<ResourceGovernor>,
	roots: RwLock<HashMap<PathBuf, Arc<RootState>>>,
	queue: Arc<WorkQueue>,
	worker_handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
	shutting_down: AtomicBool,
}

impl IndexingEngine {
	pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn Embedder>, config: Config) -> Arc<Self> {
		let governor = ResourceGovernor::new(&config.resource);
		Arc::new(Self {
			store,
			embedder,
			config,
			governor,
			roots: RwLock::new(HashMap::new()),
			queue: Arc::new(WorkQueue::new()),
			worker_handles: Mutex::new(Vec::new()),
			shutting_down: AtomicBool::new(false),
		})
	}

	/// Spawn the governor's sampler and a pool of workers sized per
	/// `ResourceGovernor::get_optimal_worker_count`.
	pub fn start(self: &Arc<Self>) {
		self.governor.spawn();
		let worker_count = self.governor.get_optimal_worker_count();
		let mut handles = self.worker_handles.lock();
		for _ in 0..worker_count {
			let engine = Arc::clone(self);
			handles.push(tokio::spawn(async move { engine.worker_loop().await }));
		}
	}

	/// Stop accepting new work, save every root's metadata cache, tear down
	/// watchers and branch pollers, and wait (bounded) for workers to drain.
	pub async fn stop(&self) {
		self.shutting_down.store(true, Ordering::SeqCst);

		let roots: Vec<Arc<RootState>> = self.roots.read().values().cloned().collect();
		let _ = tokio::time::timeout(Duration::from_secs(SHUTDOWN_METADATA_SAVE_SECS), async {
			for root in &roots {
				self.save_metadata_cache(root).await;
			}
		})
		.await;

		for root in &roots {
			root.watcher.stop();
			root.branch_tracker.stop();
			if let Some(handle) = root.branch_monitor.lock().take() {
				handle.abort();
			}
		}

		self.governor.stop();

		let handles: Vec<_> = self.worker_handles.lock().drain(..).collect();
		let _ = tokio::time::timeout(Duration::from_secs(SHUTDOWN_WORKER_WAIT_SECS), futures::future::join_all(handles)).await;

		self.queue.clear();
	}

	/// Start watching `path`. Spawns the branch poller immediately and the
	/// initial scan as a background task; the file watcher itself only starts
	/// once that scan completes, so live events never race the scan's own
	/// enqueues.
	pub async fn add_root(self: &Arc<Self>, path: PathBuf) -> Result<bool> {
		let path = path.canonicalize().unwrap_or(path);
		if !path.is_dir() {
			anyhow::bail!("root path is not a directory: {}", path.display());
		}
		if self.roots.read().contains_key(&path) {
			return Ok(false);
		}

		let ignore_matcher = Arc::new(IgnoreMatcher::new(&path, self.config.indexing.use_fskbignore));
		let branch_tracker = Arc::new(BranchTracker::new(&path));
		let watcher = Arc::new(FileWatcher::new(&path, self.config.resource.debounce_delay_ms));
		let metadata_cache = metadata_cache::load(&path);

		let root_state = Arc::new(RootState {
			path: path.clone(),
			ignore_matcher,
			branch_tracker: Arc::clone(&branch_tracker),
			watcher,
			paused: AtomicBool::new(false),
			idle_saved: AtomicBool::new(false),
			stats: RwLock::new(RootStats::default()),
			indexed_files: RwLock::new(HashMap::new()),
			metadata_cache: RwLock::new(metadata_cache),
			ignore_fingerprints: RwLock::new(HashMap::new()),
			previous_merkle: RwLock::new(None),
			branch_monitor: Mutex::new(None),
		});

		self.roots.write().insert(path.clone(), Arc::clone(&root_state));

		let engine_for_branch = Arc::clone(self);
		let branch_root_path = path.clone();
		let handle = branch_tracker.spawn(move |new_branch| {
			let engine = Arc::clone(&engine_for_branch);
			let root_path = branch_root_path.clone();
			tokio::spawn(async move { engine.handle_branch_change(root_path, new_branch).await });
		});
		*root_state.branch_monitor.lock() = Some(handle);

		let engine_for_scan = Arc::clone(self);
		tokio::spawn(async move { engine_for_scan.initial_scan(root_state).await });

		Ok(true)
	}

	pub async fn remove_root(&self, path: &Path) -> Result<bool> {
		let root = match self.roots.write().remove(path) {
			Some(r) => r,
			None => return Ok(false),
		};
		root.watcher.stop();
		root.branch_tracker.stop();
		if let Some(handle) = root.branch_monitor.lock().take() {
			handle.abort();
		}
		Ok(true)
	}

	pub fn pause_root(&self, path: &Path) -> bool {
		match self.roots.read().get(path) {
			Some(root) => {
				root.paused.store(true, Ordering::SeqCst);
				true
			}
			None => false,
		}
	}

	pub fn resume_root(&self, path: &Path) -> bool {
		match self.roots.read().get(path) {
			Some(root) => {
				root.paused.store(false, Ordering::SeqCst);
				true
			}
			None => false,
		}
	}

	pub fn list_roots(&self) -> Vec<PathBuf> {
		self.roots.read().keys().cloned().collect()
	}

	pub fn get_status(&self, path: Option<&Path>) -> Vec<RootStatus> {
		let queue_size = self.queue.len();
		self.roots
			.read()
			.values()
			.filter(|r| match path {
				Some(p) => r.path == p,
				None => true,
			})
			.map(|r| {
				let stats = r.stats.read();
				RootStatus {
					path: r.path.clone(),
					branch: r.current_branch(),
					paused: r.paused.load(Ordering::SeqCst),
					files_scanned: stats.files_scanned,
					files_indexed: stats.files_indexed,
					chunks_created: stats.chunks_created,
					chunks_embedded: stats.chunks_embedded,
					errors: stats.errors,
					current_file: stats.current_file.clone(),
					queue_size,
				}
			})
			.collect()
	}

	pub fn set_ui_active(&self, active: bool) {
		self.governor.set_ui_active(active);
	}

	fn start_watcher(self: &Arc<Self>, root: &Arc<RootState>) {
		let queue = Arc::clone(&self.queue);
		let root_path = root.path.clone();
		let on_event = move |evt: WatchEvent| {
			let kind = match evt.kind {
				EventKind::Modified => WorkKind::Modified,
				EventKind::Created => WorkKind::Created,
				EventKind::Deleted => WorkKind::Deleted,
			};
			queue.push(root_path.clone(), evt.path, kind);
		};

		let engine = Arc::clone(self);
		let ignore_root_path = root.path.clone();
		let on_ignore_change = move |_changed: PathBuf| {
			let engine = Arc::clone(&engine);
			let root_path = ignore_root_path.clone();
			tokio::spawn(async move { engine.handle_ignore_change(root_path).await });
		};

		if let Err(e) = root.watcher.start(self.config.indexing.text_extensions.clone(), on_event, on_ignore_change) {
			tracing::error!("failed to start file watcher for {}: {}", root.path.display(), e);
		}
	}

	async fn handle_branch_change(self: Arc<Self>, root_path: PathBuf, new_branch: String) {
		let root = match self.roots.read().get(&root_path).cloned() {
			Some(r) => r,
			None => return,
		};
		tracing::info!("{}: branch switched to {}, rescanning", root_path.display(), new_branch);
		root.watcher.stop();
		root.indexed_files.write().clear();
		self.initial_scan(root).await;
	}

	/// An ignore file changed: drop chunks for anything newly ignored, enqueue
	/// anything newly un-ignored, save the cache. Lighter than a full rescan —
	/// it walks the tree once but never re-hashes files whose fingerprint is
	/// already known.
	async fn handle_ignore_change(self: Arc<Self>, root_path: PathBuf) {
		let root = match self.roots.read().get(&root_path).cloned() {
			Some(r) => r,
			None => return,
		};
		root.ignore_matcher.reload();
		let branch = root.current_branch();

		let previously_known: Vec<String> = root.indexed_files.read().keys().cloned().collect();
		for relative in previously_known {
			let absolute = root.path.join(&relative);
			if root.ignore_matcher.should_ignore(&absolute, false) {
				match self.store.delete_file_chunks(&root.path, &branch, &relative).await {
					Ok(count) => {
						let mut stats = root.stats.write();
						stats.chunks_created = stats.chunks_created.saturating_sub(count);
						stats.files_indexed = stats.files_indexed.saturating_sub(1);
					}
					Err(e) => tracing::error!("delete_file_chunks failed for {}: {}", relative, e),
				}
				root.indexed_files.write().remove(&relative);
			}
		}

		let known_now: HashSet<String> = root.indexed_files.read().keys().cloned().collect();
		let entries = watcher::scan_tree(
			&root.path,
			&root.ignore_matcher,
			&self.config.indexing.text_extensions,
			self.config.indexing.max_file_size_mb * 1024 * 1024,
			&self.config.indexing.skip_directories,
			|_| {},
		);
		for entry in entries {
			if !known_now.contains(&entry.relative_path) {
				self.queue.push(root.path.clone(), entry.absolute_path, WorkKind::Created);
			}
		}

		self.save_metadata_cache(&root).await;
	}

	/// §4.10.a: reconcile the on-disk cache against the store (store wins),
	/// recompile ignore rules if `.gitignore`/`.fskbignore` changed, walk the
	/// tree, then apply the mtime/size/hash ladder to decide what needs
	/// (re-)indexing. Only files that fail the ladder are enqueued.
	async fn initial_scan(self: Arc<Self>, root: Arc<RootState>) {
		let branch = root.current_branch();
		let mut cache = root.metadata_cache.read().clone();
		let mut branch_cache = cache.branch(&branch);

		let store_files = self.store.get_indexed_files(&root.path, &branch).await.unwrap_or_default();
		let store_chunk_count = self.store.get_branch_chunk_count(&root.path, &branch).await.unwrap_or(0);
		branch_cache.indexed_files.retain(|path, _| store_files.contains_key(path));
		for (path, info) in &store_files {
			let entry = branch_cache.indexed_files.entry(path.clone()).or_insert_with(|| FileFingerprint {
				hash: info.hash.clone(),
				mtime: info.mtime,
				size: info.size,
			});
			entry.hash = info.hash.clone();
			entry.mtime = info.mtime;
			entry.size = info.size;
		}
		branch_cache.chunk_count = store_chunk_count;

		let tracked = ignore_matcher::tracked_ignore_files(self.config.indexing.use_fskbignore);
		let mut full_rescan = branch_cache.indexed_files.is_empty();
		for relative in &tracked {
			let changed = match branch_cache.ignore_files.get(*relative) {
				Some(fingerprint) => fingerprint.has_changed(&root.path),
				None => true,
			};
			if changed {
				full_rescan = true;
				match IgnoreFileFingerprint::compute(&root.path, relative) {
					Some(fresh) => {
						branch_cache.ignore_files.insert((*relative).to_string(), fresh);
					}
					None => {
						branch_cache.ignore_files.remove(*relative);
					}
				}
			}
		}
		if full_rescan {
			root.ignore_matcher.reload();
		}

		let entries = watcher::scan_tree(
			&root.path,
			&root.ignore_matcher,
			&self.config.indexing.text_extensions,
			self.config.indexing.max_file_size_mb * 1024 * 1024,
			&self.config.indexing.skip_directories,
			|n| tracing::debug!("{}: scanned {} entries so far", root.path.display(), n),
		);

		if full_rescan {
			self.log_merkle_diff(&root, &entries);
		}

		let mut to_enqueue = Vec::new();
		let mut unchanged = 0u64;
		for entry in &entries {
			match branch_cache.indexed_files.get(&entry.relative_path).cloned() {
				None => to_enqueue.push(entry.absolute_path.clone()),
				Some(cached) => {
					if cached.mtime == entry.mtime && cached.size == entry.size {
						unchanged += 1;
						continue;
					}
					let bytes = match std::fs::read(&entry.absolute_path) {
						Ok(b) => b,
						Err(_) => continue,
					};
					let hash = sha256_hex(&bytes);
					if hash == cached.hash {
						branch_cache.indexed_files.insert(
							entry.relative_path.clone(),
							FileFingerprint { hash, mtime: entry.mtime, size: entry.size },
						);
						unchanged += 1;
					} else {
						to_enqueue.push(entry.absolute_path.clone());
					}
				}
			}
		}

		let valid_paths: Vec<String> = entries.iter().map(|e| e.relative_path.clone()).collect();
		if let Ok(removed) = self.store.cleanup_orphaned_files(&root.path, &branch, &valid_paths).await {
			if removed > 0 {
				branch_cache.chunk_count = branch_cache.chunk_count.saturating_sub(removed);
				let valid: HashSet<&String> = valid_paths.iter().collect();
				branch_cache.indexed_files.retain(|p, _| valid.contains(p));
			}
		}

		{
			let mut stats = root.stats.write();
			stats.files_scanned = entries.len() as u64;
			stats.files_indexed = unchanged;
			stats.chunks_created = branch_cache.chunk_count;
		}
		*root.indexed_files.write() = branch_cache.indexed_files.clone();
		*root.ignore_fingerprints.write() = branch_cache.ignore_files.clone();
		cache.set_branch(&branch, branch_cache);
		*root.metadata_cache.write() = cache;

		for batch in to_enqueue.chunks(SCAN_ENQUEUE_BATCH_SIZE) {
			for file in batch {
				self.queue.push(root.path.clone(), file.clone(), WorkKind::BulkInitialScan);
			}
			tokio::task::yield_now().await;
		}

		self.save_metadata_cache(&root).await;
		self.start_watcher(&root);
	}

	/// Build a merkle tree over the scan's file hashes and, if a previous tree
	/// exists, log the directory-level diff at debug level. Not on the
	/// indexing decision path — purely an observability aid.
	fn log_merkle_diff(&self, root: &Arc<RootState>, entries: &[watcher::ScannedFile]) {
		let mut hashes = std::collections::BTreeMap::new();
		for entry in entries {
			if let Ok(bytes) = std::fs::read(&entry.absolute_path) {
				hashes.insert(entry.relative_path.clone(), sha256_hex(&bytes));
			}
		}
		let new_tree = merkle::build(&hashes);
		if let Some(old_tree) = root.previous_merkle.write().replace(new_tree.clone()) {
			let diff = merkle::compare(&old_tree, &new_tree);
			if !diff.added_dirs.is_empty() || !diff.modified_dirs.is_empty() || !diff.deleted_dirs.is_empty() {
				tracing::debug!(
					"{}: merkle diff +{} ~{} -{}",
					root.path.display(),
					diff.added_dirs.len(),
					diff.modified_dirs.len(),
					diff.deleted_dirs.len()
				);
			}
		}
	}

	async fn worker_loop(self: Arc<Self>) {
		loop {
			if self.shutting_down.load(Ordering::SeqCst) {
				break;
			}
			match self.queue.pop_timeout(Duration::from_secs(WORKER_DEQUEUE_TIMEOUT_SECS)).await {
				None => self.on_idle().await,
				Some(item) => {
					let root = match self.roots.read().get(&item.root).cloned() {
						Some(r) => r,
						None => continue,
					};
					if root.paused.load(Ordering::SeqCst) {
						self.queue.requeue(item);
						tokio::time::sleep(Duration::from_millis(100)).await;
						continue;
					}

					self.governor.wait_if_throttled().await;
					root.idle_saved.store(false, Ordering::SeqCst);

					if item.kind == WorkKind::Deleted {
						self.delete_file(&root, &item.file).await;
					} else {
						self.index_file(&root, &item.file).await;
					}

					let indexed = root.stats.read().files_indexed;
					if indexed % METADATA_SAVE_EVERY_N_FILES == 0 {
						self.save_metadata_cache(&root).await;
					}
				}
			}
		}
	}

	/// On a globally empty queue, clear `current_file` and save the metadata
	/// cache once per quiet period for every root that has caught up.
	async fn on_idle(&self) {
		let roots: Vec<Arc<RootState>> = self.roots.read().values().cloned().collect();
		for root in roots {
			let caught_up = {
				let stats = root.stats.read();
				stats.files_indexed >= stats.files_scanned
			};
			if caught_up {
				if !root.idle_saved.swap(true, Ordering::SeqCst) {
					root.stats.write().current_file = None;
					self.save_metadata_cache(&root).await;
				}
			} else {
				root.idle_saved.store(false, Ordering::SeqCst);
			}
		}
	}

	/// §4.10.b: index (or re-index) one file. No-ops cleanly if the file has
	/// vanished, exceeds the size ceiling, or its content hash is unchanged.
	async fn index_file(&self, root: &Arc<RootState>, absolute_path: &Path) {
		let relative = metadata_cache::normalize_key(&root.path, absolute_path);
		root.stats.write().current_file = Some(relative.clone());

		let meta = match std::fs::metadata(absolute_path) {
			Ok(m) if m.is_file() => m,
			_ => return,
		};
		let max_bytes = self.config.indexing.max_file_size_mb * 1024 * 1024;
		if meta.len() > max_bytes {
			return;
		}

		let bytes = match std::fs::read(absolute_path) {
			Ok(b) => b,
			Err(_) => return,
		};
		let new_hash = sha256_hex(&bytes);
		let mtime = meta
			.modified()
			.ok()
			.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
			.map(|d| d.as_secs() as i64)
			.unwrap_or(0);
		let size = meta.len();

		if let Some(existing) = root.indexed_files.read().get(&relative) {
			if existing.hash == new_hash {
				return;
			}
		}

		let text = match decode_text(&bytes) {
			Some(t) => t,
			None => return,
		};

		let chunks = chunker::chunk_file(&text, &relative, &self.config.chunking);
		if chunks.is_empty() {
			return;
		}
		let hashes: Vec<String> = chunks.iter().map(|c| c.content_hash.clone()).collect();

		let cached = self.store.get_cached_embeddings(&hashes).await.unwrap_or_default();
		let mut vectors: Vec<Option<Vec<f32>>> = hashes.iter().map(|h| cached.get(h).cloned()).collect();

		let miss_indices: Vec<usize> = vectors.iter().enumerate().filter(|(_, v)| v.is_none()).map(|(i, _)| i).collect();
		if !miss_indices.is_empty() {
			let miss_texts: Vec<String> = miss_indices.iter().map(|&i| chunks[i].content.clone()).collect();
			let batch_size = self.config.embedding.batch_size.max(1);
			let mut embedded = Vec::with_capacity(miss_texts.len());
			for batch in miss_texts.chunks(batch_size) {
				embedded.extend(self.embedder.embed(batch, EmbedKind::Passage).await);
			}

			let mut seen = HashSet::new();
			let mut cache_hashes = Vec::new();
			let mut cache_vectors = Vec::new();
			for (pos, &idx) in miss_indices.iter().enumerate() {
				let vector = embedded.get(pos).cloned().unwrap_or_default();
				vectors[idx] = Some(vector.clone());
				if seen.insert(hashes[idx].clone()) {
					cache_hashes.push(hashes[idx].clone());
					cache_vectors.push(vector);
				}
			}
			if let Err(e) = self.store.cache_embeddings(&cache_hashes, &cache_vectors).await {
				tracing::error!("failed to cache embeddings for {}: {}", relative, e);
			}
		}

		let final_vectors: Vec<Vec<f32>> = vectors.into_iter().map(|v| v.unwrap_or_default()).collect();
		let was_known = root.indexed_files.read().contains_key(&relative);

		if was_known {
			let branch = root.current_branch();
			match self.store.delete_file_chunks(&root.path, &branch, &relative).await {
				Ok(old_count) => {
					let mut stats = root.stats.write();
					stats.chunks_created = stats.chunks_created.saturating_sub(old_count);
				}
				Err(e) => {
					tracing::error!("delete_file_chunks failed for {}: {}", relative, e);
					root.stats.write().errors += 1;
				}
			}
		}

		let branch = root.current_branch();
		if let Err(e) = self.store.add_chunks(&root.path, &branch, &relative, &new_hash, mtime, size, &chunks, &final_vectors).await {
			tracing::error!("add_chunks failed for {}: {}", relative, e);
			root.stats.write().errors += 1;
			return;
		}

		root.indexed_files.write().insert(relative, FileFingerprint { hash: new_hash, mtime, size });
		let mut stats = root.stats.write();
		stats.chunks_created += chunks.len() as u64;
		stats.chunks_embedded += miss_indices.len() as u64;
		if !was_known {
			stats.files_indexed += 1;
		}
	}

	async fn delete_file(&self, root: &Arc<RootState>, absolute_path: &Path) {
		let relative = metadata_cache::normalize_key(&root.path, absolute_path);
		let branch = root.current_branch();
		let count = self.store.delete_file_chunks(&root.path, &branch, &relative).await.unwrap_or(0);

		let was_known = root.indexed_files.write().remove(&relative).is_some();
		let mut stats = root.stats.write();
		stats.chunks_created = stats.chunks_created.saturating_sub(count);
		if was_known {
			stats.files_indexed = stats.files_indexed.saturating_sub(1);
			stats.files_scanned = stats.files_scanned.saturating_sub(1);
		}
	}

	async fn save_metadata_cache(&self, root: &Arc<RootState>) {
		let branch = root.current_branch();
		let mut cache = root.metadata_cache.read().clone();
		let mut branch_cache = cache.branch(&branch);
		branch_cache.indexed_files = root.indexed_files.read().clone();
		branch_cache.chunk_count = root.stats.read().chunks_created;
		branch_cache.ignore_files = root.ignore_fingerprints.read().clone();
		cache.set_branch(&branch, branch_cache);

		if let Err(e) = metadata_cache::save(&root.path, &cache) {
			tracing::error!("failed to save metadata cache for {}: {}", root.path.display(), e);
			return;
		}
		*root.metadata_cache.write() = cache;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Config;
	use crate::embedding::EmbedKind as EK;
	use tempfile::tempdir;

	struct FixedEmbedder {
		dimension: usize,
	}

	#[async_trait::async_trait]
	impl Embedder for FixedEmbedder {
		async fn embed(&self, texts: &[String], _kind: EK) -> Vec<Vec<f32>> {
			texts.iter().map(|t| vec![(t.len() % 7) as f32; self.dimension]).collect()
		}
		fn dimension(&self) -> Option<usize> {
			Some(self.dimension)
		}
	}

	async fn test_engine(data_dir: &Path) -> (Arc<IndexingEngine>, Arc<VectorStore>) {
		let store = Arc::new(VectorStore::open(data_dir, 8).await.unwrap());
		let embedder: Arc<dyn Embedder> = Arc::new(FixedEmbedder { dimension: 8 });
		let config = Config::default();
		let engine = IndexingEngine::new(Arc::clone(&store), embedder, config);
		(engine, store)
	}

	#[test]
	fn work_item_ordering_favors_lower_priority_then_earlier_sequence() {
		let mut heap = BinaryHeap::new();
		heap.push(WorkItem { priority: 2, sequence: 0, root: PathBuf::new(), file: PathBuf::new(), kind: WorkKind::BulkInitialScan });
		heap.push(WorkItem { priority: 0, sequence: 5, root: PathBuf::new(), file: PathBuf::new(), kind: WorkKind::Modified });
		heap.push(WorkItem { priority: 0, sequence: 1, root: PathBuf::new(), file: PathBuf::new(), kind: WorkKind::Modified });
		heap.push(WorkItem { priority: 1, sequence: 2, root: PathBuf::new(), file: PathBuf::new(), kind: WorkKind::Created });

		let order: Vec<(u8, u64)> = std::iter::from_fn(|| heap.pop().map(|i| (i.priority, i.sequence))).collect();
		assert_eq!(order, vec![(0, 1), (0, 5), (1, 2), (2, 0)]);
	}

	#[tokio::test]
	async fn add_root_then_search_finds_the_file() {
		let data_dir = tempdir().unwrap();
		let root_dir = tempdir().unwrap();
		std::fs::write(root_dir.path().join("a.py"), "def add(a, b):\n    return a + b\n").unwrap();

		let (engine, store) = test_engine(data_dir.path()).await;
		engine.start();
		engine.add_root(root_dir.path().to_path_buf()).await.unwrap();

		let mut found = false;
		for _ in 0..200 {
			tokio::time::sleep(Duration::from_millis(25)).await;
			let count = store.get_branch_chunk_count(root_dir.path(), "no-git").await.unwrap_or(0);
			if count > 0 {
				found = true;
				break;
			}
		}
		assert!(found, "file was never indexed within the timeout");
		engine.stop().await;
	}

	#[tokio::test]
	async fn pause_root_is_idempotent_for_unknown_path() {
		let data_dir = tempdir().unwrap();
		let (engine, _store) = test_engine(data_dir.path()).await;
		assert!(!engine.pause_root(Path::new("/nonexistent")));
		assert!(!engine.resume_root(Path::new("/nonexistent")));
	}

	#[tokio::test]
	async fn get_status_reports_zero_roots_initially() {
		let data_dir = tempdir().unwrap();
		let (engine, _store) = test_engine(data_dir.path()).await;
		assert!(engine.get_status(None).is_empty());
	}
}
