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

//! Branch Tracker (§4.4): reports the workspace's current branch/commit and
//! notifies on change. Implemented by shelling out to the `git` CLI, consistent
//! with how the rest of this codebase talks to git, rather than linking a git
//! library.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{BRANCH_POLL_INTERVAL_SECS, NO_GIT_BRANCH};

fn run_git(root: &Path, args: &[&str]) -> Option<String> {
	let output = Command::new("git").arg("-C").arg(root).args(args).output().ok()?;
	if !output.status.success() {
		return None;
	}
	String::from_utf8(output.stdout).ok().map(|s| s.trim().to_string())
}

fn is_repository(root: &Path) -> bool {
	run_git(root, &["rev-parse", "--is-inside-work-tree"]).as_deref() == Some("true")
}

/// Resolve the current branch name. Detached HEAD is reported as
/// `detached-<first-8-of-sha>`; a non-repository as `no-git`.
pub fn current_branch(root: &Path) -> String {
	if !is_repository(root) {
		return NO_GIT_BRANCH.to_string();
	}
	match run_git(root, &["rev-parse", "--abbrev-ref", "HEAD"]) {
		Some(name) if name != "HEAD" => name,
		_ => match run_git(root, &["rev-parse", "HEAD"]) {
			Some(sha) if sha.len() >= 8 => format!("detached-{}", &sha[..8]),
			_ => NO_GIT_BRANCH.to_string(),
		},
	}
}

/// Resolve the current commit sha, or `None` if not a repository.
pub fn current_commit(root: &Path) -> Option<String> {
	if !is_repository(root) {
		return None;
	}
	run_git(root, &["rev-parse", "HEAD"])
}

/// Background-polled tracker for one root's current branch.
pub struct BranchTracker {
	root: PathBuf,
	current: RwLock<String>,
	running: Arc<AtomicBool>,
}

impl BranchTracker {
	pub fn new(root: &Path) -> Self {
		Self {
			root: root.to_path_buf(),
			current: RwLock::new(current_branch(root)),
			running: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn current_branch(&self) -> String {
		self.current.read().clone()
	}

	pub fn current_commit(&self) -> Option<String> {
		current_commit(&self.root)
	}

	/// Spawn the polling loop. A no-op (but harmless) loop if the root is not a
	/// repository: the sentinel never changes, so `on_change` is simply never
	/// called, matching "disables the loop" in spirit without special-casing
	/// cancellation.
	pub fn spawn<F>(self: &Arc<Self>, on_change: F) -> tokio::task::JoinHandle<()>
	where
		F: Fn(String) + Send + 'static,
	{
		let this = Arc::clone(self);
		this.running.store(true, Ordering::SeqCst);
		tokio::spawn(async move {
			let mut interval = tokio::time::interval(Duration::from_secs(BRANCH_POLL_INTERVAL_SECS));
			while this.running.load(Ordering::SeqCst) {
				interval.tick().await;
				let observed = current_branch(&this.root);
				let changed = {
					let mut guard = this.current.write();
					if *guard != observed {
						*guard = observed.clone();
						true
					} else {
						false
					}
				};
				if changed {
					on_change(observed);
				}
			}
		})
	}

	pub fn stop(&self) {
		self.running.store(false, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::process::Command as StdCommand;
	use tempfile::tempdir;

	fn git(dir: &Path, args: &[&str]) {
		let status = StdCommand::new("git").arg("-C").arg(dir).args(args).status().unwrap();
		assert!(status.success(), "git {:?} failed", args);
	}

	#[test]
	fn non_git_directory_reports_sentinel() {
		let dir = tempdir().unwrap();
		assert_eq!(current_branch(dir.path()), NO_GIT_BRANCH);
		assert_eq!(current_commit(dir.path()), None);
	}

	#[test]
	fn git_repo_reports_branch_name() {
		let dir = tempdir().unwrap();
		git(dir.path(), &["init", "-q", "-b", "main"]);
		git(dir.path(), &["config", "user.email", "test@example.com"]);
		git(dir.path(), &["config", "user.name", "test"]);
		std::fs::write(dir.path().join("a.txt"), "hi").unwrap();
		git(dir.path(), &["add", "."]);
		git(dir.path(), &["commit", "-q", "-m", "init"]);

		assert_eq!(current_branch(dir.path()), "main");
		assert!(current_commit(dir.path()).is_some());
	}

	#[test]
	fn detached_head_reports_short_sha() {
		let dir = tempdir().unwrap();
		git(dir.path(), &["init", "-q", "-b", "main"]);
		git(dir.path(), &["config", "user.email", "test@example.com"]);
		git(dir.path(), &["config", "user.name", "test"]);
		std::fs::write(dir.path().join("a.txt"), "hi").unwrap();
		git(dir.path(), &["add", "."]);
		git(dir.path(), &["commit", "-q", "-m", "init"]);
		let sha = current_commit(dir.path()).unwrap();
		git(dir.path(), &["checkout", "-q", &sha]);

		let branch = current_branch(dir.path());
		assert!(branch.starts_with("detached-"));
		assert_eq!(branch, format!("detached-{}", &sha[..8]));
	}
}
