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

//! Directory hash tree (§4.2) used to diff an initial scan against a previous
//! snapshot in O(changed subtrees). Not on the critical path of deciding what
//! to (re-)index (that ladder is mtime/size/hash, §4.10 step 5); used for a
//! debug-level change-summary log line during scans.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub enum MerkleNode {
	File {
		hash: String,
	},
	Dir {
		hash: String,
		children: BTreeMap<String, MerkleNode>,
	},
}

impl MerkleNode {
	pub fn hash(&self) -> &str {
		match self {
			MerkleNode::File { hash } => hash,
			MerkleNode::Dir { hash, .. } => hash,
		}
	}
}

fn hash_dir(children: &BTreeMap<String, MerkleNode>) -> String {
	let mut hasher = Sha256::new();
	for (name, node) in children {
		hasher.update(format!("{}:{}", name, node.hash()).as_bytes());
	}
	format!("{:x}", hasher.finalize())
}

/// Build a directory hash tree from a flat set of workspace-relative paths
/// (forward-slash separated) and their content hashes.
pub fn build(file_hashes: &BTreeMap<String, String>) -> MerkleNode {
	let mut root: BTreeMap<String, MerkleNode> = BTreeMap::new();

	for (path, hash) in file_hashes {
		insert(&mut root, path.split('/').collect::<Vec<_>>().as_slice(), hash);
	}

	MerkleNode::Dir {
		hash: hash_dir(&root),
		children: root,
	}
}

fn insert(level: &mut BTreeMap<String, MerkleNode>, parts: &[&str], file_hash: &str) {
	match parts {
		[] => {}
		[name] => {
			level.insert((*name).to_string(), MerkleNode::File { hash: file_hash.to_string() });
		}
		[dir, rest @ ..] => {
			let entry = level.entry((*dir).to_string()).or_insert_with(|| MerkleNode::Dir {
				hash: String::new(),
				children: BTreeMap::new(),
			});
			if let MerkleNode::Dir { children, .. } = entry {
				insert(children, rest, file_hash);
				let new_hash = hash_dir(children);
				*entry = MerkleNode::Dir { hash: new_hash, children: std::mem::take(children) };
			}
		}
	}
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DirDiff {
	pub added_dirs: Vec<String>,
	pub modified_dirs: Vec<String>,
	pub deleted_dirs: Vec<String>,
}

/// Compare two trees and report directory-level diffs.
pub fn compare(old: &MerkleNode, new: &MerkleNode) -> DirDiff {
	let mut diff = DirDiff::default();
	compare_rec(old, new, "", &mut diff);
	diff
}

fn compare_rec(old: &MerkleNode, new: &MerkleNode, prefix: &str, diff: &mut DirDiff) {
	let (old_children, new_children) = match (old, new) {
		(MerkleNode::Dir { children: o, .. }, MerkleNode::Dir { children: n, .. }) => (o, n),
		_ => return,
	};

	if old.hash() == new.hash() {
		return;
	}

	for (name, new_node) in new_children {
		let path = if prefix.is_empty() { name.clone() } else { format!("{}/{}", prefix, name) };
		match old_children.get(name) {
			None => {
				if matches!(new_node, MerkleNode::Dir { .. }) {
					diff.added_dirs.push(path);
				}
			}
			Some(old_node) => {
				if old_node.hash() != new_node.hash() {
					if let (MerkleNode::Dir { .. }, MerkleNode::Dir { .. }) = (old_node, new_node) {
						diff.modified_dirs.push(path.clone());
						compare_rec(old_node, new_node, &path, diff);
					}
				}
			}
		}
	}

	for (name, old_node) in old_children {
		let path = if prefix.is_empty() { name.clone() } else { format!("{}/{}", prefix, name) };
		if !new_children.contains_key(name) && matches!(old_node, MerkleNode::Dir { .. }) {
			diff.deleted_dirs.push(path);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn hashes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
		pairs.iter().map(|(p, h)| (p.to_string(), h.to_string())).collect()
	}

	#[test]
	fn identical_trees_have_identical_root_hash() {
		let a = build(&hashes(&[("src/a.rs", "h1"), ("src/b.rs", "h2")]));
		let b = build(&hashes(&[("src/a.rs", "h1"), ("src/b.rs", "h2")]));
		assert_eq!(a.hash(), b.hash());
	}

	#[test]
	fn changing_one_file_changes_root_and_that_subtree_only() {
		let a = build(&hashes(&[("src/a.rs", "h1"), ("lib/b.rs", "h2")]));
		let b = build(&hashes(&[("src/a.rs", "h1-changed"), ("lib/b.rs", "h2")]));
		assert_ne!(a.hash(), b.hash());

		let diff = compare(&a, &b);
		assert_eq!(diff.modified_dirs, vec!["src".to_string()]);
		assert!(diff.added_dirs.is_empty());
		assert!(diff.deleted_dirs.is_empty());
	}

	#[test]
	fn added_and_deleted_directories_are_reported() {
		let a = build(&hashes(&[("keep/a.rs", "h1"), ("gone/b.rs", "h2")]));
		let b = build(&hashes(&[("keep/a.rs", "h1"), ("fresh/c.rs", "h3")]));
		let diff = compare(&a, &b);
		assert_eq!(diff.added_dirs, vec!["fresh".to_string()]);
		assert_eq!(diff.deleted_dirs, vec!["gone".to_string()]);
	}
}
