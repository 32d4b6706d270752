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

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use fskb_indexer::branch;
use fskb_indexer::config::Config;
use fskb_indexer::embedding::{create_embedder, Embedder};
use fskb_indexer::query::{QueryEngine, SearchResult};
use fskb_indexer::store::VectorStore;

#[derive(Debug, Args)]
pub struct SearchArgs {
	/// The natural-language query
	pub query: String,

	/// Directory to search; defaults to the current directory
	#[arg(long)]
	pub root: Option<PathBuf>,

	/// Branch to search; defaults to the root's current git branch
	#[arg(long)]
	pub branch: Option<String>,

	/// Search every branch the index has chunks for instead of just one
	#[arg(long)]
	pub all_branches: bool,

	/// Maximum number of results
	#[arg(short = 'k', long)]
	pub top_k: Option<usize>,

	/// Drop the surrounding-lines context from the output
	#[arg(long)]
	pub no_context: bool,

	/// Emit JSON instead of the human-readable listing
	#[arg(long)]
	pub json: bool,
}

pub async fn execute(config: &Config, args: &SearchArgs) -> Result<()> {
	let root = args.root.clone().unwrap_or(std::env::current_dir()?);
	let root = root.canonicalize().unwrap_or(root);

	let embedder = create_embedder(&config.embedding)?;
	let embedder: Arc<dyn Embedder> = Arc::from(embedder);
	let dimension = embedder.dimension().unwrap_or(768);

	let data_dir = config.storage.data_dir()?.join("lancedb");
	let store = Arc::new(VectorStore::open(&data_dir, dimension).await?);
	let engine = QueryEngine::new(store, embedder, config.search.clone());

	if args.all_branches {
		let by_branch = engine.search_all_branches(&args.query, &root, args.top_k).await;
		if args.json {
			print_json_all(&by_branch)?;
		} else {
			print_human_all(&by_branch, args.no_context);
		}
		return Ok(());
	}

	let branch = args.branch.clone().unwrap_or_else(|| branch::current_branch(&root));
	let results = engine.search(&args.query, &root, &branch, args.top_k, !args.no_context).await;

	if args.json {
		println!("{}", serde_json::to_string_pretty(&ResultsJson::from(&results))?);
	} else {
		print_human(&branch, &results, args.no_context);
	}

	Ok(())
}

#[derive(serde::Serialize)]
struct ResultsJson<'a> {
	results: Vec<ResultJson<'a>>,
}

#[derive(serde::Serialize)]
struct ResultJson<'a> {
	file_path: &'a str,
	line_start: usize,
	line_end: usize,
	score: f32,
	language: &'a str,
	content: &'a str,
}

impl<'a> From<&'a [SearchResult]> for ResultsJson<'a> {
	fn from(results: &'a [SearchResult]) -> Self {
		Self {
			results: results
				.iter()
				.map(|r| ResultJson {
					file_path: &r.file_path,
					line_start: r.line_start,
					line_end: r.line_end,
					score: r.score,
					language: &r.language,
					content: &r.content,
				})
				.collect(),
		}
	}
}

fn print_json_all(by_branch: &HashMap<String, Vec<SearchResult>>) -> Result<()> {
	let mut out = std::collections::BTreeMap::new();
	for (branch, results) in by_branch {
		out.insert(branch.clone(), ResultsJson::from(results.as_slice()));
	}
	println!("{}", serde_json::to_string_pretty(&out)?);
	Ok(())
}

fn print_human(branch: &str, results: &[SearchResult], no_context: bool) {
	if results.is_empty() {
		println!("No results found on branch '{}'.", branch);
		return;
	}
	println!("Found {} result(s) on branch '{}':\n", results.len(), branch);
	for (idx, result) in results.iter().enumerate() {
		print_result(idx, result, no_context);
	}
}

fn print_human_all(by_branch: &HashMap<String, Vec<SearchResult>>, no_context: bool) {
	let mut branches: Vec<&String> = by_branch.keys().collect();
	branches.sort();
	if branches.is_empty() {
		println!("No indexed branches found.");
		return;
	}
	for branch in branches {
		let results = &by_branch[branch];
		println!("=== branch: {} ({} result(s)) ===\n", branch, results.len());
		for (idx, result) in results.iter().enumerate() {
			print_result(idx, result, no_context);
		}
		println!();
	}
}

fn print_result(idx: usize, result: &SearchResult, no_context: bool) {
	println!(
		"╔══ {}. {} [{}:{}] (score {:.3}, {}) ══",
		idx + 1,
		result.file_path,
		result.line_start,
		result.line_end,
		result.score,
		result.language
	);
	if !no_context {
		if let Some(before) = &result.context_before {
			for line in before {
				println!("║ {}", line);
			}
		}
	}
	for (i, line) in result.content.lines().enumerate() {
		println!("║ {:>5} │ {}", result.line_start + i, line);
	}
	if !no_context {
		if let Some(after) = &result.context_after {
			for line in after {
				println!("║ {}", line);
			}
		}
	}
	println!("╚══════════════════════════════════\n");
}
