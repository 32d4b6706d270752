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

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use fskb_indexer::config::Config;
use fskb_indexer::embedding::{create_embedder, Embedder};
use fskb_indexer::engine::IndexingEngine;
use fskb_indexer::store::VectorStore;

#[derive(Args, Debug)]
pub struct WatchArgs {
	/// Directory to watch; defaults to the current directory
	pub root: Option<PathBuf>,

	/// Drop the interactive stderr log layer; the daily file log still runs
	#[arg(long, short)]
	pub quiet: bool,

	/// Print an indexing status line every N seconds (0 disables)
	#[arg(long, default_value_t = 10)]
	pub status_interval_secs: u64,
}

/// Start the indexing engine on one root and block until Ctrl+C.
pub async fn execute(config: &Config, args: &WatchArgs) -> Result<()> {
	let root = args.root.clone().unwrap_or(std::env::current_dir()?);
	let root = root.canonicalize().unwrap_or(root);

	let embedder = create_embedder(&config.embedding)?;
	let embedder: Arc<dyn Embedder> = Arc::from(embedder);
	let dimension = embedder.dimension().unwrap_or(768);

	let data_dir = config.storage.data_dir()?.join("lancedb");
	let store = Arc::new(VectorStore::open(&data_dir, dimension).await?);

	let engine = IndexingEngine::new(store, embedder, config.clone());
	engine.start();
	engine.add_root(root.clone()).await?;

	tracing::info!("watching {}", root.display());
	if !args.quiet {
		eprintln!("Watching {} (press Ctrl+C to stop)", root.display());
	}

	let ctrl_c = tokio::signal::ctrl_c();
	tokio::pin!(ctrl_c);

	if args.status_interval_secs > 0 {
		let mut interval = tokio::time::interval(Duration::from_secs(args.status_interval_secs));
		interval.tick().await; // first tick fires immediately; skip it
		loop {
			tokio::select! {
				_ = interval.tick() => {
					for status in engine.get_status(Some(&root)) {
						tracing::info!(
							branch = %status.branch,
							files_scanned = status.files_scanned,
							files_indexed = status.files_indexed,
							chunks_created = status.chunks_created,
							queue_size = status.queue_size,
							"indexing status"
						);
						if !args.quiet {
							eprintln!(
								"[{}] {}/{} files indexed, {} chunks, queue={}",
								status.branch, status.files_indexed, status.files_scanned, status.chunks_created, status.queue_size
							);
						}
					}
				}
				_ = &mut ctrl_c => break,
			}
		}
	} else {
		ctrl_c.await?;
	}

	tracing::info!("shutting down");
	engine.stop().await;
	Ok(())
}
