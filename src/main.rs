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

// fskb-indexer - local, always-on semantic code search index
// Copyright (c) 2025 Muvon Un Limited

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

use fskb_indexer::Config;

mod commands;

#[derive(Parser)]
#[command(name = "fskb-indexer")]
#[command(version = "0.1.0")]
#[command(about = "Local, always-on semantic code search index")]
struct FskbArgs {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Watch a directory and keep its semantic index up to date
	Watch(commands::WatchArgs),

	/// Search a directory's semantic index with a natural language query
	Search(commands::SearchArgs),

	/// Inspect or edit the on-disk configuration
	Config(commands::ConfigArgs),

	/// Generate shell completion scripts
	Completion {
		/// The shell to generate completion for
		#[arg(value_enum)]
		shell: Shell,
	},
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
	let args = FskbArgs::parse();

	// Handle the Completion command separately (doesn't need config or a store)
	if let Commands::Completion { shell } = &args.command {
		let mut app = FskbArgs::command();
		let name = app.get_name().to_string();
		generate(*shell, &mut app, name, &mut std::io::stdout());
		return Ok(());
	}

	let config = Config::load()?;

	// Handle the Config command separately (doesn't need logging or a store)
	if let Commands::Config(config_args) = &args.command {
		return commands::config::execute(config, config_args);
	}

	let log_dir = config.storage.log_dir()?;
	let quiet = matches!(&args.command, Commands::Watch(w) if w.quiet);
	fskb_indexer::logging::init(&log_dir, false, quiet)?;

	match &args.command {
		Commands::Watch(watch_args) => commands::watch::execute(&config, watch_args).await?,
		Commands::Search(search_args) => commands::search::execute(&config, search_args).await?,
		Commands::Config(_) => unreachable!(), // Already handled above
		Commands::Completion { .. } => unreachable!(), // Already handled above
	}

	Ok(())
}
