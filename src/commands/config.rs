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

use anyhow::Result;
use clap::{Args, Subcommand};

use fskb_indexer::config::Config;

#[derive(Args)]
pub struct ConfigArgs {
	#[command(subcommand)]
	pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
	/// Print the resolved configuration as TOML
	Show,
	/// Print the path to the on-disk config file
	Path,
	/// Add a directory to the configured root list
	AddRoot {
		path: PathBuf,
	},
	/// Remove a directory from the configured root list
	RemoveRoot {
		path: PathBuf,
	},
	/// List the configured roots
	ListRoots,
}

pub fn execute(mut config: Config, args: &ConfigArgs) -> Result<()> {
	match &args.action {
		ConfigAction::Show => {
			println!("{}", toml::to_string_pretty(&config)?);
		}
		ConfigAction::Path => {
			println!("{}", Config::get_system_config_path()?.display());
		}
		ConfigAction::AddRoot { path } => {
			let path = path.canonicalize().unwrap_or_else(|_| path.clone());
			if config.add_root(path.clone()) {
				config.save()?;
				println!("Added root {}", path.display());
			} else {
				println!("Root {} is already configured", path.display());
			}
		}
		ConfigAction::RemoveRoot { path } => {
			let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
			if config.remove_root(&canonical) {
				config.save()?;
				println!("Removed root {}", canonical.display());
			} else {
				println!("Root {} was not configured", canonical.display());
			}
		}
		ConfigAction::ListRoots => {
			if config.roots.is_empty() {
				println!("No roots configured.");
			} else {
				for root in &config.roots {
					println!("{}", root.display());
				}
			}
		}
	}
	Ok(())
}
