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

//! Process-wide logging setup (§A.2): a daily-rotating JSON file layer plus,
//! when running attached to a terminal, a human-readable stderr layer. The
//! `RUST_LOG` environment variable overrides the default filter.

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt::Layer, prelude::*, registry::Registry, EnvFilter};

/// Initialize the global subscriber. `verbose` raises the default filter from
/// `info` to `debug` when `RUST_LOG` is unset; `quiet` drops the stderr layer
/// so only the file layer runs (used by `watch --quiet`, e.g. under a
/// process supervisor).
pub fn init(log_dir: &Path, verbose: bool, quiet: bool) -> anyhow::Result<()> {
	std::fs::create_dir_all(log_dir)?;

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

	let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "fskb-indexer.log");
	let file_layer = Layer::new()
		.with_writer(file_appender)
		.with_ansi(false)
		.with_target(true)
		.with_thread_ids(true)
		.json();

	let registry = Registry::default().with(env_filter).with(file_layer);

	if quiet {
		registry.init();
	} else {
		let console_layer = Layer::new().with_writer(std::io::stderr).with_ansi(true).with_target(false);
		registry.with(console_layer).init();
	}

	Ok(())
}
