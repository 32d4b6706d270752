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

//! Application-wide constants

/// Embedding input type prefixes for the local model (manual injection, no input_type API)
pub const QUERY_PREFIX_NL2CODE: &str = "Represent this query for searching relevant code: ";
pub const QUERY_PREFIX_CODE2CODE: &str = "Represent this code for finding similar code: ";
pub const PASSAGE_PREFIX: &str = "Represent this code snippet for retrieval: ";

/// Name of the per-root metadata cache directory and file, relative to a root.
pub const METADATA_DIR: &str = ".fskb";
pub const METADATA_CACHE_FILE: &str = "metadata_cache.bin";

/// Name of the ignore file specific to this indexer, consulted in addition to `.gitignore`.
pub const FSKBIGNORE_FILE: &str = ".fskbignore";

/// Name of the global, cross-root embedding cache collection in the vector store.
pub const EMBEDDING_CACHE_COLLECTION: &str = "embedding_cache";

/// Sentinel branch name for a root that is not a git repository.
pub const NO_GIT_BRANCH: &str = "no-git";

/// Separators tried in priority order by the recursive character chunker.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// How often the branch tracker polls `git` for the current branch/commit.
pub const BRANCH_POLL_INTERVAL_SECS: u64 = 5;

/// How often the resource governor samples CPU/RSS.
pub const GOVERNOR_SAMPLE_INTERVAL_SECS: u64 = 2;

/// Bound on every cooperative yield so cancellation stays prompt.
pub const MAX_YIELD_MS: u64 = 500;

/// Size of sub-batches used when enqueuing an initial scan's work items, and
/// when batching `cleanup_orphaned_files` deletes.
pub const SCAN_ENQUEUE_BATCH_SIZE: usize = 100;
pub const ORPHAN_CLEANUP_BATCH_SIZE: usize = 100;

/// Save the metadata cache to disk every this-many successfully indexed files.
pub const METADATA_SAVE_EVERY_N_FILES: u64 = 50;

/// Worker dequeue timeout; also the responsiveness bound for `pause_root`.
pub const WORKER_DEQUEUE_TIMEOUT_SECS: u64 = 1;

/// Embedder per-batch timeouts (seconds): first batch pays model warm-up cost.
pub const EMBEDDER_FIRST_BATCH_TIMEOUT_SECS: u64 = 120;
pub const EMBEDDER_SUBSEQUENT_BATCH_TIMEOUT_SECS: u64 = 60;

/// Remote embedding provider retry policy.
pub const REMOTE_EMBEDDER_MAX_RETRIES: u32 = 3;

/// Shutdown bounds.
pub const SHUTDOWN_WORKER_WAIT_SECS: u64 = 5;
pub const SHUTDOWN_METADATA_SAVE_SECS: u64 = 5;

/// Text-file sniffing thresholds (§4.3).
pub const SNIFF_MAX_SIZE_BYTES: u64 = 100 * 1024;
pub const SNIFF_NUL_RATIO_REJECT: f64 = 0.05;
pub const SNIFF_CONTROL_RATIO_REJECT: f64 = 0.10;
pub const SNIFF_LATIN1_CONTROL_RATIO_REJECT: f64 = 0.15;

/// Built-in ignore patterns, always active regardless of `.gitignore`/`.fskbignore` contents.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
	".git/",
	"*.pyc",
	"__pycache__/",
	".DS_Store",
	"Thumbs.db",
	".fskb/",
	"node_modules/",
	".venv/",
	"venv/",
	"env/",
	"bin/",
	"obj/",
	".vs/",
	".vscode/",
	"*.min.js",
	"*.min.css",
	"*.min.js.map",
	"*.min.css.map",
	"*.map",
	".vitepress/cache/",
	".vitepress/dist/",
	"**/dist/**",
	"**/build/**",
	"**/.vitepress/dist/**",
	"**/.next/**",
	"**/.nuxt/**",
	"**/out/**",
];

/// Extensions recognized as text files without sniffing their content (§4.3 fast path).
pub const TEXT_EXTENSIONS: &[&str] = &[
	"rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "c", "h", "cpp", "cc", "hpp", "cs", "rb",
	"php", "swift", "kt", "scala", "sh", "bash", "zsh", "fish", "ps1", "sql", "html", "htm", "css",
	"scss", "sass", "less", "json", "yaml", "yml", "toml", "xml", "md", "mdx", "txt", "rst", "adoc",
	"vue", "svelte", "lua", "pl", "r", "dart", "ex", "exs", "erl", "hs", "clj", "cljs", "groovy",
	"gradle", "dockerfile", "makefile", "cmake", "ini", "cfg", "conf", "env", "proto", "graphql",
	"tf", "tfvars", "vim", "el", "zig", "nim", "v", "sol", "jl", "m", "mm",
];

/// Maps a file extension / suffix to a human-readable language label (§4.5).
/// Falls back to the suffix verbatim when not present here.
pub fn language_for_suffix(suffix: &str) -> String {
	let label = match suffix.to_lowercase().as_str() {
		"rs" => "rust",
		"py" => "python",
		"js" | "jsx" | "mjs" | "cjs" => "javascript",
		"ts" | "tsx" => "typescript",
		"go" => "go",
		"java" => "java",
		"c" | "h" => "c",
		"cpp" | "cc" | "cxx" | "hpp" | "hh" => "cpp",
		"cs" => "csharp",
		"rb" => "ruby",
		"php" => "php",
		"swift" => "swift",
		"kt" | "kts" => "kotlin",
		"scala" => "scala",
		"sh" | "bash" | "zsh" | "fish" => "shell",
		"ps1" => "powershell",
		"sql" => "sql",
		"html" | "htm" => "html",
		"css" => "css",
		"scss" | "sass" => "scss",
		"less" => "less",
		"json" => "json",
		"yaml" | "yml" => "yaml",
		"toml" => "toml",
		"xml" => "xml",
		"md" | "mdx" => "markdown",
		"vue" => "vue",
		"svelte" => "svelte",
		"lua" => "lua",
		"pl" => "perl",
		"r" => "r",
		"dart" => "dart",
		"ex" | "exs" => "elixir",
		"erl" => "erlang",
		"hs" => "haskell",
		"clj" | "cljs" => "clojure",
		"zig" => "zig",
		"nim" => "nim",
		_ => suffix,
	};
	label.to_string()
}
