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

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::constants::DEFAULT_SEPARATORS;
use crate::storage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
	Local,
	OpenAi,
	Voyage,
	Cohere,
	Google,
	Anthropic,
}

impl Default for EmbeddingProvider {
	fn default() -> Self {
		Self::Local
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
	pub provider: EmbeddingProvider,
	pub model: String,
	#[serde(default)]
	pub api_key: Option<String>,
	#[serde(default = "default_batch_size")]
	pub batch_size: usize,
}

fn default_batch_size() -> usize {
	8
}

impl Default for EmbeddingConfig {
	fn default() -> Self {
		Self {
			provider: EmbeddingProvider::Local,
			model: "jinaai/jina-embeddings-v2-base-code".to_string(),
			api_key: None,
			batch_size: default_batch_size(),
		}
	}
}

impl EmbeddingConfig {
	/// Environment variable name consulted when no `api_key` is configured and a
	/// remote provider is selected, e.g. `VOYAGE_API_KEY`.
	pub fn env_var_name(&self) -> Option<&'static str> {
		match self.provider {
			EmbeddingProvider::Local => None,
			EmbeddingProvider::OpenAi => Some("OPENAI_API_KEY"),
			EmbeddingProvider::Voyage => Some("VOYAGE_API_KEY"),
			EmbeddingProvider::Cohere => Some("COHERE_API_KEY"),
			EmbeddingProvider::Google => Some("GOOGLE_API_KEY"),
			EmbeddingProvider::Anthropic => Some("ANTHROPIC_API_KEY"),
		}
	}

	/// Resolve the API key: explicit config value first, then the provider's env var.
	pub fn resolve_api_key(&self) -> Option<String> {
		self.api_key
			.clone()
			.or_else(|| self.env_var_name().and_then(|name| std::env::var(name).ok()))
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
	#[serde(default = "default_chunk_size")]
	pub chunk_size: usize,
	#[serde(default = "default_chunk_overlap")]
	pub chunk_overlap: usize,
	#[serde(default = "default_separators")]
	pub separators: Vec<String>,
}

fn default_chunk_size() -> usize {
	3000
}
fn default_chunk_overlap() -> usize {
	500
}
fn default_separators() -> Vec<String> {
	DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect()
}

impl Default for ChunkingConfig {
	fn default() -> Self {
		Self {
			chunk_size: default_chunk_size(),
			chunk_overlap: default_chunk_overlap(),
			separators: default_separators(),
		}
	}
}

impl ChunkingConfig {
	pub fn validate(&self) -> Result<()> {
		if !(100..=8000).contains(&self.chunk_size) {
			anyhow::bail!("chunking.chunk_size must be within 100..=8000, got {}", self.chunk_size);
		}
		if self.chunk_overlap > 2000 {
			anyhow::bail!("chunking.chunk_overlap must be within 0..=2000, got {}", self.chunk_overlap);
		}
		if self.chunk_overlap >= self.chunk_size {
			anyhow::bail!(
				"chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
				self.chunk_overlap,
				self.chunk_size
			);
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
	#[serde(default = "default_max_cpu_percent")]
	pub max_cpu_percent: f32,
	#[serde(default = "default_max_memory_mb")]
	pub max_memory_mb: u64,
	#[serde(default)]
	pub max_workers: Option<usize>,
	#[serde(default = "default_idle_timeout_seconds")]
	pub idle_timeout_seconds: u64,
	#[serde(default = "default_debounce_delay_ms")]
	pub debounce_delay_ms: u64,
}

fn default_max_cpu_percent() -> f32 {
	80.0
}
fn default_max_memory_mb() -> u64 {
	2048
}
fn default_idle_timeout_seconds() -> u64 {
	300
}
fn default_debounce_delay_ms() -> u64 {
	500
}

impl Default for ResourceConfig {
	fn default() -> Self {
		Self {
			max_cpu_percent: default_max_cpu_percent(),
			max_memory_mb: default_max_memory_mb(),
			max_workers: None,
			idle_timeout_seconds: default_idle_timeout_seconds(),
			debounce_delay_ms: default_debounce_delay_ms(),
		}
	}
}

impl ResourceConfig {
	pub fn validate(&self) -> Result<()> {
		if !(1.0..=100.0).contains(&self.max_cpu_percent) {
			anyhow::bail!("resource.max_cpu_percent must be within 1..=100");
		}
		if self.max_memory_mb < 256 {
			anyhow::bail!("resource.max_memory_mb must be >= 256");
		}
		if !(100..=5000).contains(&self.debounce_delay_ms) {
			anyhow::bail!("resource.debounce_delay_ms must be within 100..=5000");
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
	#[serde(default)]
	pub text_extensions: Vec<String>,
	#[serde(default = "default_max_file_size_mb")]
	pub max_file_size_mb: u64,
	#[serde(default = "default_true")]
	pub respect_gitignore: bool,
	#[serde(default = "default_true")]
	pub use_fskbignore: bool,
	#[serde(default)]
	pub skip_directories: Vec<String>,
}

fn default_true() -> bool {
	true
}
fn default_max_file_size_mb() -> u64 {
	10
}

impl Default for IndexingConfig {
	fn default() -> Self {
		Self {
			text_extensions: crate::constants::TEXT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
			max_file_size_mb: default_max_file_size_mb(),
			respect_gitignore: true,
			use_fskbignore: true,
			skip_directories: vec![],
		}
	}
}

impl IndexingConfig {
	pub fn validate(&self) -> Result<()> {
		if !(1..=100).contains(&self.max_file_size_mb) {
			anyhow::bail!("indexing.max_file_size_mb must be within 1..=100");
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
	#[serde(default = "default_top_k")]
	pub top_k: usize,
	#[serde(default = "default_min_similarity")]
	pub min_similarity: f32,
	#[serde(default = "default_context_lines")]
	pub context_lines_before: usize,
	#[serde(default = "default_context_lines")]
	pub context_lines_after: usize,
}

fn default_top_k() -> usize {
	10
}
fn default_min_similarity() -> f32 {
	0.0
}
fn default_context_lines() -> usize {
	2
}

impl Default for SearchConfig {
	fn default() -> Self {
		Self {
			top_k: default_top_k(),
			min_similarity: default_min_similarity(),
			context_lines_before: default_context_lines(),
			context_lines_after: default_context_lines(),
		}
	}
}

impl SearchConfig {
	pub fn validate(&self) -> Result<()> {
		if !(1..=100).contains(&self.top_k) {
			anyhow::bail!("search.top_k must be within 1..=100");
		}
		if !(0.0..=1.0).contains(&self.min_similarity) {
			anyhow::bail!("search.min_similarity must be within 0..=1");
		}
		if self.context_lines_before > 10 || self.context_lines_after > 10 {
			anyhow::bail!("search.context_lines_{{before,after}} must be within 0..=10");
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
	#[serde(default)]
	pub data_dir: Option<PathBuf>,
	#[serde(default)]
	pub log_dir: Option<PathBuf>,
	#[serde(default)]
	pub config_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			data_dir: None,
			log_dir: None,
			config_dir: None,
		}
	}
}

impl StorageConfig {
	pub fn data_dir(&self) -> Result<PathBuf> {
		match &self.data_dir {
			Some(p) => Ok(p.clone()),
			None => storage::get_system_storage_dir(),
		}
	}

	pub fn log_dir(&self) -> Result<PathBuf> {
		match &self.log_dir {
			Some(p) => Ok(p.clone()),
			None => Ok(storage::get_system_cache_dir()?.join("logs")),
		}
	}

	pub fn config_dir(&self) -> Result<PathBuf> {
		match &self.config_dir {
			Some(p) => Ok(p.clone()),
			None => storage::get_system_storage_dir(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	#[serde(default = "default_version")]
	pub version: u32,

	#[serde(default)]
	pub embedding: EmbeddingConfig,

	#[serde(default)]
	pub chunking: ChunkingConfig,

	#[serde(default)]
	pub resource: ResourceConfig,

	#[serde(default)]
	pub indexing: IndexingConfig,

	#[serde(default)]
	pub search: SearchConfig,

	#[serde(default)]
	pub storage: StorageConfig,

	#[serde(default)]
	pub roots: Vec<PathBuf>,
}

fn default_version() -> u32 {
	1
}

impl Default for Config {
	fn default() -> Self {
		Self {
			version: default_version(),
			embedding: EmbeddingConfig::default(),
			chunking: ChunkingConfig::default(),
			resource: ResourceConfig::default(),
			indexing: IndexingConfig::default(),
			search: SearchConfig::default(),
			storage: StorageConfig::default(),
			roots: vec![],
		}
	}
}

impl Config {
	pub fn load() -> Result<Self> {
		let config_path = Self::get_system_config_path()?;

		let config: Config = if config_path.exists() {
			let content = fs::read_to_string(&config_path)?;
			toml::from_str(&content)?
		} else {
			let template_config = Self::load_from_template()?;

			if let Some(parent) = config_path.parent() {
				if !parent.exists() {
					fs::create_dir_all(parent)?;
				}
			}

			let toml_content = toml::to_string_pretty(&template_config)?;
			fs::write(&config_path, toml_content)?;
			template_config
		};

		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<()> {
		self.chunking.validate()?;
		self.resource.validate()?;
		self.indexing.validate()?;
		self.search.validate()?;
		Ok(())
	}

	fn load_from_template() -> Result<Self> {
		let template_content = Self::get_default_template_content()?;
		let config: Config = toml::from_str(&template_content)?;
		Ok(config)
	}

	fn get_default_template_content() -> Result<String> {
		let template_path = std::path::Path::new("config-templates/default.toml");
		if template_path.exists() {
			return Ok(fs::read_to_string(template_path)?);
		}
		Ok(include_str!("../config-templates/default.toml").to_string())
	}

	pub fn save(&self) -> Result<()> {
		let config_path = Self::get_system_config_path()?;

		if let Some(parent) = config_path.parent() {
			if !parent.exists() {
				fs::create_dir_all(parent)?;
			}
		}

		let toml_content = toml::to_string_pretty(self)?;
		fs::write(config_path, toml_content)?;
		Ok(())
	}

	/// Get the system-wide config file path, e.g. `~/.local/share/fskb-indexer/config.toml`.
	pub fn get_system_config_path() -> Result<PathBuf> {
		let system_storage = storage::get_system_storage_dir()?;
		Ok(system_storage.join("config.toml"))
	}

	pub fn add_root(&mut self, path: PathBuf) -> bool {
		if self.roots.contains(&path) {
			return false;
		}
		self.roots.push(path);
		true
	}

	pub fn remove_root(&mut self, path: &std::path::Path) -> bool {
		let before = self.roots.len();
		self.roots.retain(|p| p != path);
		self.roots.len() != before
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_config() {
		let config = Config::default();
		assert_eq!(config.version, 1);
		assert_eq!(config.embedding.provider, EmbeddingProvider::Local);
		assert_eq!(config.chunking.chunk_size, 3000);
		assert_eq!(config.chunking.chunk_overlap, 500);
		assert_eq!(config.search.top_k, 10);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_chunking_overlap_must_be_smaller_than_size() {
		let mut chunking = ChunkingConfig::default();
		chunking.chunk_overlap = chunking.chunk_size;
		assert!(chunking.validate().is_err());
	}

	#[test]
	fn test_add_remove_root() {
		let mut config = Config::default();
		let path = PathBuf::from("/tmp/project");
		assert!(config.add_root(path.clone()));
		assert!(!config.add_root(path.clone()));
		assert!(config.remove_root(&path));
		assert!(!config.remove_root(&path));
	}
}
