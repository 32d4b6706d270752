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

//! Embedder (§4.6): a capability interface over two concrete implementations,
//! a local in-process model and a uniform remote HTTP provider wrapper.

pub mod local;
pub mod remote;

use anyhow::Result;

use crate::config::{EmbeddingConfig, EmbeddingProvider as ProviderKind};
use crate::embedding::types::EmbedKind;

/// Capability interface every embedding backend implements. All failures
/// degrade to zero vectors of the correct dimension (§4.6 Failure modes); the
/// caller is responsible for recording the error.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
	async fn embed(&self, texts: &[String], kind: EmbedKind) -> Vec<Vec<f32>>;
	fn dimension(&self) -> Option<usize>;
}

pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
	match config.provider {
		ProviderKind::Local => Ok(Box::new(local::LocalEmbedder::new(&config.model)?)),
		_ => Ok(Box::new(remote::RemoteEmbedder::new(config.clone()))),
	}
}
