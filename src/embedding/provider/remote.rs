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

//! Uniform remote embedding provider (§4.6): one retrying HTTP JSON client
//! behind the `openai`, `voyage`, `cohere`, `google`, `anthropic` provider
//! identities. The embedding dimension is probed on first successful response.

use parking_lot::RwLock;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::{EmbeddingConfig, EmbeddingProvider as ProviderKind};
use crate::constants::REMOTE_EMBEDDER_MAX_RETRIES;
use crate::embedding::types::EmbedKind;

use super::Embedder;

pub struct RemoteEmbedder {
	config: EmbeddingConfig,
	client: Client,
	dimension: RwLock<Option<usize>>,
}

impl RemoteEmbedder {
	pub fn new(config: EmbeddingConfig) -> Self {
		Self {
			config,
			client: Client::new(),
			dimension: RwLock::new(None),
		}
	}

	fn endpoint(&self) -> &'static str {
		match self.config.provider {
			ProviderKind::OpenAi => "https://api.openai.com/v1/embeddings",
			ProviderKind::Voyage => "https://api.voyageai.com/v1/embeddings",
			ProviderKind::Cohere => "https://api.cohere.ai/v1/embed",
			ProviderKind::Google => "https://generativelanguage.googleapis.com/v1beta/models/embedding-001:batchEmbedContents",
			ProviderKind::Anthropic => "https://api.anthropic.com/v1/embeddings",
			ProviderKind::Local => unreachable!("local provider does not go through RemoteEmbedder"),
		}
	}

	fn request_body(&self, texts: &[String], kind: EmbedKind) -> Value {
		let input_type = match kind {
			EmbedKind::Query => "query",
			EmbedKind::Passage => "document",
		};
		match self.config.provider {
			ProviderKind::Voyage => json!({ "input": texts, "model": self.config.model, "input_type": input_type }),
			ProviderKind::Cohere => json!({ "texts": texts, "model": self.config.model, "input_type": input_type }),
			ProviderKind::Google => json!({
				"requests": texts.iter().map(|t| json!({"model": self.config.model, "content": {"parts": [{"text": t}]}})).collect::<Vec<_>>(),
			}),
			_ => json!({ "input": texts, "model": self.config.model }),
		}
	}

	fn parse_vectors(&self, provider_response: &Value) -> Option<Vec<Vec<f32>>> {
		match self.config.provider {
			ProviderKind::Cohere => provider_response
				.get("embeddings")
				.and_then(|v| v.as_array())
				.map(|rows| rows.iter().map(parse_row).collect()),
			ProviderKind::Google => provider_response
				.get("embeddings")
				.and_then(|v| v.as_array())
				.map(|rows| {
					rows.iter()
						.map(|r| parse_row(r.get("values").unwrap_or(&Value::Null)))
						.collect()
				}),
			_ => provider_response
				.get("data")
				.and_then(|v| v.as_array())
				.map(|rows| rows.iter().map(|r| parse_row(r.get("embedding").unwrap_or(&Value::Null))).collect()),
		}
	}

	async fn send_with_retry(&self, texts: &[String], kind: EmbedKind) -> anyhow::Result<Vec<Vec<f32>>> {
		let api_key = self
			.config
			.resolve_api_key()
			.ok_or_else(|| anyhow::anyhow!("no API key configured for remote embedding provider"))?;

		let body = self.request_body(texts, kind);
		let mut attempt = 0u32;
		loop {
			let result = self
				.client
				.post(self.endpoint())
				.bearer_auth(&api_key)
				.json(&body)
				.send()
				.await;

			match result {
				Ok(resp) if resp.status().is_success() => {
					let parsed: Value = resp.json().await?;
					let vectors = self
						.parse_vectors(&parsed)
						.ok_or_else(|| anyhow::anyhow!("unrecognized response shape from remote embedding provider"))?;
					if let Some(first) = vectors.first() {
						*self.dimension.write() = Some(first.len());
					}
					return Ok(vectors);
				}
				Ok(resp) if resp.status().is_server_error() || resp.status().as_u16() == 429 => {
					attempt += 1;
					if attempt >= REMOTE_EMBEDDER_MAX_RETRIES {
						anyhow::bail!("remote embedding provider returned {} after {} attempts", resp.status(), attempt);
					}
					tokio::time::sleep(Duration::from_millis(250 * 2u64.pow(attempt))).await;
				}
				Ok(resp) => {
					anyhow::bail!("remote embedding provider returned {}", resp.status());
				}
				Err(e) => {
					attempt += 1;
					if attempt >= REMOTE_EMBEDDER_MAX_RETRIES {
						return Err(e.into());
					}
					tokio::time::sleep(Duration::from_millis(250 * 2u64.pow(attempt))).await;
				}
			}
		}
	}
}

fn parse_row(value: &Value) -> Vec<f32> {
	value
		.as_array()
		.map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
		.unwrap_or_default()
}

#[async_trait::async_trait]
impl Embedder for RemoteEmbedder {
	async fn embed(&self, texts: &[String], kind: EmbedKind) -> Vec<Vec<f32>> {
		if texts.is_empty() {
			return vec![];
		}
		match self.send_with_retry(texts, kind).await {
			Ok(vectors) if vectors.len() == texts.len() => vectors,
			Ok(vectors) => {
				tracing::error!(
					"remote embedding provider returned {} vectors for {} inputs; falling back to zero vectors",
					vectors.len(),
					texts.len()
				);
				let dim = self.dimension().unwrap_or(768);
				vec![vec![0.0; dim]; texts.len()]
			}
			Err(e) => {
				tracing::error!("remote embedding request failed after retries: {}", e);
				let dim = self.dimension().unwrap_or(768);
				vec![vec![0.0; dim]; texts.len()]
			}
		}
	}

	fn dimension(&self) -> Option<usize> {
		*self.dimension.read()
	}
}
