use crate::error::SearchError;
use crate::generation::api_endpoint;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Matches the width of all-MiniLM-L6-v2 so either embedder can fill the same store.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

#[async_trait]
pub trait Embedder {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError>;
}

#[async_trait]
impl<T> Embedder for Box<T>
where
    T: Embedder + Send + Sync + ?Sized,
{
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        (**self).embed(text).await
    }
}

/// Hashed character trigrams, L2 normalised. Needs no model server.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        Ok(self.embed_sync(text))
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Sentence embeddings from a local Ollama server (`/api/embeddings`).
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: api_endpoint(base_url, "api/embeddings")?,
            model: model.into(),
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&OllamaEmbeddingRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: OllamaEmbeddingResponse = response.json().await?;
        if parsed.embedding.is_empty() {
            return Err(SearchError::Embedding(format!(
                "model {} returned an empty embedding",
                self.model
            )));
        }

        Ok(parsed.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed_sync("What was the annual revenue?");
        let second = embedder.embed_sync("What was the annual revenue?");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        assert_eq!(embedder.embed_sync("abc").len(), 32);
    }

    #[tokio::test]
    async fn boxed_embedder_delegates() -> Result<(), SearchError> {
        let boxed: Box<dyn Embedder + Send + Sync> = Box::new(CharacterNgramEmbedder { dimensions: 8 });
        assert_eq!(boxed.dimensions(), 8);
        assert_eq!(boxed.embed("revenue").await?.len(), 8);
        Ok(())
    }

    #[test]
    fn ollama_endpoint_is_joined_onto_base_url() -> Result<(), SearchError> {
        let embedder = OllamaEmbedder::new(
            "http://localhost:11434/",
            "all-minilm",
            384,
            Duration::from_secs(5),
        )?;
        assert_eq!(
            embedder.endpoint.as_str(),
            "http://localhost:11434/api/embeddings"
        );

        let proxied = OllamaEmbedder::new(
            "http://gateway.local/ollama",
            "all-minilm",
            384,
            Duration::from_secs(5),
        )?;
        assert_eq!(
            proxied.endpoint.as_str(),
            "http://gateway.local/ollama/api/embeddings"
        );
        Ok(())
    }
}
