//! OpenAI-compatible HTTP embedding provider.
//!
//! Talks to any `/embeddings` endpoint that speaks the OpenAI wire format.
//! The hard per-call timeout lives on the HTTP client itself, so a hung
//! provider can never stall a briefing beyond the configured ceiling.

use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Blocking HTTP client for an OpenAI-compatible embeddings endpoint.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::blocking::Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbeddingProvider {
    /// Builds a provider from configuration.
    ///
    /// Returns `None` when no API key is configured or the HTTP client
    /// cannot be constructed; both mean "embedding disabled".
    #[must_use]
    pub fn from_config(config: &EmbeddingConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        let client = match client {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "embedding HTTP client construction failed");
                return None;
            },
        };

        Some(Self {
            client,
            api_key,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }
}

impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .map_err(|e| Error::op("embed_batch", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::op(
                "embed_batch",
                format!("provider returned {status}: {}", body.chars().take(200).collect::<String>()),
            ));
        }

        let payload: EmbeddingResponse = response
            .json()
            .map_err(|e| Error::InvalidInput(format!("malformed embedding response: {e}")))?;

        // Data arrives index-tagged; out-of-range indexes are dropped rather
        // than trusted.
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for datum in payload.data {
            if let Some(slot) = out.get_mut(datum.index) {
                *slot = Some(datum.embedding);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_api_key() {
        let config = EmbeddingConfig::default();
        assert!(OpenAiEmbeddingProvider::from_config(&config).is_none());

        let config = EmbeddingConfig {
            api_key: Some(SecretString::from("sk-test")),
            ..EmbeddingConfig::default()
        };
        let provider = OpenAiEmbeddingProvider::from_config(&config).unwrap();
        assert_eq!(provider.dimensions(), 1536);
        assert_eq!(provider.endpoint, "https://api.openai.com/v1/embeddings");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = EmbeddingConfig {
            api_key: Some(SecretString::from("sk-test")),
            base_url: "http://localhost:8080/v1/".to_string(),
            ..EmbeddingConfig::default()
        };
        let provider = OpenAiEmbeddingProvider::from_config(&config).unwrap();
        assert_eq!(provider.endpoint, "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn test_request_serialization() {
        let input = vec!["hello".to_string()];
        let request = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: &input,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "text-embedding-3-small");
        assert_eq!(json["input"][0], "hello");
    }

    #[test]
    fn test_response_deserialization_preserves_index() {
        let raw = r#"{"data":[{"index":1,"embedding":[0.5]},{"index":0,"embedding":[0.25]}]}"#;
        let payload: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.data.len(), 2);
        assert_eq!(payload.data[0].index, 1);
    }
}
