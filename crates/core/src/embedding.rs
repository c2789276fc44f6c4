//! EmbeddingClient — batched vectorization against an OpenAI-compatible
//! `/embeddings` endpoint (spec.md §4.5, §6.1).

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{IndexError, Recoverability};
use crate::retry::with_retry;

/// `responseShape` (spec.md §4.5): selects which field carries the vector in
/// each response item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    OpenAi,
    Alibaba,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// `Authorization: Bearer <key>` if true, `api-key: <key>` (Azure-style) otherwise.
    pub bearer_auth: bool,
    pub response_shape: ResponseShape,
    /// §4.5 `providerBatchCeiling`; `embedBatch` transparently splits above this.
    pub provider_batch_ceiling: Option<usize>,
    /// §4.5 `customDimension`; passed through to the provider and becomes
    /// the authoritative `D` when set.
    pub custom_dimension: Option<usize>,
    pub request_timeout: std::time::Duration,
}

#[derive(Debug, Clone)]
pub struct EmbeddedText {
    pub vector: Vec<f32>,
    pub dimension: usize,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

impl EmbeddingItem {
    fn take(self, shape: ResponseShape) -> Option<Vec<f32>> {
        match shape {
            ResponseShape::OpenAi => self.embedding.or(self.vector),
            ResponseShape::Alibaba => self.vector.or(self.embedding),
        }
    }
}

/// Remote vectorizer façade. Safe to share across concurrent requests — a
/// mutex around the cached dimension enforces that `detectDimension` only
/// issues its probe call once per process (spec.md §4.5, §5).
pub struct EmbeddingClient {
    config: EmbeddingConfig,
    http: reqwest::Client,
    detected_dimension: Mutex<Option<usize>>,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> Result<Self, IndexError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IndexError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http, detected_dimension: Mutex::new(None) })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// One text, one vector.
    pub async fn embed(&self, text: &str) -> Result<EmbeddedText, IndexError> {
        let mut results = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        results.pop().ok_or_else(|| {
            IndexError::Embedding { message: "empty response for single text".into(), recoverability: Recoverability::NonRecoverable }
        })
    }

    /// Preserves input order; splits above `providerBatchCeiling` and
    /// concatenates sub-batch results in order (spec.md §4.5, §8.3 "Batch
    /// exactly at providerBatchCeiling").
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddedText>, IndexError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let ceiling = self.config.provider_batch_ceiling.unwrap_or(texts.len()).max(1);
        let mut out = Vec::with_capacity(texts.len());
        for sub_batch in texts.chunks(ceiling) {
            let mut results = with_retry(|| self.call_provider(sub_batch)).await?;
            out.append(&mut results);
        }
        Ok(out)
    }

    /// Issues one call with `probe_text` and caches the resulting dimension
    /// for subsequent calls within this process (spec.md §4.5).
    pub async fn detect_dimension(&self, probe_text: &str) -> Result<usize, IndexError> {
        {
            let cached = self.detected_dimension.lock().await;
            if let Some(dim) = *cached {
                return Ok(dim);
            }
        }
        let embedded = self.embed(probe_text).await?;
        let mut cached = self.detected_dimension.lock().await;
        *cached = Some(embedded.dimension);
        Ok(embedded.dimension)
    }

    /// Last known dimension: a configured override takes priority, then the
    /// detected value (spec.md §4.5).
    pub async fn get_dimension(&self) -> Option<usize> {
        if let Some(custom) = self.config.custom_dimension {
            return Some(custom);
        }
        *self.detected_dimension.lock().await
    }

    async fn call_provider(&self, texts: &[String]) -> Result<Vec<EmbeddedText>, IndexError> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = EmbeddingsRequest {
            model: &self.config.model,
            input: texts,
            encoding_format: "float",
            dimensions: self.config.custom_dimension,
        };

        let mut request = self.http.post(&url).json(&body);
        request = if self.config.bearer_auth {
            request.bearer_auth(&self.config.api_key)
        } else {
            request.header("api-key", &self.config.api_key)
        };

        let response = request.send().await.map_err(classify_transport_error)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(IndexError::Embedding {
                message: format!("authentication failed: HTTP {}", response.status()),
                recoverability: Recoverability::NonRecoverable,
            });
        }
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(IndexError::Embedding {
                message: "rate limited".into(),
                recoverability: Recoverability::Recoverable,
            });
        }
        if !response.status().is_success() {
            return Err(IndexError::Embedding {
                message: format!("provider returned HTTP {}", response.status()),
                recoverability: Recoverability::NonRecoverable,
            });
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(|e| IndexError::Embedding {
            message: format!("malformed response: {e}"),
            recoverability: Recoverability::NonRecoverable,
        })?;

        if parsed.data.len() != texts.len() {
            return Err(IndexError::Embedding {
                message: format!("expected {} vectors, got {}", texts.len(), parsed.data.len()),
                recoverability: Recoverability::NonRecoverable,
            });
        }

        parsed
            .data
            .into_iter()
            .map(|item| {
                item.take(self.config.response_shape)
                    .map(|vector| EmbeddedText { dimension: vector.len(), vector })
                    .ok_or_else(|| IndexError::Embedding {
                        message: "response item carried no vector field".into(),
                        recoverability: Recoverability::NonRecoverable,
                    })
            })
            .collect()
    }
}

fn classify_transport_error(e: reqwest::Error) -> IndexError {
    let recoverability =
        if e.is_timeout() || e.is_connect() { Recoverability::Recoverable } else { Recoverability::NonRecoverable };
    IndexError::Embedding { message: e.to_string(), recoverability }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_item_prefers_field_per_shape() {
        let item = EmbeddingItem { embedding: Some(vec![1.0, 2.0]), vector: Some(vec![3.0]) };
        assert_eq!(item.take(ResponseShape::OpenAi), Some(vec![1.0, 2.0]));

        let item = EmbeddingItem { embedding: Some(vec![1.0, 2.0]), vector: Some(vec![3.0]) };
        assert_eq!(item.take(ResponseShape::Alibaba), Some(vec![3.0]));
    }

    #[test]
    fn embedding_item_falls_back_when_preferred_field_absent() {
        let item = EmbeddingItem { embedding: None, vector: Some(vec![9.0]) };
        assert_eq!(item.take(ResponseShape::OpenAi), Some(vec![9.0]));
    }
}
