//! VectorStore — remote interface to a Milvus/Zilliz-shaped hybrid-search
//! collection (spec.md §4.6, §6.2). Field names (`vector`, `sparse_vector`,
//! `nprobe`, `drop_ratio_search`) follow Zilliz Cloud's REST vocabulary, the
//! wire shape the spec's §4.8 sub-requests are written against.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{IndexError, Recoverability};
use crate::retry::with_retry;
use crate::types::EmbeddedChunk;

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub base_url: String,
    pub api_token: String,
    pub request_timeout: std::time::Duration,
}

/// A row surfaced back to a caller by `query` or `hybridSearch`'s output
/// fields (spec.md §6.2 `rows: [{id, content, relativePath, ...}]`).
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(rename = "relativePath")]
    pub relative_path: String,
    pub content: String,
    #[serde(rename = "startLine")]
    pub start_line: i64,
    #[serde(rename = "endLine")]
    pub end_line: i64,
    #[serde(rename = "fileExtension")]
    pub file_extension: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl crate::filter::FilterRecord for Document {
    fn field_str(&self, name: &str) -> Option<&str> {
        match name {
            "id" => Some(&self.id),
            "relativePath" => Some(&self.relative_path),
            "fileExtension" => Some(&self.file_extension),
            _ => None,
        }
    }
    fn field_int(&self, name: &str) -> Option<i64> {
        match name {
            "startLine" => Some(self.start_line),
            "endLine" => Some(self.end_line),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub document: Document,
    pub score: f32,
}

/// One sub-request of a hybrid search (spec.md §4.8 step 2): the dense
/// sub-request targets `field = "vector"`, the sparse one `"sparse_vector"`.
#[derive(Debug, Clone)]
pub struct SubRequest {
    pub field: &'static str,
    pub data: SubRequestData,
    pub params: Value,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub enum SubRequestData {
    Dense(Vec<f32>),
    /// Raw query text; the store computes the BM25-like sparse query server-side.
    Text(String),
}

impl SubRequest {
    pub fn dense(vector: Vec<f32>, limit: usize) -> Self {
        Self { field: "vector", data: SubRequestData::Dense(vector), params: json!({"nprobe": 10}), limit }
    }

    pub fn sparse(query_text: String, limit: usize) -> Self {
        Self {
            field: "sparse_vector",
            data: SubRequestData::Text(query_text),
            params: json!({"drop_ratio_search": 0.2}),
            limit,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VerificationResult {
    pub expected: usize,
    pub observed: usize,
}

impl VerificationResult {
    /// Spec.md §4.6: observed count below `0.8 * expected` triggers a
    /// warning, not an error.
    pub fn below_threshold(&self) -> bool {
        (self.observed as f64) < 0.8 * self.expected as f64
    }
}

pub struct VectorStore {
    config: VectorStoreConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct CollectionNameBody<'a> {
    #[serde(rename = "collectionName")]
    collection_name: &'a str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

impl VectorStore {
    pub fn new(config: VectorStoreConfig) -> Result<Self, IndexError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| IndexError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, IndexError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.config.api_token)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let recoverability = if response.status().is_server_error() {
                Recoverability::Recoverable
            } else {
                Recoverability::NonRecoverable
            };
            return Err(IndexError::VectorStore {
                message: format!("HTTP {}", response.status()),
                recoverability,
            });
        }

        response.json::<Envelope<T>>().await.map_err(|e| IndexError::VectorStore {
            message: format!("malformed response: {e}"),
            recoverability: Recoverability::NonRecoverable,
        })
    }

    pub async fn has_collection(&self, name: &str) -> Result<bool, IndexError> {
        let result: Envelope<Value> =
            with_retry(|| self.post("/v2/vectordb/collections/describe", &CollectionNameBody { collection_name: name }))
                .await?;
        Ok(result.code == 0 && result.data.is_some())
    }

    /// Idempotent: succeeds if the collection already exists with matching
    /// `dimension`/`hybrid`, fails otherwise (spec.md §4.6, §4.7 step 7).
    pub async fn create_collection(&self, name: &str, dimension: usize, hybrid: bool) -> Result<(), IndexError> {
        if let Some(existing) = self.describe_collection(name).await? {
            if existing.dimension == dimension && existing.hybrid == hybrid {
                return Ok(());
            }
            return Err(IndexError::SchemaMismatch { expected: existing.dimension, got: dimension });
        }

        #[derive(Serialize)]
        struct CreateBody<'a> {
            #[serde(rename = "collectionName")]
            collection_name: &'a str,
            dimension: usize,
            #[serde(rename = "metricType")]
            metric_type: &'static str,
            hybrid: bool,
        }
        let body = CreateBody { collection_name: name, dimension, metric_type: "COSINE", hybrid };
        let _: Envelope<Value> = with_retry(|| self.post("/v2/vectordb/collections/create", &body)).await?;
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<Option<CollectionDescription>, IndexError> {
        #[derive(Deserialize)]
        struct Describe {
            dimension: usize,
            #[serde(default)]
            hybrid: bool,
        }
        let result: Envelope<Describe> =
            with_retry(|| self.post("/v2/vectordb/collections/describe", &CollectionNameBody { collection_name: name }))
                .await?;
        Ok(result.data.map(|d| CollectionDescription { dimension: d.dimension, hybrid: d.hybrid }))
    }

    /// Idempotent: succeeds if the collection is already absent (spec.md §4.6).
    pub async fn drop_collection(&self, name: &str) -> Result<(), IndexError> {
        let _: Envelope<Value> =
            with_retry(|| self.post("/v2/vectordb/collections/drop", &CollectionNameBody { collection_name: name })).await?;
        Ok(())
    }

    pub async fn insert(&self, name: &str, chunks: &[EmbeddedChunk]) -> Result<(), IndexError> {
        self.insert_rows(name, chunks, false).await
    }

    pub async fn insert_hybrid(&self, name: &str, chunks: &[EmbeddedChunk]) -> Result<(), IndexError> {
        self.insert_rows(name, chunks, true).await
    }

    async fn insert_rows(&self, name: &str, chunks: &[EmbeddedChunk], hybrid: bool) -> Result<(), IndexError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let data: Vec<Value> = chunks
            .iter()
            .map(|ec| {
                let mut row = json!({
                    "id": ec.chunk.id,
                    "vector": ec.dense_vector,
                    "content": ec.chunk.content,
                    "relativePath": ec.chunk.relative_path,
                    "startLine": ec.chunk.start_line,
                    "endLine": ec.chunk.end_line,
                    "fileExtension": ec.chunk.file_extension,
                    "metadata": ec.chunk.metadata,
                });
                if hybrid {
                    // Server-side sparse computation keys off the raw text;
                    // client-computed weights ride alongside when available.
                    row["sparse_vector_source"] = json!(ec.chunk.content);
                    if let Some(sparse) = &ec.sparse_representation {
                        row["sparse_vector"] = json!(sparse);
                    }
                }
                row
            })
            .collect();

        #[derive(Serialize)]
        struct InsertBody<'a> {
            #[serde(rename = "collectionName")]
            collection_name: &'a str,
            data: Vec<Value>,
        }
        let body = InsertBody { collection_name: name, data };
        let _: Envelope<Value> = with_retry(|| self.post("/v2/vectordb/entities/insert", &body)).await?;
        Ok(())
    }

    pub async fn delete_by_filter(&self, name: &str, filter_expr: &str) -> Result<(), IndexError> {
        #[derive(Serialize)]
        struct DeleteBody<'a> {
            #[serde(rename = "collectionName")]
            collection_name: &'a str,
            filter: &'a str,
        }
        let body = DeleteBody { collection_name: name, filter: filter_expr };
        let _: Envelope<Value> = with_retry(|| self.post("/v2/vectordb/entities/delete", &body)).await?;
        Ok(())
    }

    pub async fn query(&self, name: &str, filter_expr: &str, limit: usize) -> Result<Vec<Document>, IndexError> {
        #[derive(Serialize)]
        struct QueryBody<'a> {
            #[serde(rename = "collectionName")]
            collection_name: &'a str,
            filter: &'a str,
            #[serde(rename = "outputFields")]
            output_fields: Vec<&'static str>,
            limit: usize,
        }
        let body = QueryBody {
            collection_name: name,
            filter: filter_expr,
            output_fields: vec!["id", "content", "relativePath", "startLine", "endLine", "fileExtension", "metadata"],
            limit,
        };
        let result: Envelope<Vec<Document>> = with_retry(|| self.post("/v2/vectordb/entities/query", &body)).await?;
        Ok(result.data.unwrap_or_default())
    }

    /// Issues one sub-request of a hybrid search (dense or sparse, spec.md
    /// §4.8 step 2) and returns its ranked hit list. Each sub-request is
    /// issued and may fail independently — the caller (`search::hybrid_search`)
    /// decides whether one failing sub-request is tolerable.
    pub async fn hybrid_search_sub_request(&self, name: &str, req: &SubRequest) -> Result<Vec<Hit>, IndexError> {
        let data = match &req.data {
            SubRequestData::Dense(v) => json!(v),
            SubRequestData::Text(t) => json!(t),
        };

        #[derive(Serialize)]
        struct SearchBody<'a> {
            #[serde(rename = "collectionName")]
            collection_name: &'a str,
            #[serde(rename = "annsField")]
            anns_field: &'a str,
            data: Value,
            params: Value,
            limit: usize,
            #[serde(rename = "outputFields")]
            output_fields: Vec<&'static str>,
        }
        let body = SearchBody {
            collection_name: name,
            anns_field: req.field,
            data,
            params: req.params.clone(),
            limit: req.limit,
            output_fields: vec!["id", "content", "relativePath", "startLine", "endLine", "fileExtension", "metadata"],
        };

        #[derive(Deserialize)]
        struct ScoredRow {
            #[serde(flatten)]
            document: Document,
            #[serde(default)]
            score: f32,
        }

        let result: Envelope<Vec<ScoredRow>> = with_retry(|| self.post("/v2/vectordb/entities/search", &body)).await?;
        Ok(result
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|row| Hit { document: row.document, score: row.score })
            .collect())
    }

    /// Waits briefly for write-quiescence then re-counts rows for `name`,
    /// comparing to `expected_count` (spec.md §4.6).
    pub async fn verify_inserted_data(
        &self,
        name: &str,
        expected_count: usize,
    ) -> Result<VerificationResult, IndexError> {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        #[derive(Serialize)]
        struct CountBody<'a> {
            #[serde(rename = "collectionName")]
            collection_name: &'a str,
            filter: &'a str,
            #[serde(rename = "outputFields")]
            output_fields: Vec<&'static str>,
        }
        let body = CountBody { collection_name: name, filter: "", output_fields: vec!["count(*)"] };

        #[derive(Deserialize)]
        struct CountRow {
            #[serde(rename = "count(*)")]
            count: usize,
        }
        let result: Envelope<Vec<CountRow>> = with_retry(|| self.post("/v2/vectordb/entities/query", &body)).await?;
        let observed = result.data.and_then(|rows| rows.first().map(|r| r.count)).unwrap_or(0);
        Ok(VerificationResult { expected: expected_count, observed })
    }
}

struct CollectionDescription {
    dimension: usize,
    hybrid: bool,
}

fn classify_transport_error(e: reqwest::Error) -> IndexError {
    let recoverability =
        if e.is_timeout() || e.is_connect() { Recoverability::Recoverable } else { Recoverability::NonRecoverable };
    IndexError::VectorStore { message: e.to_string(), recoverability }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_result_flags_gap_below_80_percent() {
        assert!(VerificationResult { expected: 100, observed: 79 }.below_threshold());
        assert!(!VerificationResult { expected: 100, observed: 80 }.below_threshold());
    }

    #[test]
    fn verification_result_zero_expected_is_never_below_threshold() {
        assert!(!VerificationResult { expected: 0, observed: 0 }.below_threshold());
    }
}
