use crate::error::SearchError;
use crate::models::{StoreHit, VectorRecord};
use crate::traits::VectorStore;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChromaQueryResult {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Default, Deserialize)]
struct ChromaGetResult {
    #[serde(default)]
    ids: Vec<String>,
}

/// Chroma collection over its REST API. The collection is created on first use.
pub struct ChromaStore {
    client: Client,
    endpoint: String,
    collection: String,
    collection_id: OnceCell<String>,
}

impl ChromaStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            collection_id: OnceCell::new(),
        })
    }

    pub async fn ensure_collection(&self) -> Result<&str, SearchError> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .post(format!("{}/api/v1/collections", self.endpoint))
                    .json(&json!({
                        "name": self.collection,
                        "get_or_create": true,
                    }))
                    .send()
                    .await?;

                let info: CollectionInfo = parse_response(response).await?;
                info!(collection = %self.collection, id = %info.id, "chroma collection ready");
                Ok::<_, SearchError>(info.id)
            })
            .await?;

        Ok(id.as_str())
    }

    fn collection_url(&self, id: &str, action: &str) -> String {
        format!("{}/api/v1/collections/{}/{}", self.endpoint, id, action)
    }
}

async fn parse_response<T>(response: reqwest::Response) -> Result<T, SearchError>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(SearchError::BackendResponse {
            backend: "chroma".to_string(),
            details: format!("{status}: {body}"),
        });
    }

    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn count(&self) -> Result<usize, SearchError> {
        let id = self.ensure_collection().await?;
        let response = self
            .client
            .get(self.collection_url(id, "count"))
            .send()
            .await?;

        let count: usize = parse_response(response).await?;
        debug!(collection = %self.collection, count, "chroma count");
        Ok(count)
    }

    async fn exists(&self, record_id: &str) -> Result<bool, SearchError> {
        let id = self.ensure_collection().await?;
        let response = self
            .client
            .post(self.collection_url(id, "get"))
            .json(&json!({
                "ids": [record_id],
                "include": [],
            }))
            .send()
            .await?;

        let found: ChromaGetResult = parse_response(response).await?;
        Ok(found.ids.iter().any(|found_id| found_id == record_id))
    }

    async fn add(&self, records: &[VectorRecord]) -> Result<(), SearchError> {
        if records.is_empty() {
            return Ok(());
        }

        let id = self.ensure_collection().await?;
        let ids = records.iter().map(|record| record.id.as_str()).collect::<Vec<_>>();
        let embeddings = records
            .iter()
            .map(|record| record.embedding.as_slice())
            .collect::<Vec<_>>();
        let documents = records
            .iter()
            .map(|record| record.text.as_str())
            .collect::<Vec<_>>();

        let response = self
            .client
            .post(self.collection_url(id, "add"))
            .json(&json!({
                "ids": ids,
                "embeddings": embeddings,
                "documents": documents,
            }))
            .send()
            .await?;

        let _: Value = parse_response(response).await?;
        info!(collection = %self.collection, count = records.len(), "added records to chroma");
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<StoreHit>, SearchError> {
        let id = self.ensure_collection().await?;
        let response = self
            .client
            .post(self.collection_url(id, "query"))
            .json(&json!({
                "query_embeddings": [embedding],
                "n_results": k,
                "include": ["documents", "distances"],
            }))
            .send()
            .await?;

        let result: ChromaQueryResult = parse_response(response).await?;
        Ok(first_query_hits(result))
    }
}

/// Hits for the single query embedding we send: the first inner list of each field.
fn first_query_hits(result: ChromaQueryResult) -> Vec<StoreHit> {
    let ids = result.ids.into_iter().next().unwrap_or_default();
    let documents = result
        .documents
        .and_then(|documents| documents.into_iter().next())
        .unwrap_or_default();
    let distances = result
        .distances
        .and_then(|distances| distances.into_iter().next())
        .unwrap_or_default();

    documents
        .into_iter()
        .enumerate()
        .map(|(position, document)| StoreHit {
            id: ids.get(position).cloned().unwrap_or_default(),
            text: document.unwrap_or_default(),
            score: distances.get(position).copied().flatten().unwrap_or(0.0),
        })
        .collect()
}
