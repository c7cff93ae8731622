use crate::error::SearchError;
use crate::models::{StoreHit, VectorRecord};
use crate::traits::VectorStore;
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

/// Brute-force cosine index. With a snapshot path every `add` rewrites a JSON
/// file that `open` reads back, so a populated index survives restarts. An
/// `add` whose snapshot write fails leaves the in-memory records untouched.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    records: RwLock<Vec<VectorRecord>>,
    snapshot: Option<PathBuf>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(snapshot: impl Into<PathBuf>) -> Result<Self, SearchError> {
        let snapshot = snapshot.into();
        let records = if snapshot.is_file() {
            let raw = fs::read_to_string(&snapshot)?;
            serde_json::from_str::<Vec<VectorRecord>>(&raw)?
        } else {
            Vec::new()
        };

        debug!(path = %snapshot.display(), records = records.len(), "opened vector snapshot");
        Ok(Self {
            records: RwLock::new(records),
            snapshot: Some(snapshot),
        })
    }

    async fn persist(&self, records: &[VectorRecord]) -> Result<(), SearchError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec(records)?).await?;
        Ok(())
    }
}

pub fn cosine_distance(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (l, r) in left.iter().zip(right.iter()) {
        let (l, r) = (f64::from(*l), f64::from(*r));
        dot += l * r;
        left_norm += l * l;
        right_norm += r * r;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 1.0;
    }
    1.0 - dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn count(&self) -> Result<usize, SearchError> {
        Ok(self.records.read().await.len())
    }

    async fn exists(&self, id: &str) -> Result<bool, SearchError> {
        Ok(self.records.read().await.iter().any(|record| record.id == id))
    }

    async fn add(&self, records: &[VectorRecord]) -> Result<(), SearchError> {
        let mut stored = self.records.write().await;

        for (position, record) in records.iter().enumerate() {
            let duplicate = stored.iter().any(|existing| existing.id == record.id)
                || records[..position].iter().any(|earlier| earlier.id == record.id);
            if duplicate {
                return Err(SearchError::Request(format!(
                    "record id {} already exists",
                    record.id
                )));
            }
        }

        let mut next = stored.clone();
        next.extend(records.iter().cloned());
        self.persist(&next).await?;

        *stored = next;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<StoreHit>, SearchError> {
        let stored = self.records.read().await;

        let mut hits = stored
            .iter()
            .map(|record| StoreHit {
                id: record.id.clone(),
                text: record.text.clone(),
                score: cosine_distance(embedding, &record.embedding),
            })
            .collect::<Vec<_>>();

        hits.sort_by(|left, right| left.score.total_cmp(&right.score));
        hits.truncate(k);
        Ok(hits)
    }
}
