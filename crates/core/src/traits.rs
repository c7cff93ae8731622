use crate::error::{GenerationError, SearchError};
use crate::models::{StoreHit, VectorRecord};
use async_trait::async_trait;

#[async_trait]
pub trait VectorStore {
    async fn count(&self) -> Result<usize, SearchError>;

    async fn exists(&self, id: &str) -> Result<bool, SearchError>;

    async fn add(&self, records: &[VectorRecord]) -> Result<(), SearchError>;

    /// Up to `k` hits, nearest first.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<StoreHit>, SearchError>;
}

#[async_trait]
impl<T> VectorStore for Box<T>
where
    T: VectorStore + Send + Sync + ?Sized,
{
    async fn count(&self) -> Result<usize, SearchError> {
        (**self).count().await
    }

    async fn exists(&self, id: &str) -> Result<bool, SearchError> {
        (**self).exists(id).await
    }

    async fn add(&self, records: &[VectorRecord]) -> Result<(), SearchError> {
        (**self).add(records).await
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<StoreHit>, SearchError> {
        (**self).query(embedding, k).await
    }
}

#[async_trait]
pub trait Generator {
    /// `Ok(None)` when the model answered without any text.
    async fn generate(&self, prompt: &str) -> Result<Option<String>, GenerationError>;
}

#[async_trait]
impl<T> Generator for Box<T>
where
    T: Generator + Send + Sync + ?Sized,
{
    async fn generate(&self, prompt: &str) -> Result<Option<String>, GenerationError> {
        (**self).generate(prompt).await
    }
}
