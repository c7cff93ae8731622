use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::{IndexReport, VectorRecord};
use crate::traits::VectorStore;
use tracing::info;

pub fn chunk_id(position: usize) -> String {
    format!("chunk_{position}")
}

/// Fills an empty store with one record per non-blank chunk. A store that
/// already holds anything is left untouched, whatever chunks it was built from.
pub async fn build_index<E, S>(
    chunks: &[String],
    embedder: &E,
    store: &S,
) -> Result<IndexReport, SearchError>
where
    E: Embedder + Sync + ?Sized,
    S: VectorStore + Sync + ?Sized,
{
    if store.count().await? > 0 {
        info!("vector store already populated");
        return Ok(IndexReport {
            added: 0,
            already_populated: true,
        });
    }

    info!("storing new chunks into vector store");
    let kept = chunks.iter().filter(|chunk| !chunk.trim().is_empty());

    let mut records = Vec::new();
    for (position, chunk) in kept.enumerate() {
        records.push(VectorRecord {
            id: chunk_id(position),
            embedding: embedder.embed(chunk).await?,
            text: chunk.clone(),
        });
    }

    store.add(&records).await?;
    info!(added = records.len(), "stored chunks in vector store");

    Ok(IndexReport {
        added: records.len(),
        already_populated: false,
    })
}
