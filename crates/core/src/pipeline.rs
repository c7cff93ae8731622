use crate::answer::{AnswerOutcome, Answerer};
use crate::chunking::{chunk_all_artifacts, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{IngestError, SearchError};
use crate::extractor::{LayoutExtractor, LopdfLayoutExtractor};
use crate::index::build_index;
use crate::models::{IngestionReport, RagSettings};
use crate::segmenter::segment_with;
use crate::traits::{Generator, VectorStore};
use chrono::Utc;
use std::path::Path;
use tracing::{info, warn};

/// Everything a request needs, built once at startup and shared read-only.
pub struct RagContext<E, S, G> {
    answerer: Answerer<E, S, G>,
    settings: RagSettings,
    chunking: ChunkingConfig,
}

impl<E, S, G> RagContext<E, S, G>
where
    E: Embedder + Send + Sync,
    S: VectorStore + Send + Sync,
    G: Generator + Send + Sync,
{
    /// Rejects invalid chunk sizing before any work starts.
    pub fn new(
        settings: RagSettings,
        embedder: E,
        store: S,
        generator: G,
    ) -> Result<Self, IngestError> {
        let chunking = ChunkingConfig::try_from(&settings)?;
        let answerer = Answerer::new(embedder, store, generator, settings.top_k);

        Ok(Self {
            answerer,
            settings,
            chunking,
        })
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    /// Segments, chunks and indexes `source_dir`. Must finish before the
    /// context serves questions.
    pub async fn ingest(&self, source_dir: &Path) -> Result<IngestionReport, IngestError> {
        self.ingest_with(LopdfLayoutExtractor, source_dir).await
    }

    /// PDF parsing and artifact IO run on the blocking pool, so any tokio
    /// runtime flavor can drive this.
    pub async fn ingest_with<X>(
        &self,
        extractor: X,
        source_dir: &Path,
    ) -> Result<IngestionReport, IngestError>
    where
        X: LayoutExtractor + Send + 'static,
    {
        let source_dir = source_dir.to_path_buf();
        let artifact_dir = self.settings.artifact_dir.clone();
        let chunking = self.chunking;

        let (segmentation, chunks) = tokio::task::spawn_blocking(move || {
            let segmentation = segment_with(&extractor, &source_dir, &artifact_dir)?;
            let chunks = chunk_all_artifacts(&artifact_dir, chunking)?;
            Ok::<_, IngestError>((segmentation, chunks))
        })
        .await
        .map_err(|error| IngestError::Task(error.to_string()))??;

        for skipped in &segmentation.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
        }

        let index = build_index(&chunks, self.answerer.embedder(), self.answerer.store()).await?;

        let report = IngestionReport {
            pages_written: segmentation.artifacts.len(),
            chunk_count: chunks.len(),
            index,
            skipped_files: segmentation.skipped_files,
            completed_at: Utc::now(),
        };
        info!(
            pages = report.pages_written,
            chunks = report.chunk_count,
            added = report.index.added,
            skipped = report.skipped_files.len(),
            "all files processed and stored in vector store"
        );
        Ok(report)
    }

    pub async fn resolve(&self, question: &str) -> Result<AnswerOutcome, SearchError> {
        self.answerer.resolve(question).await
    }

    pub async fn answer(&self, question: &str) -> Result<String, SearchError> {
        self.answerer.answer(question).await
    }
}
