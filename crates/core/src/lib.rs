pub mod answer;
pub mod bbox;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod segmenter;
pub mod stores;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use answer::{
    assemble_context, build_prompt, AnswerOutcome, Answerer, DEFAULT_TOP_K, NO_CONTEXT_MESSAGE,
    NO_RESPONSE_MESSAGE,
};
pub use bbox::{is_contained, is_table_content};
pub use chunking::{chunk_all_artifacts, chunk_text, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{GenerationError, IngestError, SearchError};
pub use extractor::{extract_page_layouts, LayoutExtractor, LopdfLayoutExtractor};
pub use generation::{OllamaGenerator, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};
pub use index::build_index;
pub use models::{
    BBox, IndexReport, IngestionReport, PageArtifact, PageLayout, RagSettings,
    SegmentationReport, SkippedPdf, StoreHit, TableRegion, VectorRecord, WordToken,
};
pub use pipeline::RagContext;
pub use segmenter::{discover_pdf_files, render_page_artifact, segment, segment_with};
pub use stores::{ChromaStore, MemoryVectorStore};
pub use traits::{Generator, VectorStore};
