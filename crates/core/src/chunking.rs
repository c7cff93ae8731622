use crate::error::IngestError;
use crate::models::RagSettings;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const SAMPLE_CHARS: usize = 200;

/// Word-window sizing. Only constructible with `overlap < chunk_size`, so every
/// window start moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, IngestError> {
        if chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be at least one word".to_string(),
            ));
        }

        if overlap >= chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {overlap} must be smaller than chunk size {chunk_size}"
            )));
        }

        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 100,
        }
    }
}

impl TryFrom<&RagSettings> for ChunkingConfig {
    type Error = IngestError;

    fn try_from(value: &RagSettings) -> Result<Self, Self::Error> {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

/// Windows of `chunk_size` words starting every `chunk_size - overlap` words.
/// The last window may be shorter; blank windows are left to the caller.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let words = text.split_whitespace().collect::<Vec<_>>();

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + config.chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += config.stride();
    }

    chunks
}

/// Chunks every page artifact in `artifact_dir`, ordered by document name and
/// then page number, dropping blank chunks.
pub fn chunk_all_artifacts(
    artifact_dir: &Path,
    config: ChunkingConfig,
) -> Result<Vec<String>, IngestError> {
    let mut all_chunks = Vec::new();

    for path in list_artifacts(artifact_dir)? {
        let text = fs::read_to_string(&path)?;
        all_chunks.extend(
            chunk_text(&text, config)
                .into_iter()
                .filter(|chunk| !chunk.trim().is_empty()),
        );
    }

    info!(chunk_count = all_chunks.len(), "chunks created");
    if let Some(first) = all_chunks.first() {
        let sample = first.chars().take(SAMPLE_CHARS).collect::<String>();
        info!(sample = %sample, "sample chunk");
    }

    Ok(all_chunks)
}

pub fn list_artifacts(artifact_dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let page_re = Regex::new(r"^(?P<base>.*)_page_(?P<page>\d+)\.txt$")
        .map_err(|error| IngestError::InvalidArgument(error.to_string()))?;

    let mut keyed = Vec::new();
    for entry in fs::read_dir(artifact_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !name.ends_with(".txt") {
            continue;
        }

        let key = match page_re.captures(name) {
            Some(captures) => (
                captures["base"].to_string(),
                captures["page"].parse::<u64>().unwrap_or(u64::MAX),
            ),
            None => (name.trim_end_matches(".txt").to_string(), 0),
        };
        keyed.push((key, path));
    }

    keyed.sort_by(|(left, left_path), (right, right_path)| {
        left.cmp(right).then_with(|| left_path.cmp(right_path))
    });
    Ok(keyed.into_iter().map(|(_, path)| path).collect())
}
