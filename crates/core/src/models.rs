use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Axis-aligned box in page space, `top`/`bottom` measured from the top edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BBox {
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl BBox {
    pub fn new(x0: f64, top: f64, x1: f64, bottom: f64) -> Self {
        Self {
            x0,
            top,
            x1,
            bottom,
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            top: self.top.min(other.top),
            x1: self.x1.max(other.x1),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordToken {
    pub text: String,
    pub bbox: BBox,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableRegion {
    pub bbox: BBox,
    /// Row-major cell grid; `None` marks a cell the parser could not fill.
    pub rows: Vec<Vec<Option<String>>>,
}

/// Words and tables found on one page, in reading order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageLayout {
    pub number: u32,
    pub words: Vec<WordToken>,
    pub tables: Vec<TableRegion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageArtifact {
    pub document: String,
    pub page: u32,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreHit {
    pub id: String,
    pub text: String,
    /// Distance in the store's native metric; lower is closer.
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentationReport {
    pub artifacts: Vec<PageArtifact>,
    pub skipped_files: Vec<SkippedPdf>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexReport {
    pub added: usize,
    pub already_populated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub pages_written: usize,
    pub chunk_count: usize,
    pub index: IndexReport,
    pub skipped_files: Vec<SkippedPdf>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RagSettings {
    pub artifact_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("outputs"),
            chunk_size: 500,
            chunk_overlap: 100,
            top_k: 5,
        }
    }
}
