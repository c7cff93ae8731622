use crate::bbox::flow_words;
use crate::error::IngestError;
use crate::extractor::{LayoutExtractor, LopdfLayoutExtractor};
use crate::models::{PageArtifact, PageLayout, SegmentationReport, SkippedPdf, TableRegion};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// PDFs directly inside `folder`, sorted by file name.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn artifact_file_name(basename: &str, page: u32) -> String {
    format!("{basename}_page_{page}.txt")
}

/// Flow text, a blank line, then every table as tab-separated rows each
/// followed by a blank line.
pub fn render_page_artifact(layout: &PageLayout) -> String {
    let flow = flow_words(&layout.words, &layout.tables)
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let mut rendered = flow;
    rendered.push_str("\n\n");
    for table in &layout.tables {
        rendered.push_str(&render_table(table));
        rendered.push('\n');
    }
    rendered
}

fn render_table(table: &TableRegion) -> String {
    let mut rendered = String::new();
    for row in &table.rows {
        let cells = row
            .iter()
            .map(|cell| cell.as_deref().unwrap_or(""))
            .collect::<Vec<_>>();
        rendered.push_str(&cells.join("\t"));
        rendered.push('\n');
    }
    rendered
}

pub fn segment(source_dir: &Path, artifact_dir: &Path) -> Result<SegmentationReport, IngestError> {
    segment_with(&LopdfLayoutExtractor, source_dir, artifact_dir)
}

/// Writes one artifact per page of every PDF in `source_dir`. A file that fails
/// to parse is recorded in the report and the walk moves on.
pub fn segment_with<X>(
    extractor: &X,
    source_dir: &Path,
    artifact_dir: &Path,
) -> Result<SegmentationReport, IngestError>
where
    X: LayoutExtractor + ?Sized,
{
    if !source_dir.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "source folder does not exist: {}",
            source_dir.display()
        )));
    }

    fs::create_dir_all(artifact_dir)?;

    let files = discover_pdf_files(source_dir);
    if files.is_empty() {
        warn!(folder = %source_dir.display(), "no pdf files found");
    }

    let mut report = SegmentationReport::default();

    for path in files {
        let basename = match path.file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) => stem.to_string(),
            None => {
                let error = IngestError::MissingFileName(path.display().to_string());
                warn!(path = %path.display(), reason = %error, "skipped pdf");
                report.skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        let layouts = match extractor.extract_layouts(&path) {
            Ok(layouts) => layouts,
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped pdf");
                report.skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
                continue;
            }
        };

        for layout in &layouts {
            let artifact_path = artifact_dir.join(artifact_file_name(&basename, layout.number));
            match fs::write(&artifact_path, render_page_artifact(layout)) {
                Ok(()) => report.artifacts.push(PageArtifact {
                    document: basename.clone(),
                    page: layout.number,
                    path: artifact_path,
                }),
                Err(error) => {
                    warn!(path = %artifact_path.display(), reason = %error, "page artifact not written");
                    report.skipped_files.push(SkippedPdf {
                        path: path.clone(),
                        reason: format!("page {}: {error}", layout.number),
                    });
                }
            }
        }

        info!(path = %path.display(), pages = layouts.len(), "segmented pdf");
    }

    Ok(report)
}
