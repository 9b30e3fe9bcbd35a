use crate::error::IngestError;
use crate::metadata::document_metadata;
use crate::models::{Chunk, SegmenterOptions};
use crate::segmenter::segment_document;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

pub fn discover_xml_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_xml = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));

        if is_xml {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub chunks: Vec<Chunk>,
    pub skipped_files: Vec<SkippedDocument>,
    pub generated_at: DateTime<Utc>,
}

pub fn ingest_folder_chunks(
    folder: &Path,
    options: &SegmenterOptions,
) -> Result<Vec<Chunk>, IngestError> {
    let report = ingest_folder_chunks_best_effort(folder, options)?;
    Ok(report.chunks)
}

/// Segments every XML document under `folder`. A document that fails to
/// parse is recorded and skipped; it never aborts the rest of the batch.
pub fn ingest_folder_chunks_best_effort(
    folder: &Path,
    options: &SegmenterOptions,
) -> Result<IngestionReport, IngestError> {
    let files = discover_xml_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no xml files found in {}",
            folder.display()
        )));
    }

    let mut chunks = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match segment_file(&path, folder, options) {
            Ok(file_chunks) => chunks.extend(file_chunks),
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped document");
                skipped_files.push(SkippedDocument {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(IngestionReport {
        chunks,
        skipped_files,
        generated_at: Utc::now(),
    })
}

fn segment_file(
    path: &Path,
    root: &Path,
    options: &SegmenterOptions,
) -> Result<Vec<Chunk>, IngestError> {
    let raw = fs::read_to_string(path)?;
    let document = roxmltree::Document::parse(&raw)
        .map_err(|error| IngestError::XmlParse(format!("{}: {error}", path.display())))?;

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    let mut metadata = document_metadata(filename, &document);
    metadata.subfolder = path
        .parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .map(|relative| relative.to_string_lossy().to_string())
        .filter(|relative| !relative.is_empty());
    metadata.full_path = Some(path.to_string_lossy().to_string());

    Ok(segment_document(&document, &metadata, options))
}

pub fn save_chunks(chunks: &[Chunk], path: &Path) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_vec_pretty(chunks)?;
    fs::write(path, payload)?;
    Ok(())
}

pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>, IngestError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
