//! Printable summary of a `generate` run.

use crate::model::ProcessingResult;
use crate::model::ProcessingSource;
use crate::model::ProcessingStatus;
use crate::model::format_bytes;
use facet::Facet;

#[derive(Debug, Clone, PartialEq, Facet)]
pub struct GeneratedItem {
    pub original_name: String,
    pub final_name: String,
    /// Where the thumbnail was written, when one was produced
    pub output_path: Option<String>,
    pub source: String,
    pub status: String,
    pub size_bytes: u64,
    pub size: String,
    pub original_size: String,
    pub duration_ms: u64,
    pub description: String,
    pub tags: Vec<String>,
    pub error: Option<String>,
}

impl GeneratedItem {
    #[must_use]
    pub fn from_result(result: &ProcessingResult, output_path: Option<String>) -> Self {
        Self {
            original_name: result.original_name.clone(),
            final_name: result.final_name.clone(),
            output_path,
            source: result.source.to_string(),
            status: result.status.to_string(),
            size_bytes: result.size_bytes,
            size: format_bytes(result.size_bytes),
            original_size: format_bytes(result.original_size),
            duration_ms: result.duration_ms,
            description: result.description.clone(),
            tags: result.tags.clone(),
            error: result.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Facet)]
pub struct SkippedItem {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Facet)]
pub struct GenerateReport {
    pub output_dir: String,
    pub completed: u64,
    pub failed: u64,
    /// Thumbnails produced by the remote service
    pub remote: u64,
    pub items: Vec<GeneratedItem>,
    pub skipped: Vec<SkippedItem>,
}

impl GenerateReport {
    #[must_use]
    pub fn new(output_dir: String, items: Vec<GeneratedItem>, skipped: Vec<SkippedItem>) -> Self {
        let count = |status: ProcessingStatus| {
            items
                .iter()
                .filter(|i| i.status == status.to_string())
                .count() as u64
        };
        let completed = count(ProcessingStatus::Completed);
        let failed = count(ProcessingStatus::Error);
        let remote = items
            .iter()
            .filter(|i| {
                i.source == ProcessingSource::Remote.to_string()
                    && i.status == ProcessingStatus::Completed.to_string()
            })
            .count() as u64;
        Self {
            output_dir,
            completed,
            failed,
            remote,
            items,
            skipped,
        }
    }
}
