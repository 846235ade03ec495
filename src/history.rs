//! Linear undo/redo over filter snapshots for one opened result.

use crate::model::ImageFilters;
use crate::model::OutputConfig;
use crate::model::ProcessingResult;
use crate::model::ProcessingSource;
use crate::model::ProcessingStatus;
use crate::model::SourceAsset;
use crate::model::ThumbnailPayload;
use crate::model::file_stem;
use crate::model::final_name;
use crate::transform;
use crate::transform::RenderError;
use std::time::Instant;
use tracing::debug;
use tracing::info;

#[derive(Clone, Debug, PartialEq)]
pub struct EditHistory {
    snapshots: Vec<ImageFilters>,
    index: usize,
}

impl Default for EditHistory {
    fn default() -> Self {
        Self {
            snapshots: vec![ImageFilters::IDENTITY],
            index: 0,
        }
    }
}

impl EditHistory {
    /// Fresh history for `result`: a single identity snapshot.
    #[must_use]
    pub fn open(result: &ProcessingResult) -> Self {
        debug!(name = %result.final_name, "Opening edit history");
        Self::default()
    }

    /// Record `filters` if they differ from the current snapshot. Any redo tail is dropped.
    ///
    /// Returns whether a snapshot was added.
    pub fn commit(&mut self, filters: ImageFilters) -> bool {
        if self.current() == filters {
            return false;
        }
        self.snapshots.truncate(self.index + 1);
        self.snapshots.push(filters);
        self.index += 1;
        true
    }

    /// Step back one snapshot; no-op at the start.
    pub fn undo(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        self.index -= 1;
        true
    }

    /// Step forward one snapshot; no-op at the end.
    pub fn redo(&mut self) -> bool {
        if self.index + 1 >= self.snapshots.len() {
            return false;
        }
        self.index += 1;
        true
    }

    #[must_use]
    pub fn current(&self) -> ImageFilters {
        self.snapshots[self.index]
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.snapshots.len()
    }

    /// Render the current snapshot from the original asset and return the updated result.
    ///
    /// The previous thumbnail is never used as input so lossy encodes do not compound.
    pub fn save(
        &self,
        original: &SourceAsset,
        previous: &ProcessingResult,
        config: &OutputConfig,
    ) -> Result<ProcessingResult, RenderError> {
        let started = Instant::now();
        let filters = self.current();
        let rendered = transform::render(original.bytes(), config, &filters)?;
        let mut result = previous.clone();
        result.set_thumbnail(ThumbnailPayload::Binary(rendered.bytes));
        result.source = ProcessingSource::Local;
        result.status = ProcessingStatus::Completed;
        result.error = None;
        result.final_name = final_name(file_stem(&previous.final_name), config.format);
        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            name = %result.final_name,
            rotation = filters.rotation,
            width = rendered.width,
            height = rendered.height,
            size = result.size_bytes,
            "Saved edit"
        );
        Ok(result)
    }
}
