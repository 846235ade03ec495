//! Runs many item pipelines at once and folds their updates into one ordered event stream.
//!
//! Pipelines only ever send [`ItemUpdate`]s; a single aggregator task owns the result list,
//! the progress counter and the completion signal.

use crate::model::ImageFilters;
use crate::model::OutputConfig;
use crate::model::ProcessingResult;
use crate::model::ProcessingSource;
use crate::model::ProcessingStatus;
use crate::model::SourceAsset;
use crate::model::ThumbnailPayload;
use crate::model::file_stem;
use crate::model::final_name;
use crate::pipeline::ItemPipeline;
use crate::pipeline::ItemUpdate;
use crate::pipeline::PipelineStage;
use crate::pipeline::render_blocking;
use crate::telemetry::LogLevel;
use crate::telemetry::ServiceTag;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use tracing::info;
use tracing::warn;

#[derive(Clone, Debug, PartialEq)]
pub enum BatchEvent {
    Started { total: usize },
    ItemUpdated(ItemUpdate),
    /// `current` counts items that reached a terminal status
    Progress { current: usize, total: usize },
    /// Sent exactly once, last. Results are in input order.
    Completed { results: Vec<ProcessingResult> },
}

/// An already processed item handed back for local re-rendering
#[derive(Clone, Debug)]
pub struct RegenerateTarget {
    /// The original staged asset, when it is still available
    pub original: Option<SourceAsset>,
    pub previous: ProcessingResult,
}

#[derive(Clone, Debug)]
pub struct BatchOrchestrator {
    pipeline: ItemPipeline,
    max_concurrency: usize,
    settle_delay: Duration,
}

impl BatchOrchestrator {
    pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

    pub fn new(pipeline: ItemPipeline) -> Self {
        Self {
            pipeline,
            max_concurrency: Self::DEFAULT_MAX_CONCURRENCY,
            settle_delay: Self::DEFAULT_SETTLE_DELAY,
        }
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Pause between the last item settling and the completion event
    #[must_use]
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    #[must_use]
    pub fn pipeline(&self) -> &ItemPipeline {
        &self.pipeline
    }

    /// Start one pipeline per asset and return the event stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run_batch(
        &self,
        assets: Vec<SourceAsset>,
        config: OutputConfig,
    ) -> UnboundedReceiver<BatchEvent> {
        let config = config.normalized();
        let total = assets.len();
        let (events, rx) = mpsc::unbounded_channel();
        let (updates, update_rx) = mpsc::unbounded_channel();
        info!(
            total,
            remote = self.pipeline.remote_enabled(),
            format = %config.format,
            "Starting batch"
        );

        let expected_source = if self.pipeline.remote_enabled() {
            ProcessingSource::Remote
        } else {
            ProcessingSource::Local
        };
        let results = assets
            .iter()
            .map(|asset| ProcessingResult::started(asset, expected_source))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        for (index, asset) in assets.into_iter().enumerate() {
            let pipeline = self.pipeline.clone();
            let semaphore = semaphore.clone();
            let updates = updates.clone();
            tokio::spawn(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                pipeline.run(index, asset, config, &updates).await;
            });
        }
        drop(updates);

        let aggregator = Aggregator {
            results,
            pending: vec![true; total],
            settle_delay: self.settle_delay,
        };
        tokio::spawn(aggregator.run(update_rx, events));
        rx
    }

    /// Re-render existing results locally. The remote service is never contacted.
    ///
    /// The original asset is preferred over the previous thumbnail. Items in `Error` are
    /// passed through untouched and not counted in the progress total. A failed re-render
    /// keeps the previous result.
    pub fn regenerate_all(
        &self,
        targets: Vec<RegenerateTarget>,
        config: OutputConfig,
    ) -> UnboundedReceiver<BatchEvent> {
        let config = config.normalized();
        let (events, rx) = mpsc::unbounded_channel();
        let (updates, update_rx) = mpsc::unbounded_channel();
        let pending: Vec<bool> = targets
            .iter()
            .map(|t| t.previous.status != ProcessingStatus::Error)
            .collect();
        let results = targets.iter().map(|t| t.previous.clone()).collect();
        info!(
            total = pending.iter().filter(|p| **p).count(),
            format = %config.format,
            "Regenerating thumbnails"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        for (index, target) in targets.into_iter().enumerate() {
            if !pending[index] {
                continue;
            }
            let pipeline = self.pipeline.clone();
            let semaphore = semaphore.clone();
            let updates = updates.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                regenerate_one(&pipeline, index, target, config, &updates).await;
            });
        }
        drop(updates);

        let aggregator = Aggregator {
            results,
            pending,
            settle_delay: self.settle_delay,
        };
        tokio::spawn(aggregator.run(update_rx, events));
        rx
    }
}

async fn regenerate_one(
    pipeline: &ItemPipeline,
    index: usize,
    target: RegenerateTarget,
    config: OutputConfig,
    updates: &UnboundedSender<ItemUpdate>,
) {
    let started = Instant::now();
    let previous = target.previous;
    let source = match target.original {
        Some(original) => Ok(original),
        None => match previous.thumbnail.as_ref().map(ThumbnailPayload::to_bytes) {
            Some(Ok(bytes)) => Ok(SourceAsset::new(
                previous.original_name.clone(),
                config.format.mime_type(),
                bytes,
            )),
            Some(Err(e)) => Err(format!("stored thumbnail is unreadable: {e}")),
            None => Err("no original asset or thumbnail to render from".to_string()),
        },
    };
    let _ = updates.send(ItemUpdate {
        index,
        stage: PipelineStage::LocalRender,
        result: ProcessingResult {
            status: ProcessingStatus::Processing,
            ..previous.clone()
        },
    });

    let rendered = match source {
        Ok(asset) => render_blocking(asset, config, ImageFilters::IDENTITY)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e),
    };
    let result = match rendered {
        Ok(rendered) => {
            let mut result = previous;
            result.set_thumbnail(ThumbnailPayload::Binary(rendered.bytes));
            result.source = ProcessingSource::Local;
            result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            result.final_name = final_name(file_stem(&result.final_name), config.format);
            result.status = ProcessingStatus::Completed;
            result.error = None;
            debug!(name = %result.final_name, "Regenerated");
            result
        }
        Err(e) => {
            pipeline.telemetry().log(
                LogLevel::Warn,
                ServiceTag::OutputStore,
                format!("Regeneration of {} failed, keeping previous result: {e}", previous.final_name),
            );
            previous
        }
    };
    let _ = updates.send(ItemUpdate {
        index,
        stage: PipelineStage::Completed,
        result,
    });
}

/// Sole owner of a batch's result list
struct Aggregator {
    /// Seeded with a placeholder per item, so every input has an entry
    results: Vec<ProcessingResult>,
    /// Items still expected to reach a terminal status
    pending: Vec<bool>,
    settle_delay: Duration,
}

impl Aggregator {
    async fn run(
        mut self,
        mut updates: UnboundedReceiver<ItemUpdate>,
        events: UnboundedSender<BatchEvent>,
    ) {
        let total = self.pending.iter().filter(|p| **p).count();
        let mut current = 0;
        let _ = events.send(BatchEvent::Started { total });
        let _ = events.send(BatchEvent::Progress { current, total });

        while let Some(update) = updates.recv().await {
            let Some(slot) = self.results.get_mut(update.index) else {
                warn!(index = update.index, "Update for unknown item");
                continue;
            };
            *slot = update.result.clone();
            let terminal = update.result.status.is_terminal()
                && matches!(update.stage, PipelineStage::Completed | PipelineStage::Error);
            let _ = events.send(BatchEvent::ItemUpdated(update.clone()));
            if terminal && self.pending[update.index] {
                self.pending[update.index] = false;
                current += 1;
                let _ = events.send(BatchEvent::Progress { current, total });
            }
        }

        // every sender is gone; anything still pending was aborted
        for index in 0..self.pending.len() {
            if !self.pending[index] {
                continue;
            }
            self.pending[index] = false;
            let result = &mut self.results[index];
            if !result.status.is_terminal() {
                warn!(index, name = %result.original_name, "Item finished without a terminal result");
                result.status = ProcessingStatus::Error;
                result.error = Some("pipeline aborted".to_string());
            }
            let result = result.clone();
            let _ = events.send(BatchEvent::ItemUpdated(ItemUpdate {
                index,
                stage: PipelineStage::Error,
                result,
            }));
            current += 1;
            let _ = events.send(BatchEvent::Progress { current, total });
        }

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        let results = self.results;
        info!(
            total,
            completed = results
                .iter()
                .filter(|r| r.status == ProcessingStatus::Completed)
                .count(),
            "Batch finished"
        );
        let _ = events.send(BatchEvent::Completed { results });
    }
}
