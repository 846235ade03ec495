//! Per-item state machine: tagging, optional remote offload, local fallback, finalize.
//!
//! Every stage change is published to the caller's sink as a full copy of the item's result;
//! nothing else is mutated.

use crate::model::ImageFilters;
use crate::model::OutputConfig;
use crate::model::ProcessingResult;
use crate::model::ProcessingSource;
use crate::model::ProcessingStatus;
use crate::model::SourceAsset;
use crate::model::ThumbnailPayload;
use crate::model::final_name;
use crate::remote::OffloadClient;
use crate::remote::OffloadError;
use crate::tagging::TagAnalysis;
use crate::tagging::Tagger;
use crate::telemetry::LogLevel;
use crate::telemetry::ServiceTag;
use crate::telemetry::Telemetry;
use crate::transform;
use crate::transform::RenderError;
use crate::transform::RenderedThumbnail;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Staged,
    Tagging,
    Offloading,
    LocalRender,
    Completed,
    Error,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Staged => write!(f, "staged"),
            Self::Tagging => write!(f, "tagging"),
            Self::Offloading => write!(f, "offloading"),
            Self::LocalRender => write!(f, "local-render"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of one item, sent on every stage change
#[derive(Clone, Debug, PartialEq)]
pub struct ItemUpdate {
    /// Position of the asset in its batch
    pub index: usize,
    pub stage: PipelineStage,
    pub result: ProcessingResult,
}

/// Unique input key for one run: millisecond timestamp, a short random part and the name.
#[must_use]
pub fn offload_key(name: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let short = Uuid::new_v4().simple().to_string();
    let safe: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') || c.is_control() { '_' } else { c })
        .collect();
    format!("{millis}-{}-{safe}", &short[..8])
}

/// Decode and render on the blocking pool.
pub async fn render_blocking(
    asset: SourceAsset,
    config: OutputConfig,
    filters: ImageFilters,
) -> Result<RenderedThumbnail, RenderError> {
    tokio::task::spawn_blocking(move || transform::render(asset.bytes(), &config, &filters))
        .await
        .map_err(|e| RenderError::Unavailable(format!("render task failed: {e}")))?
}

/// Runs items through the state machine. Cheap to clone; clones share the tagger, offload
/// client, telemetry and cancellation token.
#[derive(Clone)]
pub struct ItemPipeline {
    tagger: Arc<dyn Tagger>,
    offload: Option<OffloadClient>,
    telemetry: Arc<Telemetry>,
    cancel: CancellationToken,
}

impl fmt::Debug for ItemPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemPipeline")
            .field("offload", &self.offload)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ItemPipeline {
    pub fn new(tagger: Arc<dyn Tagger>, telemetry: Arc<Telemetry>) -> Self {
        Self {
            tagger,
            offload: None,
            telemetry,
            cancel: CancellationToken::new(),
        }
    }

    /// Enable the remote path. `None` keeps every item local.
    #[must_use]
    pub fn with_offload(mut self, offload: Option<OffloadClient>) -> Self {
        self.offload = offload;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    #[must_use]
    pub fn remote_enabled(&self) -> bool {
        self.offload.is_some()
    }

    /// Process one asset to a terminal result. Never returns a result in `Processing`.
    pub async fn run(
        &self,
        index: usize,
        asset: SourceAsset,
        config: OutputConfig,
        sink: &UnboundedSender<ItemUpdate>,
    ) -> ProcessingResult {
        let started = Instant::now();
        let expected = if self.offload.is_some() {
            ProcessingSource::Remote
        } else {
            ProcessingSource::Local
        };
        let mut result = ProcessingResult::started(&asset, expected);
        publish(sink, index, PipelineStage::Staged, &result);

        // Tagging is best-effort
        publish(sink, index, PipelineStage::Tagging, &result);
        let analysis = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return self.fail(index, &mut result, started, "cancelled during tagging", sink);
            }
            analysis = self.tagger.analyze(&asset) => analysis,
        };
        let analysis = match analysis {
            Ok(analysis) => {
                self.telemetry.log(
                    LogLevel::Info,
                    ServiceTag::Tagging,
                    format!("Analysis complete for {}", asset.name),
                );
                analysis
            }
            Err(e) => {
                self.telemetry.log(
                    LogLevel::Warn,
                    ServiceTag::Tagging,
                    format!("Analysis failed for {}, using defaults: {e}", asset.name),
                );
                TagAnalysis::degraded(&asset.name)
            }
        };
        let base = if analysis.suggested_name.trim().is_empty() {
            asset.stem().to_string()
        } else {
            analysis.suggested_name
        };
        result.description = analysis.description;
        result.tags = analysis.tags;
        result.final_name = final_name(&base, config.format);

        if let Some(offload) = &self.offload {
            publish(sink, index, PipelineStage::Offloading, &result);
            match self.attempt_remote(offload, &asset).await {
                Ok(payload) => {
                    result.source = ProcessingSource::Remote;
                    result.set_thumbnail(payload);
                    return self.complete(index, &mut result, started, sink);
                }
                Err(OffloadError::Cancelled) => {
                    return self.fail(index, &mut result, started, "cancelled during offload", sink);
                }
                Err(e) => {
                    self.telemetry.log(
                        LogLevel::Warn,
                        ServiceTag::OutputStore,
                        format!("Remote processing failed for {}, rendering locally: {e}", asset.name),
                    );
                }
            }
        }

        result.source = ProcessingSource::Local;
        publish(sink, index, PipelineStage::LocalRender, &result);
        let rendered = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return self.fail(index, &mut result, started, "cancelled during local render", sink);
            }
            rendered = render_blocking(asset.clone(), config, ImageFilters::IDENTITY) => rendered,
        };
        match rendered {
            Ok(rendered) => {
                result.set_thumbnail(ThumbnailPayload::Binary(rendered.bytes));
                self.complete(index, &mut result, started, sink)
            }
            Err(e) => {
                let message = format!("Local render failed for {}: {e}", asset.name);
                self.fail(index, &mut result, started, &message, sink)
            }
        }
    }

    /// Upload then poll. Upload failures are logged against the input store, poll failures
    /// against the output store.
    async fn attempt_remote(
        &self,
        offload: &OffloadClient,
        asset: &SourceAsset,
    ) -> Result<ThumbnailPayload, OffloadError> {
        let key = offload_key(&asset.name);
        let remote_started = Instant::now();
        let upload = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(OffloadError::Cancelled),
            upload = offload.upload(asset, &key) => upload,
        };
        if let Err(e) = upload {
            if !matches!(e, OffloadError::Cancelled) {
                self.telemetry.log(
                    LogLevel::Error,
                    ServiceTag::InputStore,
                    format!("Upload of {key} failed: {e}"),
                );
            }
            return Err(e);
        }
        self.telemetry.log(
            LogLevel::Info,
            ServiceTag::InputStore,
            format!("Uploaded {key} to {}", offload.input_bucket()),
        );

        match offload.await_derived_default(&key, &self.cancel).await {
            Ok(payload) => {
                let elapsed = elapsed_ms(remote_started);
                self.telemetry.record_invocation(elapsed, false);
                self.telemetry.log(
                    LogLevel::Info,
                    ServiceTag::OutputStore,
                    format!(
                        "Thumbnail {} received in {elapsed} ms",
                        OffloadClient::derived_key(&key)
                    ),
                );
                Ok(payload)
            }
            Err(e) => {
                if !matches!(e, OffloadError::Cancelled) {
                    self.telemetry.log(
                        LogLevel::Error,
                        ServiceTag::OutputStore,
                        format!(
                            "Waiting for {} failed: {e}",
                            OffloadClient::derived_key(&key)
                        ),
                    );
                }
                Err(e)
            }
        }
    }

    fn complete(
        &self,
        index: usize,
        result: &mut ProcessingResult,
        started: Instant,
        sink: &UnboundedSender<ItemUpdate>,
    ) -> ProcessingResult {
        result.status = ProcessingStatus::Completed;
        result.duration_ms = elapsed_ms(started);
        self.telemetry.log(
            LogLevel::Info,
            ServiceTag::OutputStore,
            format!(
                "{} completed ({}, {} bytes, {} ms)",
                result.final_name, result.source, result.size_bytes, result.duration_ms
            ),
        );
        publish(sink, index, PipelineStage::Completed, result);
        result.clone()
    }

    fn fail(
        &self,
        index: usize,
        result: &mut ProcessingResult,
        started: Instant,
        message: &str,
        sink: &UnboundedSender<ItemUpdate>,
    ) -> ProcessingResult {
        result.status = ProcessingStatus::Error;
        result.duration_ms = elapsed_ms(started);
        result.error = Some(message.to_string());
        self.telemetry
            .log(LogLevel::Error, ServiceTag::OutputStore, message.to_string());
        publish(sink, index, PipelineStage::Error, result);
        result.clone()
    }
}

fn publish(
    sink: &UnboundedSender<ItemUpdate>,
    index: usize,
    stage: PipelineStage,
    result: &ProcessingResult,
) {
    debug!(index, stage = %stage, name = %result.original_name, "Pipeline stage");
    // a dropped receiver only means nobody is watching
    let _ = sink.send(ItemUpdate {
        index,
        stage,
        result: result.clone(),
    });
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
