use crate::app_home::APP_HOME;
use crate::batch::BatchEvent;
use crate::batch::BatchOrchestrator;
use crate::cache::CACHE_HOME;
use crate::cli::arbitrary_values;
use crate::cli::command::generate::generate_report::GenerateReport;
use crate::cli::command::generate::generate_report::GeneratedItem;
use crate::cli::command::generate::generate_report::SkippedItem;
use crate::cli::format_arg::FormatArg;
use crate::cli::output_mode::OutputMode;
use crate::cli::tagging_key::resolve_tagging_api_key;
use crate::cli::to_args::ToArgs;
use crate::model::OutputConfig;
use crate::model::OutputFormat;
use crate::model::ProcessingResult;
use crate::model::ProcessingStatus;
use crate::model::file_stem;
use crate::pipeline::ItemPipeline;
use crate::remote::OffloadClient;
use crate::remote::s3::S3Store;
use crate::remote::settings::RemoteSettings;
use crate::staging;
use crate::tagging::GeminiTagger;
use crate::tagging::OfflineTagger;
use crate::tagging::Tagger;
use crate::telemetry::Telemetry;
use arbitrary::Arbitrary;
use clap::Args;
use facet_pretty::FacetPretty;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

const DEFAULT_OUT_DIR: &str = "thumbnails";

/// Generate thumbnails for files, directories or glob patterns
#[derive(Args, Arbitrary, Clone, PartialEq, Debug)]
pub struct GenerateArgs {
    /// Files, directories or glob patterns to process
    #[clap(required = true)]
    #[arbitrary(with = arbitrary_values::image_paths)]
    pub inputs: Vec<String>,

    /// Output image format
    #[clap(long, value_enum, default_value_t = FormatArg::Webp)]
    pub format: FormatArg,

    /// Target width in pixels
    #[clap(long, default_value_t = 300, value_parser = clap::value_parser!(u32).range(1..))]
    #[arbitrary(with = arbitrary_values::width)]
    pub max_width: u32,

    /// Custom encoder quality in [0.1, 1.0]; the default quality is used when absent
    #[clap(long)]
    #[arbitrary(with = arbitrary_values::optional_fraction)]
    pub quality: Option<f32>,

    /// Resolution reduction strength in [0.1, 0.9]; no reduction when absent
    #[clap(long)]
    #[arbitrary(with = arbitrary_values::optional_fraction)]
    pub compression: Option<f32>,

    /// Directory the thumbnails are written to (default: ./thumbnails)
    #[clap(long)]
    #[arbitrary(with = arbitrary_values::optional_dir)]
    pub out_dir: Option<PathBuf>,

    /// Render everything locally even when remote mode is enabled
    #[clap(long)]
    pub no_remote: bool,

    /// Skip the tagging service and name files after their originals
    #[clap(long)]
    pub no_tagging: bool,

    /// Maximum number of items processed at once
    #[clap(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..))]
    #[arbitrary(with = arbitrary_values::concurrency)]
    pub concurrency: u32,

    /// Output mode: auto|json|pretty
    #[clap(long, value_enum, default_value_t = OutputMode::Auto)]
    pub output: OutputMode,
}

impl GenerateArgs {
    /// # Errors
    ///
    /// Returns an error if staging fails, the output directory cannot be written or the
    /// report cannot be printed.
    pub fn invoke(self) -> eyre::Result<()> {
        tokio::runtime::Runtime::new()?.block_on(async move {
            let report = self.generate().await?;
            match self.output.resolve() {
                OutputMode::Json => {
                    let json = facet_json::to_string(&report)
                        .map_err(|e| eyre::eyre!("Failed to serialize report: {}", e))?;
                    println!("{}", json);
                }
                _ => {
                    println!("{}", report.pretty());
                }
            }
            eyre::Ok(())
        })?;
        Ok(())
    }

    #[must_use]
    pub fn output_config(&self) -> OutputConfig {
        let format: OutputFormat = self.format.into();
        if self.quality.is_some() && !format.is_lossy() {
            warn!(%format, "Quality has no effect on lossless output");
        }
        OutputConfig {
            format,
            max_width: self.max_width,
            use_custom_quality: self.quality.is_some(),
            quality: self.quality.unwrap_or(OutputConfig::default().quality),
            use_compression: self.compression.is_some(),
            compression: self.compression.unwrap_or(OutputConfig::default().compression),
        }
        .normalized()
    }

    fn tagger(&self) -> Arc<dyn Tagger> {
        if self.no_tagging {
            return Arc::new(OfflineTagger);
        }
        match resolve_tagging_api_key(&APP_HOME) {
            Some(key) => Arc::new(GeminiTagger::new(key).with_cache(CACHE_HOME.clone())),
            None => {
                info!("No tagging API key configured, naming thumbnails after their originals");
                Arc::new(OfflineTagger)
            }
        }
    }

    fn offload_client(&self) -> eyre::Result<Option<OffloadClient>> {
        if self.no_remote {
            return Ok(None);
        }
        let settings = RemoteSettings::load(&APP_HOME)?;
        if !settings.is_ready() {
            debug!("Remote mode not enabled, rendering locally");
            return Ok(None);
        }
        match S3Store::new(&settings) {
            Ok(store) => Ok(Some(OffloadClient::new(
                Arc::new(store),
                settings.input_bucket.clone(),
                settings.output_bucket.clone(),
            ))),
            Err(e) => {
                warn!("Remote store unavailable, rendering locally: {}", e);
                Ok(None)
            }
        }
    }

    async fn generate(&self) -> eyre::Result<GenerateReport> {
        let telemetry = Arc::new(Telemetry::default());
        let staged = staging::stage(&self.inputs, &telemetry)?;
        let skipped = staged
            .skipped
            .iter()
            .map(|s| SkippedItem {
                path: s.path.display().to_string(),
                reason: s.reason.clone(),
            })
            .collect();
        let out_dir = self
            .out_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR));

        let cancel = CancellationToken::new();
        let ctrl_c = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling in-flight items");
                    cancel.cancel();
                }
            }
        });

        let pipeline = ItemPipeline::new(self.tagger(), telemetry.clone())
            .with_offload(self.offload_client()?)
            .with_cancellation(cancel);
        let orchestrator =
            BatchOrchestrator::new(pipeline).with_max_concurrency(self.concurrency as usize);
        let mut events = orchestrator.run_batch(staged.assets, self.output_config());

        let mut results = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                BatchEvent::Started { total } => info!(total, "Generating thumbnails"),
                BatchEvent::ItemUpdated(update) => {
                    debug!(index = update.index, stage = %update.stage, name = %update.result.original_name, "Item update");
                }
                BatchEvent::Progress { current, total } => info!("Progress {}/{}", current, total),
                BatchEvent::Completed { results: finished } => results = finished,
            }
        }
        ctrl_c.abort();

        let items = write_thumbnails(&out_dir, &results)?;
        Ok(GenerateReport::new(
            out_dir.display().to_string(),
            items,
            skipped,
        ))
    }
}

/// Write completed thumbnails under their final names, suffixing duplicates with `_2`, `_3`...
fn write_thumbnails(out_dir: &Path, results: &[ProcessingResult]) -> eyre::Result<Vec<GeneratedItem>> {
    let mut used = HashSet::new();
    let mut items = Vec::with_capacity(results.len());
    for result in results {
        let Some(payload) = result
            .thumbnail
            .as_ref()
            .filter(|_| result.status == ProcessingStatus::Completed)
        else {
            items.push(GeneratedItem::from_result(result, None));
            continue;
        };
        std::fs::create_dir_all(out_dir)?;
        let name = unique_name(&result.final_name, &mut used);
        let path = out_dir.join(&name);
        let bytes = payload
            .to_bytes()
            .map_err(|e| eyre::eyre!("Thumbnail for {} is not valid base64: {}", result.original_name, e))?;
        std::fs::write(&path, bytes)?;
        debug!(path = %path.display(), "Wrote thumbnail");
        items.push(GeneratedItem::from_result(
            result,
            Some(path.display().to_string()),
        ));
    }
    Ok(items)
}

fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.to_string()) {
        return name.to_string();
    }
    let stem = file_stem(name);
    let ext = name.strip_prefix(stem).unwrap_or_default();
    let mut n = 2;
    loop {
        let candidate = format!("{stem}_{n}{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

impl ToArgs for GenerateArgs {
    fn to_args(&self) -> Vec<OsString> {
        let mut rtn = vec![];
        if self.format != FormatArg::Webp {
            rtn.push(OsString::from("--format"));
            rtn.push(OsString::from(self.format.to_string()));
        }
        if self.max_width != 300 {
            rtn.push(OsString::from("--max-width"));
            rtn.push(OsString::from(self.max_width.to_string()));
        }
        if let Some(quality) = self.quality {
            rtn.push(OsString::from("--quality"));
            rtn.push(OsString::from(quality.to_string()));
        }
        if let Some(compression) = self.compression {
            rtn.push(OsString::from("--compression"));
            rtn.push(OsString::from(compression.to_string()));
        }
        if let Some(out_dir) = &self.out_dir {
            rtn.push(OsString::from("--out-dir"));
            rtn.push(out_dir.into());
        }
        if self.no_remote {
            rtn.push(OsString::from("--no-remote"));
        }
        if self.no_tagging {
            rtn.push(OsString::from("--no-tagging"));
        }
        if self.concurrency != 8 {
            rtn.push(OsString::from("--concurrency"));
            rtn.push(OsString::from(self.concurrency.to_string()));
        }
        if self.output != OutputMode::Auto {
            rtn.push(OsString::from("--output"));
            rtn.push(OsString::from(self.output.to_string()));
        }
        // positionals after the separator
        rtn.push(OsString::from("--"));
        for input in &self.inputs {
            rtn.push(OsString::from(input));
        }
        rtn
    }
}
