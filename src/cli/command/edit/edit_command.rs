use crate::cli::arbitrary_values;
use crate::cli::format_arg::FormatArg;
use crate::cli::output_mode::OutputMode;
use crate::cli::to_args::ToArgs;
use crate::history::EditHistory;
use crate::model::ImageFilters;
use crate::model::OutputConfig;
use crate::model::ProcessingResult;
use crate::model::ProcessingSource;
use crate::model::ProcessingStatus;
use crate::model::format_bytes;
use crate::staging;
use crate::telemetry::Telemetry;
use crate::transform;
use arbitrary::Arbitrary;
use clap::Args;
use facet::Facet;
use facet_pretty::FacetPretty;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::debug;

/// Adjust one image with undoable edits and save the result
#[derive(Args, Arbitrary, Clone, PartialEq, Debug)]
pub struct EditArgs {
    /// Image to edit
    #[arbitrary(with = arbitrary_values::image_path)]
    pub input: String,

    /// Brightness percentage (100 = unchanged)
    #[clap(long)]
    #[arbitrary(with = arbitrary_values::optional_percent)]
    pub brightness: Option<f32>,

    /// Contrast percentage (100 = unchanged)
    #[clap(long)]
    #[arbitrary(with = arbitrary_values::optional_percent)]
    pub contrast: Option<f32>,

    /// Saturation percentage (100 = unchanged)
    #[clap(long)]
    #[arbitrary(with = arbitrary_values::optional_percent)]
    pub saturation: Option<f32>,

    /// Rotate by this many degrees; each occurrence is its own history step
    #[clap(long = "rotate", allow_negative_numbers = true)]
    #[arbitrary(with = arbitrary_values::rotations)]
    pub rotate: Vec<i32>,

    /// Undo this many steps before saving
    #[clap(long, default_value_t = 0)]
    pub undo: u8,

    /// Output image format
    #[clap(long, value_enum, default_value_t = FormatArg::Png)]
    pub format: FormatArg,

    /// Target width in pixels
    #[clap(long, default_value_t = 300, value_parser = clap::value_parser!(u32).range(1..))]
    #[arbitrary(with = arbitrary_values::width)]
    pub max_width: u32,

    /// Output file (default: <stem>_edited.<ext> in the current directory)
    #[clap(long)]
    #[arbitrary(with = arbitrary_values::optional_dir)]
    pub out: Option<PathBuf>,

    /// Output mode: auto|json|pretty
    #[clap(long, value_enum, default_value_t = OutputMode::Auto)]
    pub output: OutputMode,
}

#[derive(Debug, Clone, PartialEq, Facet)]
pub struct EditReport {
    pub input: String,
    pub output_path: String,
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub rotation: i32,
    /// Snapshots recorded, including the initial one
    pub history_len: u64,
    pub history_index: u64,
    pub size_bytes: u64,
    pub size: String,
    /// Size the same output config gives with no filters applied
    pub unedited_size_bytes: u64,
}

impl EditArgs {
    /// # Errors
    ///
    /// Returns an error if the input cannot be staged, rendered or written.
    pub fn invoke(self) -> eyre::Result<()> {
        let report = self.edit()?;
        match self.output.resolve() {
            OutputMode::Json => {
                let json = facet_json::to_string(&report)
                    .map_err(|e| eyre::eyre!("Failed to serialize report: {}", e))?;
                println!("{}", json);
            }
            _ => println!("{}", report.pretty()),
        }
        Ok(())
    }

    /// Commit the photometric flags as one step, then each rotation as its own step.
    #[must_use]
    pub fn build_history(&self, opened_for: &ProcessingResult) -> EditHistory {
        let mut history = EditHistory::open(opened_for);
        if self.brightness.is_some() || self.contrast.is_some() || self.saturation.is_some() {
            let current = history.current();
            history.commit(ImageFilters {
                brightness: self.brightness.unwrap_or(current.brightness),
                contrast: self.contrast.unwrap_or(current.contrast),
                saturation: self.saturation.unwrap_or(current.saturation),
                ..current
            });
        }
        for degrees in &self.rotate {
            let next = history.current().rotated_by(*degrees);
            history.commit(next);
        }
        for _ in 0..self.undo {
            if !history.undo() {
                break;
            }
        }
        history
    }

    fn edit(&self) -> eyre::Result<EditReport> {
        let telemetry = Telemetry::default();
        let paths = staging::resolve_inputs(std::slice::from_ref(&self.input))?;
        let [path] = paths.as_slice() else {
            eyre::bail!(
                "Expected exactly one image for {}, found {}",
                self.input,
                paths.len()
            );
        };
        let staged = staging::stage_paths(std::slice::from_ref(path), &telemetry);
        let Some(original) = staged.assets.into_iter().next() else {
            let reason = staged
                .skipped
                .first()
                .map(|s| s.reason.clone())
                .unwrap_or_default();
            eyre::bail!("Could not stage {}: {}", path.display(), reason);
        };

        let config = OutputConfig {
            format: self.format.into(),
            max_width: self.max_width,
            ..OutputConfig::default()
        }
        .normalized();
        let mut opened = ProcessingResult::started(&original, ProcessingSource::Local);
        opened.status = ProcessingStatus::Completed;
        opened.final_name = format!("{}_edited", original.stem());

        let history = self.build_history(&opened);
        debug!(
            index = history.index(),
            len = history.len(),
            "Edit history built"
        );
        let saved = history.save(&original, &opened, &config)?;

        let out = self
            .out
            .clone()
            .unwrap_or_else(|| PathBuf::from(&saved.final_name));
        if let Some(parent) = out.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = match &saved.thumbnail {
            Some(payload) => payload
                .to_bytes()
                .map_err(|e| eyre::eyre!("Rendered thumbnail unreadable: {}", e))?,
            None => eyre::bail!("Nothing was rendered for {}", original.name),
        };
        std::fs::write(&out, bytes)?;

        let filters = history.current();
        Ok(EditReport {
            input: path.display().to_string(),
            output_path: out.display().to_string(),
            brightness: filters.brightness,
            contrast: filters.contrast,
            saturation: filters.saturation,
            rotation: filters.rotation,
            history_len: history.len() as u64,
            history_index: history.index() as u64,
            size_bytes: saved.size_bytes,
            size: format_bytes(saved.size_bytes),
            unedited_size_bytes: transform::estimate_size(original.bytes(), &config),
        })
    }
}

impl ToArgs for EditArgs {
    fn to_args(&self) -> Vec<OsString> {
        let mut rtn = vec![];
        if let Some(b) = self.brightness {
            rtn.push(OsString::from("--brightness"));
            rtn.push(OsString::from(b.to_string()));
        }
        if let Some(c) = self.contrast {
            rtn.push(OsString::from("--contrast"));
            rtn.push(OsString::from(c.to_string()));
        }
        if let Some(s) = self.saturation {
            rtn.push(OsString::from("--saturation"));
            rtn.push(OsString::from(s.to_string()));
        }
        for degrees in &self.rotate {
            rtn.push(OsString::from(format!("--rotate={degrees}")));
        }
        if self.undo != 0 {
            rtn.push(OsString::from("--undo"));
            rtn.push(OsString::from(self.undo.to_string()));
        }
        if self.format != FormatArg::Png {
            rtn.push(OsString::from("--format"));
            rtn.push(OsString::from(self.format.to_string()));
        }
        if self.max_width != 300 {
            rtn.push(OsString::from("--max-width"));
            rtn.push(OsString::from(self.max_width.to_string()));
        }
        if let Some(out) = &self.out {
            rtn.push(OsString::from("--out"));
            rtn.push(out.into());
        }
        if self.output != OutputMode::Auto {
            rtn.push(OsString::from("--output"));
            rtn.push(OsString::from(self.output.to_string()));
        }
        rtn.push(OsString::from("--"));
        rtn.push(OsString::from(&self.input));
        rtn
    }
}
