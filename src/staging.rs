//! Stage source assets from paths, directories and glob patterns.

use crate::model::SourceAsset;
use crate::telemetry::LogLevel;
use crate::telemetry::ServiceTag;
use crate::telemetry::Telemetry;
use glob::glob;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::warn;

/// Files above this size are not staged
pub const MAX_STAGED_BYTES: u64 = 10 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff", "tif"];

#[must_use]
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// MIME type from the file extension
#[must_use]
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tiff" | "tif" => "image/tiff",
        _ => "application/octet-stream",
    }
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

/// Expand inputs into a sorted, de-duplicated list of image files.
///
/// Inputs containing glob metacharacters are treated as patterns; directories are walked
/// recursively. Non-image files are dropped.
///
/// # Errors
///
/// Returns an error if a pattern is invalid, an explicit path does not exist or a directory
/// cannot be read.
pub fn resolve_inputs(inputs: &[String]) -> eyre::Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();
    for input in inputs {
        if is_glob_pattern(input) {
            for entry in glob(input)? {
                let p = entry.map_err(|e| eyre::eyre!("Glob pattern error: {}", e))?;
                add_path(&p, &mut found)?;
            }
        } else {
            let p = PathBuf::from(input);
            if !p.exists() {
                eyre::bail!("Input does not exist: {}", p.display());
            }
            add_path(&p, &mut found)?;
        }
    }
    Ok(found.into_iter().collect())
}

fn add_path(path: &Path, out: &mut BTreeSet<PathBuf>) -> eyre::Result<()> {
    if path.is_dir() {
        add_files_from_dir(path, out)
    } else {
        if path.is_file() && is_image_file(path) {
            out.insert(dunce::canonicalize(path)?);
        }
        Ok(())
    }
}

fn add_files_from_dir(dir: &Path, out: &mut BTreeSet<PathBuf>) -> eyre::Result<()> {
    for entry in fs::read_dir(dir)? {
        match entry {
            Ok(ent) => add_path(&ent.path(), out)?,
            Err(e) => {
                warn!("Failed to read dir entry in {}: {}", dir.display(), e);
            }
        }
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedInput {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct StagingReport {
    pub assets: Vec<SourceAsset>,
    pub skipped: Vec<SkippedInput>,
}

/// Read each file into a [`SourceAsset`]. Oversized and unreadable files are skipped and
/// reported against the input store.
pub fn stage_paths(paths: &[PathBuf], telemetry: &Telemetry) -> StagingReport {
    let mut report = StagingReport::default();
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let skip = |reason: String, report: &mut StagingReport| {
            telemetry.log(
                LogLevel::Warn,
                ServiceTag::InputStore,
                format!("Skipping {name}: {reason}"),
            );
            report.skipped.push(SkippedInput {
                path: path.clone(),
                reason,
            });
        };
        match fs::metadata(path) {
            Ok(meta) if meta.len() > MAX_STAGED_BYTES => {
                skip(
                    format!(
                        "{} exceeds the {} limit",
                        crate::model::format_bytes(meta.len()),
                        crate::model::format_bytes(MAX_STAGED_BYTES)
                    ),
                    &mut report,
                );
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                skip(e.to_string(), &mut report);
                continue;
            }
        }
        match fs::read(path) {
            Ok(bytes) => {
                debug!(path = %path.display(), size = bytes.len(), "Staged");
                report
                    .assets
                    .push(SourceAsset::new(name.clone(), mime_type_for(path), bytes));
            }
            Err(e) => skip(e.to_string(), &mut report),
        }
    }
    report
}

/// Resolve then stage.
///
/// # Errors
///
/// Returns an error if resolving the inputs fails.
pub fn stage(inputs: &[String], telemetry: &Telemetry) -> eyre::Result<StagingReport> {
    let paths = resolve_inputs(inputs)?;
    Ok(stage_paths(&paths, telemetry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn resolves_globs_and_dirs_recursively() -> eyre::Result<()> {
        let td = tempdir()?;
        let dir = td.path().join("d1");
        fs::create_dir_all(dir.join("sub"))?;
        File::create(dir.join("a.png"))?;
        File::create(dir.join("sub").join("b.JPG"))?;
        File::create(dir.join("notes.txt"))?;
        File::create(td.path().join("c.webp"))?;

        let files = resolve_inputs(&[
            dir.display().to_string(),
            format!("{}/*.webp", td.path().display()),
            // duplicates collapse
            dir.join("a.png").display().to_string(),
        ])?;
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.len(), 3);
        assert!(names.contains(&"a.png".to_string()));
        assert!(names.contains(&"b.JPG".to_string()));
        assert!(names.contains(&"c.webp".to_string()));
        Ok(())
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        assert!(resolve_inputs(&["/definitely/not/here.png".to_string()]).is_err());
    }

    #[test]
    fn oversized_files_are_skipped_with_warning() -> eyre::Result<()> {
        let td = tempdir()?;
        let small = td.path().join("small.png");
        let big = td.path().join("big.png");
        fs::write(&small, [1u8, 2, 3])?;
        let f = File::create(&big)?;
        f.set_len(MAX_STAGED_BYTES + 1)?;

        let telemetry = Telemetry::default();
        let report = stage_paths(&[small, big.clone()], &telemetry);
        assert_eq!(report.assets.len(), 1);
        assert_eq!(report.assets[0].name, "small.png");
        assert_eq!(report.assets[0].mime_type, "image/png");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].path, big);
        let logs = telemetry.logs();
        assert_eq!(logs[0].level, LogLevel::Warn);
        assert_eq!(logs[0].service, ServiceTag::InputStore);
        Ok(())
    }

    #[test]
    fn mime_types_follow_extension() {
        assert_eq!(mime_type_for(Path::new("x.JPEG")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("x.tif")), "image/tiff");
        assert!(!is_image_file(Path::new("x.txt")));
        assert!(is_image_file(Path::new("x.Png")));
    }
}
