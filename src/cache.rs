//! Tagging response cache.
//!
//! Stores raw tagging responses keyed by a hash of model + image bytes to:
//! - Avoid paying for the same analysis twice
//! - Allow diagnosis of parse failures by examining stored plaintext

use directories_next::ProjectDirs;
use once_cell::sync::Lazy;
use sha2::Digest;
use sha2::Sha256;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::warn;

/// The cache home directory.
pub static CACHE_HOME: Lazy<CacheHome> = Lazy::new(|| match CacheHome::resolve() {
    Ok(c) => c,
    Err(e) => {
        warn!("Failed to resolve cache home: {}", e);
        CacheHome(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
});

#[derive(Clone, Debug)]
pub struct CacheHome(pub PathBuf);

impl CacheHome {
    /// Resolve the CacheHome according to:
    /// * If `CLOUDTHUMB_CACHE_DIR` env var is set, use that directory
    /// * Otherwise use the platform `ProjectDirs::cache_dir()` for teamdman/cloudthumb
    pub fn resolve() -> eyre::Result<CacheHome> {
        if let Ok(override_dir) = std::env::var("CLOUDTHUMB_CACHE_DIR") {
            return Ok(CacheHome(PathBuf::from(override_dir)));
        }
        if let Some(pd) = ProjectDirs::from("", "teamdman", "cloudthumb") {
            Ok(CacheHome(pd.cache_dir().to_path_buf()))
        } else {
            Err(eyre::eyre!("Could not determine cache directory"))
        }
    }

    /// Returns the path to the tagging responses subdirectory.
    pub fn tagging_dir(&self) -> PathBuf {
        self.0.join("tagging_responses")
    }

    /// Entry for a model + image pair.
    pub fn entry_for(&self, model: &str, image: &[u8]) -> CacheEntry {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(image);
        let hash = hex::encode(hasher.finalize());
        // first 16 chars keep paths short
        CacheEntry {
            dir: self.tagging_dir().join(&hash[..16]),
        }
    }
}

impl std::ops::Deref for CacheHome {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.0.as_path()
    }
}

#[derive(Debug)]
pub struct CacheEntry {
    pub dir: PathBuf,
}

impl CacheEntry {
    pub fn response_path(&self) -> PathBuf {
        self.dir.join("response.txt")
    }

    pub fn timestamps_path(&self) -> PathBuf {
        self.dir.join("timestamps.txt")
    }

    pub fn exists(&self) -> bool {
        self.response_path().exists()
    }

    /// Read the cached response body if it exists.
    pub fn read(&self) -> eyre::Result<Option<String>> {
        if !self.exists() {
            return Ok(None);
        }

        let body = std::fs::read_to_string(self.response_path())?;
        self.append_timestamp()?;

        debug!(cache_dir = %self.dir.display(), "Cache hit");
        Ok(Some(body))
    }

    pub fn write(&self, body: &str) -> eyre::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.response_path(), body)?;
        self.append_timestamp()?;

        debug!(cache_dir = %self.dir.display(), "Cached response");
        Ok(())
    }

    fn append_timestamp(&self) -> eyre::Result<()> {
        use std::fs::OpenOptions;
        use std::io::Write;

        let timestamp = chrono::Utc::now().to_rfc3339();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.timestamps_path())?;
        writeln!(file, "{}", timestamp)?;
        Ok(())
    }
}

/// Entries that `clean_cache` would remove
pub fn list_entries(home: &CacheHome) -> eyre::Result<Vec<PathBuf>> {
    let dir = home.tagging_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.is_dir() {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

/// Remove every cached tagging response.
pub fn clean_cache(home: &CacheHome) -> eyre::Result<CleanResult> {
    let cache_dir = home.tagging_dir();
    let mut result = CleanResult::default();

    for path in list_entries(home)? {
        std::fs::remove_dir_all(&path)?;
        result.entries_removed += 1;
    }

    if cache_dir.exists() && std::fs::read_dir(&cache_dir)?.next().is_none() {
        std::fs::remove_dir(&cache_dir)?;
    }

    Ok(result)
}

#[derive(Debug, Default)]
pub struct CleanResult {
    pub entries_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_read_clean_cycle() -> eyre::Result<()> {
        let td = tempdir()?;
        let home = CacheHome(td.path().to_path_buf());

        let entry = home.entry_for("model-a", b"image bytes");
        assert_eq!(entry.read()?, None);
        entry.write("{\"ok\":true}")?;
        assert_eq!(entry.read()?.as_deref(), Some("{\"ok\":true}"));

        // same bytes under another model is a different entry
        assert!(!home.entry_for("model-b", b"image bytes").exists());

        assert_eq!(list_entries(&home)?.len(), 1);
        let result = clean_cache(&home)?;
        assert_eq!(result.entries_removed, 1);
        assert!(!home.tagging_dir().exists());
        Ok(())
    }

    #[test]
    fn clean_on_missing_dir_is_noop() -> eyre::Result<()> {
        let td = tempdir()?;
        let home = CacheHome(td.path().join("nope"));
        assert_eq!(clean_cache(&home)?.entries_removed, 0);
        Ok(())
    }
}
