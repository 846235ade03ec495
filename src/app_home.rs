use directories_next::ProjectDirs;
use once_cell::sync::Lazy;
use std::env;
use std::ops::Deref;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use tracing::warn;

pub const CONFIG_DIR_ENV: &str = "CLOUDTHUMB_CONFIG_DIR";

/// Config directory holding the remote settings and the tagging key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppHome(pub PathBuf);

impl AppHome {
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }

    /// Trimmed contents of `name`, or `None` when the file is missing or blank.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read_text(&self, name: &str) -> eyre::Result<Option<String>> {
        let path = self.file_path(name);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    /// Write `name`, creating the directory first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn write_text(&self, name: &str, contents: &str) -> eyre::Result<()> {
        std::fs::create_dir_all(&self.0)?;
        let path = self.file_path(name);
        std::fs::write(&path, contents)?;
        debug!(path = %path.display(), "Wrote config file");
        Ok(())
    }

    /// `CLOUDTHUMB_CONFIG_DIR` when set, else the platform config dir.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no config directory.
    pub fn resolve() -> eyre::Result<AppHome> {
        if let Ok(override_dir) = env::var(CONFIG_DIR_ENV) {
            return Ok(AppHome(PathBuf::from(override_dir)));
        }
        ProjectDirs::from("", "teamdman", "cloudthumb")
            .map(|pd| AppHome(pd.config_dir().to_path_buf()))
            .ok_or_else(|| eyre::eyre!("Could not determine config directory"))
    }
}

impl Deref for AppHome {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.0.as_path()
    }
}

pub static APP_HOME: Lazy<AppHome> = Lazy::new(|| match AppHome::resolve() {
    Ok(a) => a,
    Err(e) => {
        warn!("Failed to resolve app home: {}", e);
        AppHome(env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
});
