use crate::app_home::AppHome;
use tracing::debug;
use tracing::warn;

pub const TAGGING_API_KEY_ENV: &str = "CLOUDTHUMB_TAGGING_API_KEY";
const TAGGING_API_KEY_FILE: &str = "tagging_api_key.txt";

/// The tagging API key from the environment, else from the config dir.
#[must_use]
pub fn resolve_tagging_api_key(home: &AppHome) -> Option<String> {
    if let Ok(key) = std::env::var(TAGGING_API_KEY_ENV)
        && !key.trim().is_empty()
    {
        debug!("Using tagging API key from {}", TAGGING_API_KEY_ENV);
        return Some(key.trim().to_string());
    }
    match home.read_text(TAGGING_API_KEY_FILE) {
        Ok(key) => {
            if key.is_some() {
                debug!("Using tagging API key from {}", TAGGING_API_KEY_FILE);
            }
            key
        }
        Err(e) => {
            warn!("Could not read {}: {}", TAGGING_API_KEY_FILE, e);
            None
        }
    }
}
