//! Persisted remote-store settings and the connectivity check that gates enabling them.

use crate::app_home::AppHome;
use crate::remote::ObjectStore;
use crate::remote::StoreError;
use facet::Facet;
use std::path::PathBuf;
use tracing::info;
use tracing::warn;

const FILE_NAME: &str = "remote_settings.json";

#[derive(Clone, PartialEq, Eq, Facet)]
pub struct RemoteSettings {
    pub enabled: bool,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub input_bucket: String,
    pub output_bucket: String,
    /// Custom S3-compatible endpoint; AWS regional endpoint when absent
    pub endpoint: Option<String>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            region: Self::DEFAULT_REGION.to_string(),
            input_bucket: String::new(),
            output_bucket: String::new(),
            endpoint: None,
        }
    }
}

impl std::fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("enabled", &self.enabled)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &mask(&self.secret_access_key))
            .field("region", &self.region)
            .field("input_bucket", &self.input_bucket)
            .field("output_bucket", &self.output_bucket)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Keep the last four characters of a secret
#[must_use]
pub fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{tail}")
}

impl RemoteSettings {
    pub const DEFAULT_REGION: &'static str = "us-east-1";

    #[must_use]
    pub fn file_path(home: &AppHome) -> PathBuf {
        home.file_path(FILE_NAME)
    }

    /// Load from the config dir; missing or unreadable files give the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(home: &AppHome) -> eyre::Result<RemoteSettings> {
        let Some(text) = home.read_text(FILE_NAME)? else {
            return Ok(RemoteSettings::default());
        };
        match facet_json::from_str::<RemoteSettings>(&text) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!(
                    "Invalid {}: {}, using defaults",
                    Self::file_path(home).display(),
                    e
                );
                Ok(RemoteSettings::default())
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, home: &AppHome) -> eyre::Result<()> {
        let json = facet_json::to_string(self)
            .map_err(|e| eyre::eyre!("Failed to serialize remote settings: {}", e))?;
        home.write_text(FILE_NAME, &json)
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.access_key_id.trim().is_empty() && !self.secret_access_key.trim().is_empty()
    }

    /// Enabled with credentials present: pipelines should attempt offload.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.enabled && self.has_credentials()
    }

    #[must_use]
    pub fn resolved_endpoint(&self) -> String {
        match self.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => endpoint.trim_end_matches('/').to_string(),
            _ => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

/// Why remote mode could not be enabled, phrased for the person configuring it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionCheckError {
    #[error("Fill in the access key and secret before enabling remote mode.")]
    MissingCredentials,
    #[error("Input and output buckets must both be set.")]
    MissingBuckets,
    #[error("Access denied (403). Check the keys and bucket permissions.")]
    AccessDenied,
    #[error("Bucket not found (404).")]
    BucketNotFound,
    #[error("Network or CORS failure: {0}")]
    Network(String),
    #[error("{0}")]
    Other(String),
}

impl From<StoreError> for ConnectionCheckError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Forbidden { .. } => Self::AccessDenied,
            StoreError::NoSuchBucket { .. } | StoreError::NotFound { .. } => Self::BucketNotFound,
            StoreError::Network(msg) => Self::Network(msg),
            other => Self::Other(other.to_string()),
        }
    }
}

/// `LIST(input, maxKeys=1)` against the store built for `settings`.
pub async fn validate_connection(
    settings: &RemoteSettings,
    store: &dyn ObjectStore,
) -> Result<(), ConnectionCheckError> {
    if !settings.has_credentials() {
        return Err(ConnectionCheckError::MissingCredentials);
    }
    if settings.input_bucket.trim().is_empty() || settings.output_bucket.trim().is_empty() {
        return Err(ConnectionCheckError::MissingBuckets);
    }
    store.list_objects(&settings.input_bucket, 1).await?;
    info!(bucket = %settings.input_bucket, "Remote store connection verified");
    Ok(())
}

/// Validate and return the settings with remote mode switched on.
/// On failure the settings stay disabled.
pub async fn enable_remote(
    settings: &RemoteSettings,
    store: &dyn ObjectStore,
) -> Result<RemoteSettings, ConnectionCheckError> {
    validate_connection(settings, store).await?;
    Ok(RemoteSettings {
        enabled: true,
        ..settings.clone()
    })
}
