//! S3-compatible object store on top of `opendal`. One operator per bucket, built lazily.

use crate::remote::ObjectStore;
use crate::remote::StoreError;
use crate::remote::StoredObject;
use crate::remote::settings::RemoteSettings;
use crate::remote::settings::mask;
use async_trait::async_trait;
use opendal::ErrorKind;
use opendal::Operator;
use opendal::layers::TimeoutLayer;
use opendal::services::S3;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use tracing::Instrument;
use tracing::Level;
use tracing::debug;
use tracing::span;

/// Upper bound for a single store request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct S3Store {
    endpoint: String,
    region: String,
    access_key_id: String,
    secret_access_key: String,
    operators: Mutex<HashMap<String, Operator>>,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &mask(&self.secret_access_key))
            .finish_non_exhaustive()
    }
}

impl S3Store {
    /// Build a client for the given settings.
    pub fn new(settings: &RemoteSettings) -> Result<Self, StoreError> {
        if !settings.has_credentials() {
            return Err(StoreError::InvalidConfiguration(
                "access key id and secret are required".to_string(),
            ));
        }
        let endpoint = settings.resolved_endpoint();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(StoreError::InvalidConfiguration(format!(
                "endpoint {endpoint} must start with http:// or https://"
            )));
        }
        Ok(Self {
            endpoint,
            region: settings.region.trim().to_string(),
            access_key_id: settings.access_key_id.trim().to_string(),
            secret_access_key: settings.secret_access_key.trim().to_string(),
            operators: Mutex::new(HashMap::new()),
        })
    }

    fn operator(&self, bucket: &str) -> Result<Operator, StoreError> {
        let mut operators = self.operators.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(op) = operators.get(bucket) {
            return Ok(op.clone());
        }
        debug!(bucket, endpoint = %self.endpoint, region = %self.region, "Creating store operator");
        let builder = S3::default()
            .bucket(bucket)
            .region(&self.region)
            .endpoint(&self.endpoint)
            .access_key_id(&self.access_key_id)
            .secret_access_key(&self.secret_access_key)
            .disable_config_load();
        let op = Operator::new(builder)
            .map_err(|e| classify(&e, bucket, ""))?
            .layer(TimeoutLayer::new().with_timeout(REQUEST_TIMEOUT))
            .finish();
        operators.insert(bucket.to_string(), op.clone());
        Ok(op)
    }
}

/// Map an opendal error onto the store taxonomy. Only object-level not-found keeps a poll going.
pub(crate) fn classify(error: &opendal::Error, bucket: &str, key: &str) -> StoreError {
    let message = error.to_string();
    match error.kind() {
        ErrorKind::NotFound if message.contains("NoSuchBucket") => StoreError::NoSuchBucket {
            bucket: bucket.to_string(),
        },
        ErrorKind::NotFound => StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        ErrorKind::PermissionDenied => StoreError::Forbidden {
            bucket: bucket.to_string(),
        },
        ErrorKind::ConfigInvalid => StoreError::InvalidConfiguration(message),
        _ if error.is_temporary() => StoreError::Network(message),
        _ => StoreError::Unexpected(message),
    }
}

pub(crate) async fn write_object(
    op: &Operator,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
    content_type: &str,
) -> Result<(), StoreError> {
    let mut write = op.write_with(key, body);
    if op.info().full_capability().write_with_content_type {
        write = write.content_type(content_type);
    }
    write.await.map_err(|e| classify(&e, bucket, key))?;
    Ok(())
}

pub(crate) async fn read_object(
    op: &Operator,
    bucket: &str,
    key: &str,
) -> Result<StoredObject, StoreError> {
    let buffer = op.read(key).await.map_err(|e| classify(&e, bucket, key))?;
    Ok(StoredObject {
        bytes: buffer.to_vec(),
        content_type: None,
    })
}

pub(crate) async fn list_keys(
    op: &Operator,
    bucket: &str,
    max_keys: u32,
) -> Result<Vec<String>, StoreError> {
    let entries = op
        .list_with("/")
        .limit(max_keys as usize)
        .await
        .map_err(|e| classify(&e, bucket, ""))?;
    Ok(entries
        .into_iter()
        .map(|entry| entry.path().to_string())
        .take(max_keys as usize)
        .collect())
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let op = self.operator(bucket)?;
        let span = span!(Level::DEBUG, "store_put", bucket, key, size = body.len());
        write_object(&op, bucket, key, body, content_type)
            .instrument(span)
            .await
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let op = self.operator(bucket)?;
        let span = span!(Level::DEBUG, "store_get", bucket, key);
        read_object(&op, bucket, key).instrument(span).await
    }

    async fn list_objects(&self, bucket: &str, max_keys: u32) -> Result<Vec<String>, StoreError> {
        let op = self.operator(bucket)?;
        let span = span!(Level::DEBUG, "store_list", bucket, max_keys);
        list_keys(&op, bucket, max_keys).instrument(span).await
    }
}
