//! Remote offload: upload a source asset to the input bucket, then poll the output bucket
//! for the derived thumbnail an external worker writes under `thumb-<key>`.

pub mod s3;
pub mod settings;

use crate::model::SourceAsset;
use crate::model::ThumbnailPayload;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

/// Prefix the external worker puts in front of the input key
pub const DERIVED_KEY_PREFIX: &str = "thumb-";

/// Errors surfaced by an object store, classified the way callers need to branch on them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("access denied for bucket {bucket}")]
    Forbidden { bucket: String },
    #[error("bucket not found: {bucket}")]
    NoSuchBucket { bucket: String },
    #[error("network failure: {0}")]
    Network(String),
    #[error("unexpected store response: {0}")]
    Unexpected(String),
    #[error("invalid store configuration: {0}")]
    InvalidConfiguration(String),
}

impl StoreError {
    /// Object-level not-found; the only class that keeps a poll loop going.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Bytes and content type of a fetched object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Two-bucket object storage as seen by the offload client.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError>;

    /// List up to `max_keys` keys; used for credential checks.
    async fn list_objects(&self, bucket: &str, max_keys: u32) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OffloadError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("derived thumbnail did not appear after {attempts} attempts")]
    Timeout { attempts: u32 },
    #[error("offload cancelled")]
    Cancelled,
}

/// Fixed-interval polling budget
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    /// A read that takes longer than this counts as not found
    pub attempt_timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_millis(1000),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

/// Client for the upload-then-poll round trip. Holds an explicitly constructed store.
#[derive(Clone)]
pub struct OffloadClient {
    store: Arc<dyn ObjectStore>,
    input_bucket: String,
    output_bucket: String,
    policy: PollPolicy,
}

impl std::fmt::Debug for OffloadClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffloadClient")
            .field("input_bucket", &self.input_bucket)
            .field("output_bucket", &self.output_bucket)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl OffloadClient {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        input_bucket: impl Into<String>,
        output_bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            input_bucket: input_bucket.into(),
            output_bucket: output_bucket.into(),
            policy: PollPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    #[must_use]
    pub fn input_bucket(&self) -> &str {
        &self.input_bucket
    }

    #[must_use]
    pub fn output_bucket(&self) -> &str {
        &self.output_bucket
    }

    /// Key the worker writes the derived object under
    #[must_use]
    pub fn derived_key(key: &str) -> String {
        format!("{DERIVED_KEY_PREFIX}{key}")
    }

    /// Single write of the asset to the input bucket under `key`.
    pub async fn upload(&self, asset: &SourceAsset, key: &str) -> Result<(), OffloadError> {
        debug!(bucket = %self.input_bucket, key, size = asset.len(), "Uploading source asset");
        self.store
            .put_object(&self.input_bucket, key, asset.bytes().to_vec(), &asset.mime_type)
            .await?;
        info!(bucket = %self.input_bucket, key, "Uploaded source asset");
        Ok(())
    }

    /// Poll with this client's policy
    pub async fn await_derived_default(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<ThumbnailPayload, OffloadError> {
        self.await_derived(key, self.policy.max_attempts, self.policy.interval, cancel)
            .await
    }

    /// Poll the output bucket until the derived object exists.
    ///
    /// Not-found, empty bodies and reads exceeding the attempt timeout wait `interval` and
    /// retry; any other store error aborts.
    pub async fn await_derived(
        &self,
        key: &str,
        max_attempts: u32,
        interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<ThumbnailPayload, OffloadError> {
        let output_key = Self::derived_key(key);
        for attempt in 1..=max_attempts {
            let read = tokio::time::timeout(
                self.policy.attempt_timeout,
                self.store.get_object(&self.output_bucket, &output_key),
            );
            let fetched = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(OffloadError::Cancelled),
                fetched = read => fetched,
            };
            match fetched {
                Err(_elapsed) => {
                    debug!(key = %output_key, attempt, "Derived object read timed out");
                }
                Ok(Ok(object)) if !object.bytes.is_empty() => {
                    debug!(key = %output_key, attempt, "Derived object available");
                    return Ok(payload_from_object(object));
                }
                Ok(Ok(_)) => debug!(key = %output_key, attempt, "Derived object has no body yet"),
                Ok(Err(e)) if e.is_not_found() => {
                    debug!(key = %output_key, attempt, "Derived object not ready");
                }
                Ok(Err(e)) => return Err(e.into()),
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(OffloadError::Cancelled),
                () = tokio::time::sleep(interval) => {}
            }
        }
        Err(OffloadError::Timeout {
            attempts: max_attempts,
        })
    }
}

/// Text data URLs stay text so their size follows the base64 rule
fn payload_from_object(object: StoredObject) -> ThumbnailPayload {
    let is_text = object
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("text/"))
        || object.bytes.starts_with(b"data:");
    if is_text {
        match String::from_utf8(object.bytes) {
            Ok(text) => ThumbnailPayload::DataUrl(text),
            Err(e) => ThumbnailPayload::Binary(e.into_bytes()),
        }
    } else {
        ThumbnailPayload::Binary(object.bytes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    /// In-memory store. The derived object appears after `ready_after` reads of it.
    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub objects: Mutex<HashMap<(String, String), StoredObject>>,
        pub get_calls: AtomicU32,
        /// Reads before this many calls have been made report not found
        pub ready_after: AtomicU32,
        pub fail_get_with: Mutex<Option<StoreError>>,
        pub fail_put_with: Mutex<Option<StoreError>>,
        /// When set, every put to the input bucket produces `thumb-<key>` in the output bucket
        pub derive_into: Mutex<Option<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            body: Vec<u8>,
            content_type: &str,
        ) -> Result<(), StoreError> {
            if let Some(e) = self.fail_put_with.lock().unwrap().clone() {
                return Err(e);
            }
            let mut objects = self.objects.lock().unwrap();
            if let Some((output_bucket, derived)) = self.derive_into.lock().unwrap().clone() {
                objects.insert(
                    (output_bucket, OffloadClient::derived_key(key)),
                    StoredObject {
                        bytes: derived,
                        content_type: Some("image/webp".to_string()),
                    },
                );
            }
            objects.insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    bytes: body,
                    content_type: Some(content_type.to_string()),
                },
            );
            Ok(())
        }

        async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
            let call = self.get_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(e) = self.fail_get_with.lock().unwrap().clone() {
                return Err(e);
            }
            if call <= self.ready_after.load(Ordering::SeqCst) {
                return Err(StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            self.objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        }

        async fn list_objects(&self, bucket: &str, max_keys: u32) -> Result<Vec<String>, StoreError> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .keys()
                .filter(|(b, _)| b == bucket)
                .map(|(_, k)| k.clone())
                .take(max_keys as usize)
                .collect())
        }
    }

    fn client(store: Arc<FakeStore>) -> OffloadClient {
        OffloadClient::new(store, "in", "out")
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_attempt_budget() {
        let store = Arc::new(FakeStore::default());
        let c = client(store.clone());
        let err = c
            .await_derived("k", 5, Duration::from_millis(1000), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OffloadError::Timeout { attempts: 5 }));
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_as_soon_as_object_exists() {
        let store = Arc::new(FakeStore::default());
        store.objects.lock().unwrap().insert(
            ("out".to_string(), "thumb-k".to_string()),
            StoredObject {
                bytes: vec![1, 2, 3],
                content_type: Some("image/png".to_string()),
            },
        );
        let payload = client(store.clone())
            .await_derived("k", 30, Duration::from_millis(1000), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(payload, ThumbnailPayload::Binary(vec![1, 2, 3]));
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_on_the_attempt_the_object_appears() {
        let store = Arc::new(FakeStore::default());
        store.objects.lock().unwrap().insert(
            ("out".to_string(), "thumb-k".to_string()),
            StoredObject {
                bytes: vec![7],
                content_type: None,
            },
        );
        store.ready_after.store(3, Ordering::SeqCst);
        let started = tokio::time::Instant::now();
        let payload = client(store.clone())
            .await_derived("k", 30, Duration::from_millis(1000), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(payload, ThumbnailPayload::Binary(vec![7]));
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 4);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(3000) && waited < Duration::from_millis(4000));
    }

    /// Never answers a read
    struct StalledStore;

    #[async_trait]
    impl ObjectStore for StalledStore {
        async fn put_object(&self, _: &str, _: &str, _: Vec<u8>, _: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn get_object(&self, _: &str, _: &str) -> Result<StoredObject, StoreError> {
            std::future::pending().await
        }

        async fn list_objects(&self, _: &str, _: u32) -> Result<Vec<String>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_reads_still_respect_the_attempt_budget() {
        let policy = PollPolicy {
            max_attempts: 3,
            interval: Duration::from_millis(1000),
            attempt_timeout: Duration::from_secs(2),
        };
        let c = OffloadClient::new(Arc::new(StalledStore), "in", "out").with_policy(policy);
        let started = tokio::time::Instant::now();
        let err = c
            .await_derived_default("k", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OffloadError::Timeout { attempts: 3 }));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(9) && waited < Duration::from_secs(10), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn permission_errors_abort_immediately() {
        let store = Arc::new(FakeStore::default());
        *store.fail_get_with.lock().unwrap() = Some(StoreError::Forbidden {
            bucket: "out".to_string(),
        });
        let err = client(store.clone())
            .await_derived("k", 30, Duration::from_millis(1000), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OffloadError::Store(StoreError::Forbidden { .. })));
        assert_eq!(store.get_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_polling() {
        let store = Arc::new(FakeStore::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client(store)
            .await_derived("k", 30, Duration::from_millis(1000), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OffloadError::Cancelled));
    }

    #[tokio::test]
    async fn upload_writes_to_input_bucket_with_mime_type() {
        let store = Arc::new(FakeStore::default());
        let asset = SourceAsset::new("a.png", "image/png", vec![9, 9]);
        client(store.clone()).upload(&asset, "123-a.png").await.unwrap();
        let objects = store.objects.lock().unwrap();
        let stored = &objects[&("in".to_string(), "123-a.png".to_string())];
        assert_eq!(stored.bytes, vec![9, 9]);
        assert_eq!(stored.content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn data_url_objects_stay_text() {
        let payload = payload_from_object(StoredObject {
            bytes: b"data:image/png;base64,AAAA".to_vec(),
            content_type: None,
        });
        assert!(matches!(payload, ThumbnailPayload::DataUrl(_)));
        assert_eq!(payload.size_bytes(), 3);
    }
}
