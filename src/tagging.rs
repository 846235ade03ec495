//! Tagging collaborator: description, tags and a suggested file name for an image.

use crate::cache::CacheHome;
use crate::model::SourceAsset;
use crate::model::file_stem;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use facet::Facet;
use std::time::Duration;
use tracing::Instrument;
use tracing::Level;
use tracing::debug;
use tracing::field::Empty;
use tracing::info;
use tracing::span;
use tracing::warn;

const PROMPT: &str = "Analyze this image. 1. A short description. 2. Three relevant tags. \
3. Suggest a file name (field 'suggestedName') in snake_case based on the visual content \
(e.g. dog_running_beach), WITHOUT a file extension. \
Reply with JSON of the form {\"description\": string, \"tags\": [string], \"suggestedName\": string}.";

/// Metadata for one image
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct TagAnalysis {
    pub description: String,
    pub tags: Vec<String>,
    #[facet(rename = "suggestedName")]
    pub suggested_name: String,
}

impl TagAnalysis {
    /// Substitute used when tagging fails: no description, an `error` tag, the original stem.
    #[must_use]
    pub fn degraded(original_name: &str) -> Self {
        Self {
            description: String::new(),
            tags: vec!["error".to_string()],
            suggested_name: file_stem(original_name).to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TaggingError {
    #[error("tagging service unreachable: {0}")]
    Unreachable(String),
    #[error("tagging service returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("malformed tagging response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Tagger: Send + Sync {
    async fn analyze(&self, asset: &SourceAsset) -> Result<TagAnalysis, TaggingError>;
}

/// Lowercase ASCII words joined by single underscores.
#[must_use]
pub fn sanitize_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Used when no API key is configured. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTagger;

#[async_trait]
impl Tagger for OfflineTagger {
    async fn analyze(&self, asset: &SourceAsset) -> Result<TagAnalysis, TaggingError> {
        Ok(TagAnalysis {
            description: String::new(),
            tags: Vec::new(),
            suggested_name: asset.stem().to_string(),
        })
    }
}

// Request shape for generateContent
#[derive(Facet)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[facet(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Facet)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Facet)]
#[repr(u8)]
enum RequestPart {
    #[facet(rename = "inlineData")]
    InlineData(InlineData),
    #[facet(rename = "text")]
    Text(String),
}

#[derive(Facet)]
struct InlineData {
    #[facet(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Facet)]
struct GenerationConfig {
    #[facet(rename = "responseMimeType")]
    response_mime_type: String,
}

// Only the fields we read from the reply
#[derive(Debug, Facet)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Facet)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Facet)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Facet)]
struct ResponsePart {
    text: Option<String>,
}

/// Tagger backed by the Gemini `generateContent` endpoint.
///
/// The API key is passed in by the caller; responses are cached per model and image when a
/// cache home is given.
pub struct GeminiTagger {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    cache: Option<CacheHome>,
}

impl std::fmt::Debug for GeminiTagger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTagger")
            .field("api_key", &crate::remote::settings::mask(&self.api_key))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("cache", &self.cache)
            .finish()
    }
}

impl GeminiTagger {
    pub const DEFAULT_MODEL: &'static str = "gemini-2.5-flash";
    pub const DEFAULT_ENDPOINT: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Self::client(Self::REQUEST_TIMEOUT),
            api_key: api_key.into(),
            model: Self::DEFAULT_MODEL.to_string(),
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            cache: None,
        }
    }

    fn client(timeout: Duration) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default()
    }

    /// Bound on a whole request, from connect to the last body byte.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.http = Self::client(timeout);
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: CacheHome) -> Self {
        self.cache = Some(cache);
        self
    }

    fn request_body(asset: &SourceAsset) -> Result<String, TaggingError> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::InlineData(InlineData {
                        mime_type: asset.mime_type.clone(),
                        data: STANDARD.encode(asset.bytes()),
                    }),
                    RequestPart::Text(PROMPT.to_string()),
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };
        facet_json::to_string(&request)
            .map_err(|e| TaggingError::Malformed(format!("failed to serialize request: {e}")))
    }

    /// Extract and clean the analysis from a raw `generateContent` reply.
    fn parse_response(body: &str) -> Result<TagAnalysis, TaggingError> {
        let response: GenerateResponse = facet_json::from_str(body)
            .map_err(|e| TaggingError::Malformed(format!("response: {e}")))?;
        let text = response
            .candidates
            .into_iter()
            .flatten()
            .filter_map(|c| c.content)
            .filter_map(|c| c.parts)
            .flatten()
            .find_map(|p| p.text)
            .ok_or_else(|| TaggingError::Malformed("no text in response".to_string()))?;
        let mut analysis: TagAnalysis = facet_json::from_str(text.trim())
            .map_err(|e| TaggingError::Malformed(format!("analysis: {e}")))?;
        analysis.suggested_name = sanitize_snake_case(&analysis.suggested_name);
        Ok(analysis)
    }
}

#[async_trait]
impl Tagger for GeminiTagger {
    async fn analyze(&self, asset: &SourceAsset) -> Result<TagAnalysis, TaggingError> {
        let cache_entry = self
            .cache
            .as_ref()
            .map(|home| home.entry_for(&self.model, asset.bytes()));
        if let Some(entry) = &cache_entry {
            match entry.read() {
                Ok(Some(body)) => match Self::parse_response(&body) {
                    Ok(analysis) => {
                        info!(name = %asset.name, "Using cached tagging response");
                        return Ok(analysis);
                    }
                    Err(e) => warn!(name = %asset.name, "Ignoring cached tagging response: {}", e),
                },
                Ok(None) => {}
                Err(e) => warn!("Failed to read tagging cache: {}", e),
            }
        }

        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let git_rev = option_env!("GIT_REVISION").unwrap_or("unknown");
        let user_agent = format!(
            "{} v{} (rev {})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            git_rev
        );
        let span = span!(
            Level::DEBUG,
            "tagging_request",
            url,
            model = self.model.as_str(),
            name = asset.name.as_str(),
            response_status = Empty,
        );
        let body = Self::request_body(asset)?;
        info!(name = %asset.name, model = %self.model, "Requesting image analysis");
        let resp = self
            .http
            .post(&url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("x-goog-api-key", &self.api_key)
            .body(body)
            .send()
            .instrument(span.clone())
            .await
            .map_err(|e| TaggingError::Unreachable(e.to_string()))?;

        let status = resp.status();
        span.record("response_status", status.as_u16());
        let text = resp
            .text()
            .await
            .map_err(|e| TaggingError::Unreachable(e.to_string()))?;
        if !status.is_success() {
            return Err(TaggingError::Http {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }
        debug!(content_length = text.len(), "Received tagging response");

        let analysis = Self::parse_response(&text)?;
        if let Some(entry) = &cache_entry
            && let Err(e) = entry.write(&text)
        {
            warn!("Failed to cache tagging response: {}", e);
        }
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const REPLY: &str = r#"{
        "candidates": [{
            "content": {
                "parts": [{"text": "{\"description\": \"A dog on a beach\", \"tags\": [\"dog\", \"beach\", \"sun\"], \"suggestedName\": \"Dog Running-Beach!\"}"}],
                "role": "model"
            },
            "finishReason": "STOP"
        }],
        "modelVersion": "gemini-2.5-flash"
    }"#;

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_snake_case("Dog Running-Beach!"), "dog_running_beach");
        assert_eq!(sanitize_snake_case("  __already_ok__ "), "already_ok");
        assert_eq!(sanitize_snake_case("café"), "caf");
        assert_eq!(sanitize_snake_case("!!!"), "");
    }

    #[test]
    fn parses_generate_content_reply() {
        let analysis = GeminiTagger::parse_response(REPLY).unwrap();
        assert_eq!(analysis.description, "A dog on a beach");
        assert_eq!(analysis.tags, vec!["dog", "beach", "sun"]);
        assert_eq!(analysis.suggested_name, "dog_running_beach");
    }

    #[test]
    fn reply_without_text_is_malformed() {
        let err = GeminiTagger::parse_response(r#"{"candidates": []}"#).unwrap_err();
        assert!(matches!(err, TaggingError::Malformed(_)));
    }

    #[test]
    fn degraded_result_uses_original_stem() {
        let d = TagAnalysis::degraded("holiday photo.jpeg");
        assert_eq!(d.description, "");
        assert_eq!(d.tags, vec!["error"]);
        assert_eq!(d.suggested_name, "holiday photo");
    }

    #[tokio::test]
    async fn offline_tagger_uses_stem() {
        let asset = SourceAsset::new("cat.png", "image/png", vec![1]);
        let a = OfflineTagger.analyze(&asset).await.unwrap();
        assert_eq!(a.suggested_name, "cat");
        assert!(a.tags.is_empty());
    }

    #[tokio::test]
    async fn cached_reply_is_used_without_network() {
        let td = tempdir().unwrap();
        let home = CacheHome(td.path().to_path_buf());
        let asset = SourceAsset::new("dog.png", "image/png", vec![1, 2, 3]);
        home.entry_for(GeminiTagger::DEFAULT_MODEL, asset.bytes())
            .write(REPLY)
            .unwrap();
        // unroutable endpoint: only the cache can answer
        let tagger = GeminiTagger::new("key")
            .with_endpoint("http://127.0.0.1:9")
            .with_cache(home);
        let a = tagger.analyze(&asset).await.unwrap();
        assert_eq!(a.suggested_name, "dog_running_beach");
    }

    #[tokio::test]
    async fn silent_service_times_out_as_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        let tagger = GeminiTagger::new("key")
            .with_endpoint(format!("http://{addr}"))
            .with_request_timeout(Duration::from_millis(300));
        let asset = SourceAsset::new("dog.png", "image/png", vec![1, 2, 3]);

        let started = std::time::Instant::now();
        let err = tagger.analyze(&asset).await.unwrap_err();
        assert!(matches!(err, TaggingError::Unreachable(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
        hold.abort();
    }

    #[test]
    fn debug_masks_key() {
        let dbg = format!("{:?}", GeminiTagger::new("super-secret-key"));
        assert!(!dbg.contains("super-secret-key"));
    }
}
