//! Core data types shared by the thumbnail pipeline.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;
use std::sync::Arc;

/// A staged source image. Cheap to clone; the bytes are shared and never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceAsset {
    /// Display name, usually the original file name
    pub name: String,
    /// MIME type of the original bytes
    pub mime_type: String,
    bytes: Arc<[u8]>,
}

impl SourceAsset {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The name without its last extension, or the whole name if it has none.
    #[must_use]
    pub fn stem(&self) -> &str {
        file_stem(&self.name)
    }
}

/// Everything before the last `.`; names without a dot (or starting with one) are returned whole.
#[must_use]
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Encoded output formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl OutputFormat {
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    /// Whether the encoder honours a quality setting
    #[must_use]
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Jpeg | Self::Webp)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jpeg => write!(f, "jpeg"),
            Self::Png => write!(f, "png"),
            Self::Webp => write!(f, "webp"),
        }
    }
}

/// Output settings for one batch run. Shared read-only by every pipeline in the run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Target width in pixels before compression shrink
    pub max_width: u32,
    pub use_custom_quality: bool,
    /// Encoder quality in `[0.1, 1.0]`
    pub quality: f32,
    pub use_compression: bool,
    /// Resolution reduction strength in `[0.1, 0.9]`
    pub compression: f32,
}

impl OutputConfig {
    pub const MIN_QUALITY: f32 = 0.1;
    pub const MAX_QUALITY: f32 = 1.0;
    pub const MIN_COMPRESSION: f32 = 0.1;
    pub const MAX_COMPRESSION: f32 = 0.9;

    /// Clamp the numeric fields into their documented ranges.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_width = self.max_width.max(1);
        self.quality = clamp_or(self.quality, Self::MIN_QUALITY, Self::MAX_QUALITY);
        self.compression = clamp_or(self.compression, Self::MIN_COMPRESSION, Self::MAX_COMPRESSION);
        self
    }
}

fn clamp_or(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() { min } else { value.clamp(min, max) }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Webp,
            max_width: 300,
            use_custom_quality: false,
            quality: 0.8,
            use_compression: false,
            compression: 0.5,
        }
    }
}

/// Photometric and geometric adjustments. Percentages are around 100 = identity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageFilters {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    /// Degrees, any integer value
    pub rotation: i32,
}

impl ImageFilters {
    pub const IDENTITY: ImageFilters = ImageFilters {
        brightness: 100.0,
        contrast: 100.0,
        saturation: 100.0,
        rotation: 0,
    };

    #[must_use]
    pub fn is_photometric_identity(&self) -> bool {
        self.brightness == 100.0 && self.contrast == 100.0 && self.saturation == 100.0
    }

    /// Add `delta` degrees, wrapping into `[0, 360)`. Any `i32` is accepted.
    #[must_use]
    pub fn rotated_by(mut self, delta: i32) -> Self {
        self.rotation = (self.rotation.rem_euclid(360) + delta.rem_euclid(360)).rem_euclid(360);
        self
    }

    /// Rotation is a quarter turn one way or the other (90, 270, -90, ...)
    #[must_use]
    pub fn swaps_axes(&self) -> bool {
        self.rotation.rem_euclid(180) == 90
    }
}

impl Default for ImageFilters {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Which path produced a thumbnail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessingSource {
    Remote,
    Local,
}

impl fmt::Display for ProcessingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => write!(f, "remote"),
            Self::Local => write!(f, "local"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessingStatus {
    Processing,
    Completed,
    Error,
}

impl ProcessingStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Encoded thumbnail bytes as produced by either path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThumbnailPayload {
    Binary(Vec<u8>),
    /// `data:<mime>;base64,<data>` text as written by some remote workers
    DataUrl(String),
}

impl ThumbnailPayload {
    /// Size of the encoded image.
    ///
    /// Text payloads use the base64 rule `round(len * 0.75)` over the data part.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        match self {
            Self::Binary(bytes) => bytes.len() as u64,
            Self::DataUrl(text) => {
                let data_len = text.find(',').map_or(text.len(), |idx| text.len() - idx - 1);
                (data_len as f64 * 0.75).round() as u64
            }
        }
    }

    /// Raw image bytes, decoding text payloads
    pub fn to_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        match self {
            Self::Binary(bytes) => Ok(bytes.clone()),
            Self::DataUrl(text) => {
                let data = text.find(',').map_or(text.as_str(), |idx| &text[idx + 1..]);
                STANDARD.decode(data.trim())
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Binary(bytes) => bytes.is_empty(),
            Self::DataUrl(text) => text.is_empty(),
        }
    }
}

/// The per-item outcome of a pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessingResult {
    /// Name of the source asset this result belongs to
    pub original_name: String,
    pub original_size: u64,
    pub thumbnail: Option<ThumbnailPayload>,
    pub size_bytes: u64,
    pub source: ProcessingSource,
    pub duration_ms: u64,
    pub description: String,
    pub tags: Vec<String>,
    pub final_name: String,
    pub status: ProcessingStatus,
    /// Last failure message for items in `Error`
    pub error: Option<String>,
}

impl ProcessingResult {
    /// A fresh result in `Processing` for the given asset
    #[must_use]
    pub fn started(asset: &SourceAsset, expected_source: ProcessingSource) -> Self {
        Self {
            original_name: asset.name.clone(),
            original_size: asset.len() as u64,
            thumbnail: None,
            size_bytes: 0,
            source: expected_source,
            duration_ms: 0,
            description: String::new(),
            tags: Vec::new(),
            final_name: asset.name.clone(),
            status: ProcessingStatus::Processing,
            error: None,
        }
    }

    /// Store a payload, always deriving the size from it.
    pub fn set_thumbnail(&mut self, payload: ThumbnailPayload) {
        self.size_bytes = payload.size_bytes();
        self.thumbnail = Some(payload);
    }
}

/// Final display name: base name plus the extension of the configured format.
#[must_use]
pub fn final_name(base: &str, format: OutputFormat) -> String {
    let base = if base.trim().is_empty() { "image" } else { base };
    format!("{base}.{}", format.extension())
}

/// Human-readable byte count (1024 base)
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_of_binary_payload_is_exact() {
        let payload = ThumbnailPayload::Binary(vec![0u8; 1234]);
        assert_eq!(payload.size_bytes(), 1234);
    }

    #[test]
    fn size_of_data_url_uses_base64_rule() {
        // 8 base64 chars -> 6 bytes
        let payload = ThumbnailPayload::DataUrl("data:image/png;base64,AAECAwQF".to_string());
        assert_eq!(payload.size_bytes(), 6);
        assert_eq!(payload.to_bytes().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn rotation_wraps_additively() {
        let f = ImageFilters::IDENTITY.rotated_by(270).rotated_by(180);
        assert_eq!(f.rotation, 90);
        assert!(f.swaps_axes());
        let f = ImageFilters::IDENTITY.rotated_by(-90);
        assert_eq!(f.rotation, 270);
        assert!(f.swaps_axes());
        assert!(!ImageFilters::IDENTITY.rotated_by(180).swaps_axes());
    }

    #[test]
    fn extreme_rotations_do_not_overflow() {
        let f = ImageFilters::IDENTITY.rotated_by(i32::MAX).rotated_by(i32::MAX);
        assert_eq!(f.rotation, 254);
        let f = ImageFilters {
            rotation: i32::MIN,
            ..ImageFilters::IDENTITY
        }
        .rotated_by(i32::MIN);
        assert_eq!(f.rotation, 104);
    }

    #[test]
    fn negative_quarter_turn_swaps_axes_without_wrapping() {
        let f = ImageFilters {
            rotation: -90,
            ..ImageFilters::IDENTITY
        };
        assert!(f.swaps_axes());
    }

    #[test]
    fn stems_and_final_names() {
        assert_eq!(file_stem("photo.final.png"), "photo.final");
        assert_eq!(file_stem(".hidden"), ".hidden");
        assert_eq!(file_stem("noext"), "noext");
        assert_eq!(final_name("beach_dog", OutputFormat::Webp), "beach_dog.webp");
        assert_eq!(final_name("", OutputFormat::Jpeg), "image.jpg");
    }

    #[test]
    fn normalized_clamps_ranges() {
        let cfg = OutputConfig {
            max_width: 0,
            quality: 3.0,
            compression: 0.0,
            ..OutputConfig::default()
        }
        .normalized();
        assert_eq!(cfg.max_width, 1);
        assert_eq!(cfg.quality, 1.0);
        assert_eq!(cfg.compression, 0.1);
    }

    #[test]
    fn formats_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10 MB");
    }
}
