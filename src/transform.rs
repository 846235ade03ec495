//! Local thumbnail rendering: resize, compression shrink, photometric filters, rotation, encode.
//!
//! Geometry follows a 2D canvas model. The target size is derived from `max_width`
//! (optionally shrunk by the compression strength) with the source aspect ratio preserved.
//! A quarter-turn rotation swaps the canvas axes so the rotated content fits exactly;
//! other angles rotate about the canvas centre and clip the corners.

use crate::model::ImageFilters;
use crate::model::OutputConfig;
use crate::model::OutputFormat;
use image::DynamicImage;
use image::ImageError;
use image::Rgba;
use image::RgbaImage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops;
use image::imageops::FilterType;
use tracing::debug;
use tracing::warn;

/// Quality used when custom quality is disabled
pub const DEFAULT_QUALITY: f32 = 0.92;
/// Floor applied to custom quality values
pub const MIN_EFFECTIVE_QUALITY: f32 = 0.05;
/// Maximum extra shrink at compression strength 1.0
pub const COMPRESSION_SHRINK: f64 = 0.7;
/// Largest canvas edge we agree to allocate
pub const MAX_CANVAS_DIMENSION: u32 = 16_384;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to decode source image: {0}")]
    Decode(#[source] ImageError),
    #[error("render surface unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode thumbnail: {0}")]
    Encode(#[source] ImageError),
    #[error("failed to encode webp thumbnail: {0}")]
    EncodeWebp(String),
}

/// Computed geometry and encoder settings for one render
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderPlan {
    /// Size the source is scaled to, before rotation
    pub target_width: u32,
    pub target_height: u32,
    /// Output canvas size, swapped for quarter turns
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub quality: f32,
}

/// An encoded thumbnail with its final pixel size
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedThumbnail {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

/// Encoder quality for the config: the fixed default unless custom quality is on.
#[must_use]
pub fn effective_quality(config: &OutputConfig) -> f32 {
    if config.use_custom_quality {
        config.quality.max(MIN_EFFECTIVE_QUALITY)
    } else {
        DEFAULT_QUALITY
    }
}

/// Multiplier applied on top of the `max_width` scale
#[must_use]
pub fn compression_factor(config: &OutputConfig) -> f64 {
    if config.use_compression && config.compression > 0.0 {
        1.0 - f64::from(config.compression) * COMPRESSION_SHRINK
    } else {
        1.0
    }
}

/// Work out target and canvas dimensions for a source of the given size.
pub fn plan(
    source_width: u32,
    source_height: u32,
    config: &OutputConfig,
    filters: &ImageFilters,
) -> Result<RenderPlan, RenderError> {
    if source_width == 0 || source_height == 0 {
        return Err(RenderError::Unavailable(format!(
            "source has no pixels ({source_width}x{source_height})"
        )));
    }
    let scale = f64::from(config.max_width) / f64::from(source_width) * compression_factor(config);
    let target_width = (f64::from(source_width) * scale).round().max(1.0);
    let target_height = (target_width * f64::from(source_height) / f64::from(source_width))
        .round()
        .max(1.0);

    let limit = f64::from(MAX_CANVAS_DIMENSION);
    if target_width > limit || target_height > limit {
        return Err(RenderError::Unavailable(format!(
            "canvas {target_width}x{target_height} exceeds {MAX_CANVAS_DIMENSION}px"
        )));
    }
    let target_width = target_width as u32;
    let target_height = target_height as u32;

    let (canvas_width, canvas_height) = if filters.swaps_axes() {
        (target_height, target_width)
    } else {
        (target_width, target_height)
    };

    Ok(RenderPlan {
        target_width,
        target_height,
        canvas_width,
        canvas_height,
        quality: effective_quality(config),
    })
}

/// Render `source` into an encoded thumbnail. Pure: no disk or network I/O.
pub fn render(
    source: &[u8],
    config: &OutputConfig,
    filters: &ImageFilters,
) -> Result<RenderedThumbnail, RenderError> {
    let img = image::load_from_memory(source).map_err(RenderError::Decode)?;
    render_image(&img, config, filters)
}

/// Render an already decoded image
pub fn render_image(
    img: &DynamicImage,
    config: &OutputConfig,
    filters: &ImageFilters,
) -> Result<RenderedThumbnail, RenderError> {
    let plan = plan(img.width(), img.height(), config, filters)?;
    debug!(
        source_width = img.width(),
        source_height = img.height(),
        canvas_width = plan.canvas_width,
        canvas_height = plan.canvas_height,
        quality = plan.quality,
        lossy = config.format.is_lossy(),
        format = %config.format,
        "Rendering thumbnail"
    );

    let mut scaled = img
        .resize_exact(plan.target_width, plan.target_height, FilterType::Lanczos3)
        .to_rgba8();

    if !filters.is_photometric_identity() {
        apply_photometric(&mut scaled, filters);
    }

    let canvas = match filters.rotation.rem_euclid(360) {
        0 => scaled,
        90 => imageops::rotate90(&scaled),
        180 => imageops::rotate180(&scaled),
        270 => imageops::rotate270(&scaled),
        other => rotate_about_center(&scaled, plan.canvas_width, plan.canvas_height, other),
    };

    let bytes = encode(&canvas, config.format, plan.quality)?;
    Ok(RenderedThumbnail {
        bytes,
        width: canvas.width(),
        height: canvas.height(),
        format: config.format,
    })
}

/// Exact encoded size for the config, or 0 when rendering fails
#[must_use]
pub fn estimate_size(source: &[u8], config: &OutputConfig) -> u64 {
    match render(source, config, &ImageFilters::IDENTITY) {
        Ok(rendered) => rendered.bytes.len() as u64,
        Err(e) => {
            warn!("Failed to estimate size: {}", e);
            0
        }
    }
}

fn encode(canvas: &RgbaImage, format: OutputFormat, quality: f32) -> Result<Vec<u8>, RenderError> {
    let mut data = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel; transparent areas flatten to black
            let rgb = DynamicImage::ImageRgba8(canvas.clone()).to_rgb8();
            let q = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut data, q))
                .map_err(RenderError::Encode)?;
        }
        OutputFormat::Png => {
            canvas
                .write_with_encoder(PngEncoder::new(&mut data))
                .map_err(RenderError::Encode)?;
        }
        OutputFormat::Webp => {
            let encoder = webp::Encoder::from_rgba(canvas.as_raw(), canvas.width(), canvas.height());
            let encoded = encoder
                .encode_simple(false, quality * 100.0)
                .map_err(|e| RenderError::EncodeWebp(format!("{e:?}")))?;
            // WebPMemory is !Send
            data = encoded.to_vec();
        }
    }
    Ok(data)
}

/// Brightness, contrast then saturation, each clamped, as a composed CSS-style filter.
fn apply_photometric(img: &mut RgbaImage, filters: &ImageFilters) {
    let b = filters.brightness.max(0.0) / 100.0;
    let c = filters.contrast.max(0.0) / 100.0;
    let s = filters.saturation.max(0.0) / 100.0;

    for pixel in img.pixels_mut() {
        let [r, g, bl, a] = pixel.0;
        let mut rgb = [r, g, bl].map(|v| f32::from(v) / 255.0);

        for v in &mut rgb {
            *v = (*v * b).clamp(0.0, 1.0);
            *v = ((*v - 0.5) * c + 0.5).clamp(0.0, 1.0);
        }

        let [r, g, bl] = rgb;
        let sr = (0.213 + 0.787 * s) * r + (0.715 - 0.715 * s) * g + (0.072 - 0.072 * s) * bl;
        let sg = (0.213 - 0.213 * s) * r + (0.715 + 0.285 * s) * g + (0.072 - 0.072 * s) * bl;
        let sb = (0.213 - 0.213 * s) * r + (0.715 - 0.715 * s) * g + (0.072 + 0.928 * s) * bl;

        pixel.0 = [to_channel(sr), to_channel(sg), to_channel(sb), a];
    }
}

fn to_channel(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Clockwise rotation of `src` drawn centred on a `width`x`height` canvas, bilinear sampled.
fn rotate_about_center(src: &RgbaImage, width: u32, height: u32, degrees: i32) -> RgbaImage {
    let theta = f64::from(degrees).to_radians();
    let (sin, cos) = theta.sin_cos();
    let (sw, sh) = (f64::from(src.width()), f64::from(src.height()));
    let (cx, cy) = (f64::from(width) / 2.0, f64::from(height) / 2.0);

    RgbaImage::from_fn(width, height, |x, y| {
        let dx = f64::from(x) + 0.5 - cx;
        let dy = f64::from(y) + 0.5 - cy;
        let u = dx * cos + dy * sin + sw / 2.0 - 0.5;
        let v = -dx * sin + dy * cos + sh / 2.0 - 0.5;
        if u < -0.5 || v < -0.5 || u > sw - 0.5 || v > sh - 0.5 {
            return Rgba([0, 0, 0, 0]);
        }
        sample_bilinear(src, u, v)
    })
}

fn sample_bilinear(src: &RgbaImage, u: f64, v: f64) -> Rgba<u8> {
    let max_x = f64::from(src.width() - 1);
    let max_y = f64::from(src.height() - 1);
    let u = u.clamp(0.0, max_x);
    let v = v.clamp(0.0, max_y);
    let (x0, y0) = (u.floor(), v.floor());
    let (x1, y1) = ((x0 + 1.0).min(max_x), (y0 + 1.0).min(max_y));
    let (fx, fy) = (u - x0, v - y0);

    let p00 = src.get_pixel(x0 as u32, y0 as u32).0;
    let p10 = src.get_pixel(x1 as u32, y0 as u32).0;
    let p01 = src.get_pixel(x0 as u32, y1 as u32).0;
    let p11 = src.get_pixel(x1 as u32, y1 as u32).0;

    let mut out = [0u8; 4];
    for i in 0..4 {
        let top = f64::from(p00[i]) * (1.0 - fx) + f64::from(p10[i]) * fx;
        let bottom = f64::from(p01[i]) * (1.0 - fx) + f64::from(p11[i]) * fx;
        out[i] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    /// Deterministic noisy PNG so encoded size tracks pixel count
    pub(crate) fn noisy_png(width: u32, height: u32) -> Vec<u8> {
        let mut state: u32 = 0x1234_5678;
        let img = RgbaImage::from_fn(width, height, |x, y| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let n = (state >> 24) as u8;
            Rgba([n, (x % 256) as u8, (y % 256) as u8, 255])
        });
        let mut data = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
            .unwrap();
        data
    }

    fn config(format: OutputFormat, max_width: u32) -> OutputConfig {
        OutputConfig {
            format,
            max_width,
            ..OutputConfig::default()
        }
    }

    fn decoded_dims(bytes: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(bytes).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn compression_example_dimensions() {
        let cfg = OutputConfig {
            use_compression: true,
            compression: 0.9,
            ..config(OutputFormat::Png, 300)
        };
        let plan = plan(1200, 800, &cfg, &ImageFilters::IDENTITY).unwrap();
        assert_eq!(plan.target_width, 111);
        assert_eq!(plan.target_height, 74);
    }

    #[test]
    fn aspect_ratio_is_preserved_within_rounding() {
        for (w, h) in [(1200, 800), (640, 480), (333, 1000), (5000, 17)] {
            for max_width in [1, 50, 300, 999] {
                let plan = plan(w, h, &config(OutputFormat::Png, max_width), &ImageFilters::IDENTITY)
                    .unwrap();
                let expected = f64::from(plan.target_width) * f64::from(h) / f64::from(w);
                assert!(
                    (f64::from(plan.target_height) - expected).abs() <= 0.5 || plan.target_height == 1,
                    "{w}x{h} @ {max_width}: got {plan:?}"
                );
                assert_eq!(plan.target_width, max_width);
            }
        }
    }

    #[test]
    fn quarter_turns_swap_canvas_dimensions() {
        let cfg = config(OutputFormat::Png, 300);
        for rotation in [90, 270, -90, 450] {
            let filters = ImageFilters {
                rotation,
                ..ImageFilters::IDENTITY
            };
            let p = plan(1200, 800, &cfg, &filters).unwrap();
            assert_eq!((p.canvas_width, p.canvas_height), (200, 300), "rotation {rotation}");
        }
        for rotation in [0, 180, 360, 45] {
            let filters = ImageFilters {
                rotation,
                ..ImageFilters::IDENTITY
            };
            let p = plan(1200, 800, &cfg, &filters).unwrap();
            assert_eq!((p.canvas_width, p.canvas_height), (300, 200), "rotation {rotation}");
        }
    }

    #[test]
    fn rendered_rotation_matches_plan() {
        let source = noisy_png(120, 80);
        let filters = ImageFilters {
            rotation: 90,
            ..ImageFilters::IDENTITY
        };
        let out = render(&source, &config(OutputFormat::Png, 60), &filters).unwrap();
        assert_eq!((out.width, out.height), (40, 60));
        assert_eq!(decoded_dims(&out.bytes), (40, 60));

        let filters = ImageFilters {
            rotation: 30,
            ..ImageFilters::IDENTITY
        };
        let out = render(&source, &config(OutputFormat::Png, 60), &filters).unwrap();
        assert_eq!(decoded_dims(&out.bytes), (60, 40));
    }

    #[test]
    fn compression_strictly_shrinks_output() {
        let source = noisy_png(400, 300);
        let mut previous = u64::MAX;
        for compression in [0.1, 0.3, 0.5, 0.7, 0.9] {
            let cfg = OutputConfig {
                use_compression: true,
                compression,
                ..config(OutputFormat::Png, 300)
            };
            let size = render(&source, &cfg, &ImageFilters::IDENTITY).unwrap().bytes.len() as u64;
            assert!(size < previous, "compression {compression}: {size} >= {previous}");
            previous = size;
        }
    }

    #[test]
    fn default_quality_ignores_quality_field() {
        for quality in [0.1, 0.5, 1.0] {
            let cfg = OutputConfig {
                use_custom_quality: false,
                quality,
                ..config(OutputFormat::Jpeg, 100)
            };
            assert_eq!(effective_quality(&cfg), DEFAULT_QUALITY);
        }
        let source = noisy_png(200, 100);
        let a = render(
            &source,
            &OutputConfig { quality: 0.1, ..config(OutputFormat::Jpeg, 100) },
            &ImageFilters::IDENTITY,
        )
        .unwrap();
        let b = render(
            &source,
            &OutputConfig { quality: 1.0, ..config(OutputFormat::Jpeg, 100) },
            &ImageFilters::IDENTITY,
        )
        .unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn custom_quality_has_a_floor_and_changes_jpeg_size() {
        let cfg = OutputConfig {
            use_custom_quality: true,
            quality: 0.0,
            ..config(OutputFormat::Jpeg, 100)
        };
        assert_eq!(effective_quality(&cfg), MIN_EFFECTIVE_QUALITY);

        let source = noisy_png(200, 100);
        let low = OutputConfig {
            use_custom_quality: true,
            quality: 0.1,
            ..config(OutputFormat::Jpeg, 200)
        };
        let high = OutputConfig { quality: 1.0, ..low };
        let low = render(&source, &low, &ImageFilters::IDENTITY).unwrap();
        let high = render(&source, &high, &ImageFilters::IDENTITY).unwrap();
        assert!(low.bytes.len() < high.bytes.len());
    }

    #[test]
    fn webp_size_grows_with_quality() {
        let source = noisy_png(200, 100);
        let low = OutputConfig {
            use_custom_quality: true,
            quality: 0.1,
            ..config(OutputFormat::Webp, 200)
        };
        let high = OutputConfig { quality: 1.0, ..low };
        let low = render(&source, &low, &ImageFilters::IDENTITY).unwrap();
        let high = render(&source, &high, &ImageFilters::IDENTITY).unwrap();
        assert!(
            low.bytes.len() < high.bytes.len(),
            "q=0.1 -> {}, q=1.0 -> {}",
            low.bytes.len(),
            high.bytes.len()
        );
        assert_eq!(decoded_dims(&low.bytes), (200, 100));
    }

    #[test]
    fn garbage_input_is_a_decode_error() {
        let err = render(b"definitely not an image", &config(OutputFormat::Png, 10), &ImageFilters::IDENTITY)
            .unwrap_err();
        assert!(matches!(err, RenderError::Decode(_)));
    }

    #[test]
    fn oversized_canvas_is_unavailable() {
        let err = plan(10, 10_000, &config(OutputFormat::Png, 100), &ImageFilters::IDENTITY)
            .unwrap_err();
        assert!(matches!(err, RenderError::Unavailable(_)));
    }

    #[test]
    fn zero_brightness_renders_black() {
        let source = noisy_png(20, 20);
        let filters = ImageFilters {
            brightness: 0.0,
            contrast: 100.0,
            ..ImageFilters::IDENTITY
        };
        let out = render(&source, &config(OutputFormat::Png, 20), &filters).unwrap();
        let img = image::load_from_memory(&out.bytes).unwrap().to_rgba8();
        assert!(img.pixels().all(|p| p.0[0] == 0 && p.0[1] == 0 && p.0[2] == 0));
    }

    #[test]
    fn zero_saturation_renders_grey() {
        let source = noisy_png(20, 20);
        let filters = ImageFilters {
            saturation: 0.0,
            ..ImageFilters::IDENTITY
        };
        let out = render(&source, &config(OutputFormat::Png, 20), &filters).unwrap();
        let img = image::load_from_memory(&out.bytes).unwrap().to_rgba8();
        assert!(img.pixels().all(|p| {
            let [r, g, b, _] = p.0;
            r.abs_diff(g) <= 1 && g.abs_diff(b) <= 1
        }));
    }

    #[test]
    fn webp_and_jpeg_outputs_decode() {
        let source = noisy_png(64, 32);
        for format in [OutputFormat::Jpeg, OutputFormat::Webp] {
            let out = render(&source, &config(format, 32), &ImageFilters::IDENTITY).unwrap();
            assert_eq!(decoded_dims(&out.bytes), (32, 16));
        }
    }

    #[test]
    fn estimate_is_zero_on_failure() {
        assert_eq!(estimate_size(b"nope", &OutputConfig::default()), 0);
        assert!(estimate_size(&noisy_png(40, 40), &OutputConfig::default()) > 0);
    }
}
