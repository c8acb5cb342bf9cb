//! Derivation of the two stored artifacts from an uploaded image.
//!
//! | Artifact | Geometry | Encoding |
//! |---|---|---|
//! | master | fit inside the configured cap, aspect kept, never upscaled | configured codec, master quality |
//! | thumbnail | exact square, centred crop then resize | configured codec, thumbnail quality |
//!
//! Codec failures never abort an upload: the affected artifact falls back to
//! the raw input bytes and is tagged [`Artifact::Passthrough`].

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageResult};

use crate::config::{OutputFormat, PhotoConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DerivationSettings {
    pub format: OutputFormat,
    pub master_max_width: u32,
    pub master_max_height: u32,
    pub master_quality: u8,
    pub thumbnail_size: u32,
    pub thumbnail_quality: u8,
}

impl From<&PhotoConfig> for DerivationSettings {
    fn from(config: &PhotoConfig) -> Self {
        Self {
            format: config.output_format,
            master_max_width: config.master_max_width,
            master_max_height: config.master_max_height,
            master_quality: config.master_quality,
            thumbnail_size: config.thumbnail_size,
            thumbnail_quality: config.thumbnail_quality,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Artifact {
    Derived {
        bytes: Bytes,
        width: u32,
        height: u32,
    },
    /// The original upload, stored as-is.
    Passthrough { bytes: Bytes, reason: String },
}

impl Artifact {
    pub fn bytes(&self) -> &Bytes {
        match self {
            Self::Derived { bytes, .. } | Self::Passthrough { bytes, .. } => bytes,
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, Self::Derived { .. })
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Derived { width, height, .. } => Some((*width, *height)),
            Self::Passthrough { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DerivedArtifacts {
    pub master: Artifact,
    pub thumbnail: Artifact,
    /// Intrinsic size of the upload, when it could be decoded.
    pub source_dimensions: Option<(u32, u32)>,
}

impl DerivedArtifacts {
    fn passthrough(raw: &Bytes, reason: String) -> Self {
        Self {
            master: Artifact::Passthrough {
                bytes: raw.clone(),
                reason: reason.clone(),
            },
            thumbnail: Artifact::Passthrough {
                bytes: raw.clone(),
                reason,
            },
            source_dimensions: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DerivationPipeline {
    settings: DerivationSettings,
}

impl DerivationPipeline {
    pub fn new(settings: DerivationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DerivationSettings {
        &self.settings
    }

    /// Runs [`derive`](Self::derive) on the blocking pool. A panic inside the
    /// codec degrades to a passthrough of both artifacts.
    pub async fn derive_off_thread(&self, raw: Bytes) -> DerivedArtifacts {
        let pipeline = self.clone();
        let input = raw.clone();
        match tokio::task::spawn_blocking(move || pipeline.derive(&input)).await {
            Ok(artifacts) => artifacts,
            Err(err) => {
                tracing::warn!(error = %err, "derivation task failed, storing original bytes");
                DerivedArtifacts::passthrough(&raw, format!("derivation task failed: {err}"))
            }
        }
    }

    pub fn derive(&self, raw: &Bytes) -> DerivedArtifacts {
        let image = match image::load_from_memory(raw) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(error = %err, bytes = raw.len(), "cannot decode upload, storing original bytes");
                return DerivedArtifacts::passthrough(raw, format!("decode failed: {err}"));
            }
        };

        let (width, height) = image.dimensions();
        tracing::debug!(width, height, bytes = raw.len(), "decoded upload");

        let master = self.derive_master(&image, raw);
        let thumbnail = self.derive_thumbnail(&image, raw);

        DerivedArtifacts {
            master,
            thumbnail,
            source_dimensions: Some((width, height)),
        }
    }

    fn derive_master(&self, image: &DynamicImage, raw: &Bytes) -> Artifact {
        let (target_w, target_h) = fit_within(
            image.dimensions(),
            (self.settings.master_max_width, self.settings.master_max_height),
        );

        let resized;
        let master = if (target_w, target_h) != image.dimensions() {
            resized = image.resize_exact(target_w, target_h, FilterType::CatmullRom);
            &resized
        } else {
            image
        };

        self.finish("master", master, self.settings.master_quality, raw)
    }

    fn derive_thumbnail(&self, image: &DynamicImage, raw: &Bytes) -> Artifact {
        let size = self.settings.thumbnail_size;
        // Crop before resizing so the working image never exceeds the source.
        let (x, y, side) = centered_square(image.dimensions());
        let thumbnail = image
            .crop_imm(x, y, side, side)
            .resize_exact(size, size, FilterType::Triangle);
        self.finish("thumbnail", &thumbnail, self.settings.thumbnail_quality, raw)
    }

    fn finish(&self, label: &str, image: &DynamicImage, quality: u8, raw: &Bytes) -> Artifact {
        match self.encode(image, quality) {
            Ok(encoded) if !encoded.is_empty() => {
                tracing::debug!(
                    artifact = label,
                    original_bytes = raw.len(),
                    encoded_bytes = encoded.len(),
                    "encoded artifact"
                );
                let (width, height) = image.dimensions();
                Artifact::Derived {
                    bytes: Bytes::from(encoded),
                    width,
                    height,
                }
            }
            Ok(_) => Artifact::Passthrough {
                bytes: raw.clone(),
                reason: "encoder produced no output".to_string(),
            },
            Err(err) => {
                tracing::warn!(artifact = label, error = %err, "encode failed, storing original bytes");
                Artifact::Passthrough {
                    bytes: raw.clone(),
                    reason: format!("encode failed: {err}"),
                }
            }
        }
    }

    fn encode(&self, image: &DynamicImage, quality: u8) -> ImageResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self.settings.format {
            OutputFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
                image.to_rgb8().write_with_encoder(encoder)?;
            }
            OutputFormat::WebP => {
                let (width, height) = image.dimensions();
                let quality = f32::from(quality);
                if image.color().has_alpha() {
                    let rgba = image.to_rgba8();
                    let encoded = webp::Encoder::from_rgba(&rgba, width, height).encode(quality);
                    buf.extend_from_slice(&encoded);
                } else {
                    let rgb = image.to_rgb8();
                    let encoded = webp::Encoder::from_rgb(&rgb, width, height).encode(quality);
                    buf.extend_from_slice(&encoded);
                }
            }
        }
        Ok(buf)
    }
}

/// Offset and side of the largest square centred in `source`.
pub fn centered_square(source: (u32, u32)) -> (u32, u32, u32) {
    let (w, h) = source;
    let side = w.min(h);
    ((w - side) / 2, (h - side) / 2, side)
}

/// Largest size with the source's aspect ratio that fits inside `cap`.
/// Sources already inside the cap are returned unchanged.
pub fn fit_within(source: (u32, u32), cap: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = cap;
    if src_w == 0 || src_h == 0 || (src_w <= max_w && src_h <= max_h) {
        return source;
    }

    let scale = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w);
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h);
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn settings() -> DerivationSettings {
        DerivationSettings::from(&PhotoConfig::default())
    }

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Bytes {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut buf, format).unwrap();
        Bytes::from(buf.into_inner())
    }

    fn decoded_dimensions(bytes: &Bytes) -> (u32, u32) {
        image::load_from_memory(bytes).unwrap().dimensions()
    }

    #[test]
    fn fit_within_scales_down_preserving_aspect() {
        assert_eq!(fit_within((4000, 3000), (1920, 1080)), (1440, 1080));
        assert_eq!(fit_within((2400, 1200), (1920, 1080)), (1920, 960));
        assert_eq!(fit_within((600, 2000), (1920, 1080)), (324, 1080));
    }

    #[test]
    fn fit_within_never_upscales() {
        assert_eq!(fit_within((200, 100), (1920, 1080)), (200, 100));
        assert_eq!(fit_within((1920, 1080), (1920, 1080)), (1920, 1080));
    }

    #[test]
    fn fit_within_keeps_extreme_ratios_non_zero() {
        let (w, h) = fit_within((100_000, 10), (1920, 1080));
        assert_eq!(w, 1920);
        assert_eq!(h, 1);
    }

    #[test]
    fn centered_square_takes_the_middle() {
        assert_eq!(centered_square((400, 300)), (50, 0, 300));
        assert_eq!(centered_square((300, 401)), (0, 50, 300));
        assert_eq!(centered_square((20_000, 2)), (9_999, 0, 2));
    }

    #[test]
    fn extreme_aspect_thumbnail_stays_bounded() {
        let pipeline = DerivationPipeline::new(settings());
        let raw = encoded(20_000, 2, ImageFormat::Png);

        let artifacts = pipeline.derive(&raw);

        assert_eq!(artifacts.source_dimensions, Some((20_000, 2)));
        assert!(artifacts.thumbnail.is_derived());
        assert_eq!(decoded_dimensions(artifacts.thumbnail.bytes()), (300, 300));
        assert_eq!(artifacts.master.dimensions(), Some((1920, 1)));
    }

    #[test]
    fn wide_upload_is_capped_and_thumbnail_is_square() {
        let pipeline = DerivationPipeline::new(settings());
        let raw = encoded(2400, 1200, ImageFormat::Png);

        let artifacts = pipeline.derive(&raw);

        assert_eq!(artifacts.source_dimensions, Some((2400, 1200)));
        assert!(artifacts.master.is_derived());
        assert_eq!(artifacts.master.dimensions(), Some((1920, 960)));
        assert_eq!(decoded_dimensions(artifacts.master.bytes()), (1920, 960));
        assert_eq!(decoded_dimensions(artifacts.thumbnail.bytes()), (300, 300));
    }

    #[test]
    fn tall_upload_is_capped_by_height() {
        let pipeline = DerivationPipeline::new(settings());
        let raw = encoded(600, 2000, ImageFormat::Jpeg);

        let artifacts = pipeline.derive(&raw);

        assert_eq!(decoded_dimensions(artifacts.master.bytes()), (324, 1080));
        assert_eq!(decoded_dimensions(artifacts.thumbnail.bytes()), (300, 300));
    }

    #[test]
    fn small_upload_keeps_size_but_thumbnail_is_exact() {
        let pipeline = DerivationPipeline::new(settings());
        let raw = encoded(200, 100, ImageFormat::Png);

        let artifacts = pipeline.derive(&raw);

        assert_eq!(artifacts.master.dimensions(), Some((200, 100)));
        assert_eq!(artifacts.thumbnail.dimensions(), Some((300, 300)));
        assert!(!artifacts.master.bytes().is_empty());
    }

    #[test]
    fn jpeg_output_is_jpeg() {
        let pipeline = DerivationPipeline::new(settings());
        let artifacts = pipeline.derive(&encoded(64, 64, ImageFormat::Png));
        assert_eq!(&artifacts.master.bytes()[..2], &[0xFF, 0xD8]);
        assert_eq!(
            image::guess_format(artifacts.thumbnail.bytes()).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn webp_output_is_webp() {
        let pipeline = DerivationPipeline::new(DerivationSettings {
            format: OutputFormat::WebP,
            ..settings()
        });
        let artifacts = pipeline.derive(&encoded(64, 48, ImageFormat::Png));
        assert_eq!(
            image::guess_format(artifacts.master.bytes()).unwrap(),
            ImageFormat::WebP
        );
        assert_eq!(decoded_dimensions(artifacts.thumbnail.bytes()), (300, 300));
        // Lossy bitstream, not VP8L.
        assert_eq!(&artifacts.master.bytes()[12..16], b"VP8 ");
        assert_eq!(&artifacts.thumbnail.bytes()[12..16], b"VP8 ");
    }

    #[test]
    fn webp_thumbnail_honours_its_own_quality() {
        let pipeline_at = |thumbnail_quality| {
            DerivationPipeline::new(DerivationSettings {
                format: OutputFormat::WebP,
                master_quality: 80,
                thumbnail_quality,
                ..settings()
            })
        };
        let raw = encoded(600, 600, ImageFormat::Png);

        let low = pipeline_at(10).derive(&raw);
        let high = pipeline_at(95).derive(&raw);

        assert_eq!(low.master.bytes(), high.master.bytes());
        assert!(low.thumbnail.bytes().len() < high.thumbnail.bytes().len());
    }

    #[test]
    fn undecodable_upload_passes_through() {
        let pipeline = DerivationPipeline::new(settings());
        let raw = Bytes::from(vec![0x42; 512]);

        let artifacts = pipeline.derive(&raw);

        assert!(!artifacts.master.is_derived());
        assert!(!artifacts.thumbnail.is_derived());
        assert_eq!(artifacts.master.bytes(), &raw);
        assert_eq!(artifacts.thumbnail.bytes(), &raw);
        assert_eq!(artifacts.source_dimensions, None);
        match &artifacts.master {
            Artifact::Passthrough { reason, .. } => assert!(reason.starts_with("decode failed")),
            other => panic!("unexpected artifact {other:?}"),
        }
    }

    #[tokio::test]
    async fn derive_off_thread_matches_inline_result() {
        let pipeline = DerivationPipeline::new(settings());
        let raw = encoded(320, 240, ImageFormat::Png);

        let artifacts = pipeline.derive_off_thread(raw).await;

        assert_eq!(artifacts.master.dimensions(), Some((320, 240)));
        assert_eq!(artifacts.thumbnail.dimensions(), Some((300, 300)));
    }
}
