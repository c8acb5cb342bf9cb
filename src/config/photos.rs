use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Lossy codec used for both derived artifacts. Determines the file
/// extension and the content type artifacts are served with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    WebP,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            other => Err(anyhow!("unsupported output format: {}", other)),
        }
    }
}

/// Immutable settings for photo storage and derivation.
///
/// Built once at startup and handed to the photo service, which splits it
/// between the path resolver, the derivation pipeline and upload validation.
#[derive(Clone, Debug)]
pub struct PhotoConfig {
    pub storage_root: PathBuf,
    pub public_prefix: String,
    pub output_format: OutputFormat,
    pub master_max_width: u32,
    pub master_max_height: u32,
    pub master_quality: u8,
    pub thumbnail_size: u32,
    pub thumbnail_quality: u8,
    pub min_upload_bytes: usize,
    pub max_upload_bytes: usize,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("albums"),
            public_prefix: "/files".to_string(),
            output_format: OutputFormat::Jpeg,
            master_max_width: 1920,
            master_max_height: 1080,
            master_quality: 80,
            thumbnail_size: 300,
            thumbnail_quality: 70,
            min_upload_bytes: 100,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl PhotoConfig {
    pub fn with_root(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.master_max_width == 0 || self.master_max_height == 0 {
            return Err(anyhow!("master dimension caps must be positive"));
        }
        if self.thumbnail_size == 0 {
            return Err(anyhow!("thumbnail size must be positive"));
        }
        for (name, quality) in [
            ("MASTER_QUALITY", self.master_quality),
            ("THUMBNAIL_QUALITY", self.thumbnail_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(anyhow!("invalid {}: expected 1-100", name));
            }
        }
        if self.min_upload_bytes == 0 || self.min_upload_bytes > self.max_upload_bytes {
            return Err(anyhow!("upload byte bounds are inconsistent"));
        }
        Ok(())
    }
}
