//! Upload ingestion: mime/size validation, malware scan hook and image
//! normalization.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];
pub const ALLOWED_AUDIO_TYPES: &[&str] = &[
    "audio/webm",
    "audio/ogg",
    "audio/mpeg",
    "audio/mp4",
    "audio/wav",
];
const JPEG_QUALITY: u8 = 85;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("unsupported media type '{0}'")]
    UnsupportedMediaType(String),
    #[error("file is empty")]
    Empty,
    #[error("file exceeds the {limit_bytes} byte limit")]
    TooLarge { limit_bytes: usize },
    #[error("image could not be decoded: {0}")]
    Decode(String),
    #[error("file rejected by malware scan: {0}")]
    Rejected(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Normalize a declared content type and check it against `allowed`.
/// Parameters are dropped and common aliases folded (`image/jpg`, `audio/x-wav`).
pub fn validate_mime_type(declared: &str, allowed: &[&str]) -> Result<String, IngestError> {
    let base = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let normalized = match base.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "audio/x-wav" | "audio/wave" => "audio/wav".to_string(),
        "audio/mp3" => "audio/mpeg".to_string(),
        _ => base,
    };
    if allowed.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(IngestError::UnsupportedMediaType(declared.to_string()))
    }
}

pub fn validate_size(len: usize, limit_bytes: usize) -> Result<(), IngestError> {
    if len == 0 {
        return Err(IngestError::Empty);
    }
    if len > limit_bytes {
        return Err(IngestError::TooLarge { limit_bytes });
    }
    Ok(())
}

/// Scan hook run on every stored upload before it is used.
#[async_trait]
pub trait MalwareScanner: Send + Sync {
    async fn scan(&self, path: &Path) -> Result<(), IngestError>;
}

/// Accepts everything. Replace with a real scanner in production.
pub struct NoopScanner;

#[async_trait]
impl MalwareScanner for NoopScanner {
    async fn scan(&self, path: &Path) -> Result<(), IngestError> {
        tracing::debug!(path = %path.display(), "malware scan skipped (noop scanner)");
        Ok(())
    }
}

/// Decode, bound the longest side to `max_dimension`, and re-encode as JPEG
/// next to `source`. Re-encoding drops EXIF and other metadata.
pub async fn preprocess_image(source: &Path, max_dimension: u32) -> Result<PathBuf, IngestError> {
    let source = source.to_path_buf();
    let target = source.with_extension("jpg");
    let output = target.clone();

    tokio::task::spawn_blocking(move || -> Result<(), IngestError> {
        let bytes = std::fs::read(&source)?;
        let decoded =
            image::load_from_memory(&bytes).map_err(|err| IngestError::Decode(err.to_string()))?;
        let bounded = bound_dimensions(decoded, max_dimension);
        let rgb = DynamicImage::ImageRgb8(bounded.to_rgb8());

        let mut writer = BufWriter::new(File::create(&output)?);
        JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
            .encode_image(&rgb)
            .map_err(|err| IngestError::Decode(err.to_string()))?;
        writer.flush()?;
        Ok(())
    })
    .await
    .map_err(|err| IngestError::Decode(format!("preprocess task failed: {err}")))??;

    Ok(target)
}

fn bound_dimensions(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    if max_dimension == 0 || (image.width() <= max_dimension && image.height() <= max_dimension) {
        return image;
    }
    image.resize(max_dimension, max_dimension, FilterType::Triangle)
}
