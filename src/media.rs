//! Recipe images: base64 data-URI decoding and storage under the media root.

use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageReader;
use uuid::Uuid;

use crate::{constants::IMAGE_DIRECTORY, error::ApiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    fn from_detected(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::WebP => Some(Self::Webp),
            _ => None,
        }
    }

    /// Guesses the format from the content and decodes the whole image.
    /// The declared mime type is not trusted.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?;
        let format = reader.format().and_then(Self::from_detected)?;

        match reader.decode() {
            Ok(_) => Some(format),
            Err(e) => {
                log::debug!("Rejected {format:?} upload: {e}");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

/// Decodes `data:image/<type>;base64,<payload>`.
pub fn decode_data_uri(value: &str) -> Result<ImageUpload, String> {
    let invalid = || String::from("Upload a valid image.");

    let rest = value.strip_prefix("data:image/").ok_or_else(invalid)?;
    let (_mime, payload) = rest.split_once(";base64,").ok_or_else(invalid)?;

    let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
    let format = ImageFormat::detect(&bytes).ok_or_else(|| {
        String::from("Upload a valid image. The file you uploaded was either not an image or a corrupted image.")
    })?;

    Ok(ImageUpload { format, bytes })
}

/// Writes the image under a fresh name and returns its path relative to `root`.
pub async fn store_image(root: &Path, image: &ImageUpload) -> Result<String, ApiError> {
    let relative = format!(
        "{IMAGE_DIRECTORY}/{}.{}",
        Uuid::new_v4(),
        image.format.extension()
    );
    let path = root.join(&relative);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ApiError::Internal(format!("Could not create media directory: {e}")))?;
    }
    tokio::fs::write(&path, &image.bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("Could not store image: {e}")))?;

    log::debug!("Stored image {relative} ({} bytes)", image.bytes.len());
    Ok(relative)
}

/// Best effort; a leftover file is logged and otherwise ignored.
pub async fn remove_image(root: &Path, relative: &str) {
    let path: PathBuf = root.join(relative);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        log::warn!("Could not remove image {}: {e}", path.display());
    }
}

pub fn image_url(media_url: &str, relative: &str) -> String {
    format!("{}/{}", media_url.trim_end_matches('/'), relative)
}
