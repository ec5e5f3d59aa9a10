//! Local image upload
//!
//! Reads a user-selected image and turns it into a `data:` URI that can be
//! stored on a frame like any generated image.

use base64::Engine;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read image file: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a supported image file")]
    UnsupportedFormat,
}

/// Read `path` and encode it as a data URI.
pub async fn read_image_file(path: &Path) -> Result<String, UploadError> {
    let bytes = tokio::fs::read(path).await?;
    encode_data_uri(&bytes)
}

/// Encode raw image bytes as `data:<mime>;base64,<payload>`. The format is
/// sniffed from the bytes, not taken from a file extension.
pub fn encode_data_uri(bytes: &[u8]) -> Result<String, UploadError> {
    let format = image::guess_format(bytes).map_err(|_| UploadError::UnsupportedFormat)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", format.to_mime_type(), encoded))
}
