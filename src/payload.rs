use crate::frame::CapturedImage;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Captured image is empty")]
    EmptyImage,
}

/// Encode the image bytes as standard (padded) base64 for the JSON body
pub fn encode(image: &CapturedImage) -> Result<String, PayloadError> {
    if image.is_empty() {
        return Err(PayloadError::EmptyImage);
    }
    Ok(STANDARD.encode(image.bytes()))
}
