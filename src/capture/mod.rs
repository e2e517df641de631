mod webcam;

pub use webcam::WebcamCapture;

use anyhow::Result;
use image::RgbImage;

/// Width of the capture surface requested from the camera
pub const CAPTURE_WIDTH: u32 = 640;

/// Height of the capture surface requested from the camera
pub const CAPTURE_HEIGHT: u32 = 480;

/// Trait for live frame sources
pub trait CaptureSource {
    /// Grab the current frame
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Resolution the source delivers frames at
    fn resolution(&self) -> (u32, u32);

    /// Release the underlying device. Safe to call more than once.
    fn release(&mut self) {}
}

/// Open the camera at `device_index`.
///
/// Failure to open the device (no camera, permission denied) is not fatal:
/// it is logged and `None` is returned, leaving only file uploads available.
pub fn acquire(device_index: u32) -> Option<WebcamCapture> {
    match WebcamCapture::new(device_index, CAPTURE_WIDTH, CAPTURE_HEIGHT) {
        Ok(camera) => Some(camera),
        Err(err) => {
            tracing::warn!("Error accessing camera {}: {:#}", device_index, err);
            tracing::warn!("Continuing in upload-only mode");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_camera_degrades_to_upload_only() {
        assert!(acquire(4000).is_none());
    }
}
