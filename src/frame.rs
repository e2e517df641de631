use crate::capture::{CaptureSource, CAPTURE_HEIGHT, CAPTURE_WIDTH};
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};
use std::path::{Path, PathBuf};

/// JPEG quality used when freezing a camera frame (matches canvas export)
pub const JPEG_QUALITY: u8 = 92;

/// Where a captured image came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOrigin {
    /// Frozen camera frame; `resolution` is what the camera delivered before stretching
    Camera { resolution: (u32, u32) },
    File(PathBuf),
}

/// One compressed still frame, immutable once created
#[derive(Debug, Clone)]
pub struct CapturedImage {
    bytes: Vec<u8>,
    origin: ImageOrigin,
}

impl CapturedImage {
    pub fn new(bytes: Vec<u8>, origin: ImageOrigin) -> Self {
        Self { bytes, origin }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn origin(&self) -> &ImageOrigin {
        &self.origin
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Snapshot the current frame of `source` as a 640x480 JPEG.
///
/// Returns `Ok(None)` without touching anything when no source is attached.
pub fn capture_from_stream(source: Option<&mut dyn CaptureSource>) -> Result<Option<CapturedImage>> {
    let Some(source) = source else {
        tracing::debug!("No live frame source attached, skipping capture");
        return Ok(None);
    };

    let _span = tracing::debug_span!("capture_from_stream").entered();

    let frame = source
        .capture_frame()
        .context("Failed to capture frame")?;

    let resolution = source.resolution();
    if resolution != (CAPTURE_WIDTH, CAPTURE_HEIGHT) {
        tracing::debug!(
            "Stretching {}x{} frame onto {}x{} surface",
            resolution.0,
            resolution.1,
            CAPTURE_WIDTH,
            CAPTURE_HEIGHT
        );
    }

    let bytes = encode_jpeg(&frame)?;
    tracing::debug!("Captured {} byte JPEG", bytes.len());

    Ok(Some(CapturedImage::new(bytes, ImageOrigin::Camera { resolution })))
}

/// Use a user-supplied image file as the payload, bytes untouched
pub fn capture_from_file<P: AsRef<Path>>(path: P) -> Result<CapturedImage> {
    let path = path.as_ref();

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image file {}", path.display()))?;

    tracing::debug!("Loaded {} bytes from {}", bytes.len(), path.display());

    Ok(CapturedImage::new(bytes, ImageOrigin::File(path.to_path_buf())))
}

/// Draw the frame onto the fixed capture surface and compress it
fn encode_jpeg(frame: &RgbImage) -> Result<Vec<u8>> {
    // Stretch, like drawing a video onto a fixed-size canvas
    let surface = if frame.dimensions() != (CAPTURE_WIDTH, CAPTURE_HEIGHT) {
        imageops::resize(
            frame,
            CAPTURE_WIDTH,
            CAPTURE_HEIGHT,
            imageops::FilterType::Triangle,
        )
    } else {
        frame.clone()
    };

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&surface)
        .context("Failed to encode frame as JPEG")?;

    Ok(bytes)
}
