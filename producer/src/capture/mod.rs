pub mod mjpeg;
pub mod snapshot;
pub mod synthetic;

use camfeed_common::config::{CameraConfig, SourceKind};
use camfeed_common::frame::Frame;
use image::{DynamicImage, ImageReader};
use std::future::Future;
use std::io::Cursor;
use std::time::Duration;

pub use mjpeg::MjpegSource;
pub use snapshot::SnapshotSource;
pub use synthetic::SyntheticSource;

/// A camera-like device delivering decoded colour frames.
///
/// `next_frame` waits until the next frame is available. An error means the
/// source can make no further progress.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> impl Future<Output = Result<Frame, CaptureError>> + Send;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    HttpStream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("camera stream ended")]
    StreamEnded,
    #[error("failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),
}

/// The source selected by `[camera]` configuration.
pub enum CameraSource {
    Mjpeg(MjpegSource),
    Snapshot(SnapshotSource),
    Synthetic(SyntheticSource),
}

impl CameraSource {
    pub async fn open(config: &CameraConfig) -> Result<Self, CaptureError> {
        let interval = Duration::from_secs_f64(1.0 / config.fps);
        let source = match config.source {
            SourceKind::Mjpeg => Self::Mjpeg(MjpegSource::connect(&config.url).await?),
            SourceKind::Snapshot => Self::Snapshot(SnapshotSource::new(&config.url, interval)?),
            SourceKind::Synthetic => {
                Self::Synthetic(SyntheticSource::new(config.width, config.height, interval))
            }
        };
        Ok(source)
    }
}

impl FrameSource for CameraSource {
    async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        match self {
            Self::Mjpeg(source) => source.next_frame().await,
            Self::Snapshot(source) => source.next_frame().await,
            Self::Synthetic(source) => source.next_frame().await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Mjpeg(source) => source.name(),
            Self::Snapshot(source) => source.name(),
            Self::Synthetic(source) => source.name(),
        }
    }
}

/// Decode an encoded image (JPEG from network cameras) into an RGB frame buffer.
pub(crate) fn decode_rgb(data: &[u8]) -> Result<DynamicImage, CaptureError> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .decode()?;
    Ok(DynamicImage::ImageRgb8(img.into_rgb8()))
}
