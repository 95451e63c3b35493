//! Frame pipeline: capture sources, motion detection, transforms, and the
//! single-slot buffer that hands processed frames to stream consumers.

pub mod buffer;
pub mod capture;
pub mod motion;
pub mod pipeline;
pub mod transform;

pub use buffer::{FrameSubscriber, SharedFrameBuffer};
pub use capture::{CameraSource, CaptureError, FrameSource};
pub use pipeline::FrameProducer;

#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
}
