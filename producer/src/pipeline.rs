use camfeed_common::action::ActionCell;
use camfeed_common::config::{MotionConfig, PipelineConfig};
use camfeed_common::frame::Frame;
use camfeed_common::shutdown::ShutdownListener;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::filter::gaussian_blur_f32;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::buffer::SharedFrameBuffer;
use crate::capture::FrameSource;
use crate::motion::MotionDetector;
use crate::transform::FrameTransformer;
use crate::ProducerError;

/// Drives capture → detect → transform → publish.
///
/// The producer is the only writer of the [`SharedFrameBuffer`] and the only
/// owner of the [`MotionDetector`]. It reads the shared [`ActionCell`] once per
/// cycle.
pub struct FrameProducer<S> {
    source: S,
    detector: MotionDetector,
    transformer: FrameTransformer,
    action: Arc<ActionCell>,
    buffer: SharedFrameBuffer,
    working_width: u32,
    blur_sigma: f32,
}

impl<S: FrameSource> FrameProducer<S> {
    pub fn new(
        source: S,
        pipeline: &PipelineConfig,
        motion: &MotionConfig,
        action: Arc<ActionCell>,
        buffer: SharedFrameBuffer,
    ) -> Self {
        Self {
            source,
            detector: MotionDetector::from_config(motion),
            transformer: FrameTransformer::default(),
            action,
            buffer,
            working_width: pipeline.working_width,
            blur_sigma: pipeline.blur_sigma,
        }
    }

    /// Run until shutdown is requested or capture fails.
    ///
    /// A capture failure ends the loop; nothing else can populate the buffer,
    /// so it is reported once and returned rather than retried.
    pub async fn run(mut self, mut shutdown: ShutdownListener) -> Result<(), ProducerError> {
        info!(
            source = self.source.name(),
            working_width = self.working_width,
            "frame producer started"
        );
        let mut published: u64 = 0;

        loop {
            let captured = tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!(published, "shutdown requested, stopping frame producer");
                    return Ok(());
                }
                captured = self.source.next_frame() => captured,
            };

            let raw = match captured {
                Ok(frame) => frame,
                Err(e) => {
                    error!(error = %e, source = self.source.name(), published, "capture failed, stopping frame producer");
                    return Err(ProducerError::Capture(e));
                }
            };

            let frame = self.process(raw);
            self.buffer.publish(frame);
            published += 1;
            if published % 100 == 0 {
                debug!(published, "frames published");
            }
        }
    }

    /// One cycle without capture and publish.
    pub fn process(&mut self, raw: Frame) -> Frame {
        let working = raw.map_image(|img| self.resize(img));
        let detection = self.detection_frame(working.image());
        let region = self.detector.process_frame(&detection);
        let action = self.action.get();
        self.transformer.apply(working, region.as_ref(), action)
    }

    /// Scale to the working width, preserving aspect ratio.
    fn resize(&self, image: DynamicImage) -> DynamicImage {
        let rgb = image.into_rgb8();
        let (width, height) = rgb.dimensions();
        if width == self.working_width {
            return DynamicImage::ImageRgb8(rgb);
        }
        let scaled_height = (u64::from(height) * u64::from(self.working_width) / u64::from(width))
            .max(1) as u32;
        DynamicImage::ImageRgb8(image::imageops::resize(
            &rgb,
            self.working_width,
            scaled_height,
            FilterType::Triangle,
        ))
    }

    fn detection_frame(&self, image: &DynamicImage) -> GrayImage {
        gaussian_blur_f32(&image.to_luma8(), self.blur_sigma)
    }
}
