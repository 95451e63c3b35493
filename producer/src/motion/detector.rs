use camfeed_common::config::MotionConfig;
use image::GrayImage;
use tracing::debug;

use super::{BackgroundModel, MotionRegion};

/// Background-subtraction motion detector with a warm-up period.
pub struct MotionDetector {
    model: BackgroundModel,
    /// Frames used only to build the background before motion is reported.
    warmup_frames: u64,
    /// Total frames seen.
    frames_seen: u64,
}

impl MotionDetector {
    pub fn new(model: BackgroundModel, warmup_frames: u64) -> Self {
        Self {
            model,
            warmup_frames,
            frames_seen: 0,
        }
    }

    pub fn from_config(config: &MotionConfig) -> Self {
        Self::new(BackgroundModel::from_config(config), config.frame_count)
    }

    pub fn is_warmed_up(&self) -> bool {
        self.frames_seen > self.warmup_frames
    }

    /// Feed one greyscale, blurred detection frame.
    ///
    /// The first `warmup_frames` calls only update the background and always
    /// return `None`. After that, detection runs against the background as it
    /// stood *before* this frame, and only then is the frame folded in.
    /// Updating first would absorb the change into the background and nothing
    /// would ever be detected.
    pub fn process_frame(&mut self, frame: &GrayImage) -> Option<MotionRegion> {
        self.frames_seen += 1;

        if self.frames_seen <= self.warmup_frames {
            self.model.update(frame);
            debug!(
                frames_seen = self.frames_seen,
                warmup_frames = self.warmup_frames,
                "warmup, building background"
            );
            return None;
        }

        let region = self.model.detect(frame);
        self.model.update(frame);

        if let Some(r) = &region {
            debug!(
                min_x = r.min_x,
                min_y = r.min_y,
                max_x = r.max_x,
                max_y = r.max_y,
                area = r.area,
                score = format!("{:.1}", r.score),
                "motion detected"
            );
        }
        region
    }
}
