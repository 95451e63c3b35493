use camfeed_common::frame::Frame;
use image::{DynamicImage, Rgb, RgbImage};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

use super::{CaptureError, FrameSource};

const BACKGROUND: Rgb<u8> = Rgb([40, 60, 40]);
const SQUARE: Rgb<u8> = Rgb([230, 220, 200]);
const STEP_PX: u32 = 4;

/// Deterministic test pattern: a bright square sliding across a dark scene.
///
/// Useful without a camera attached; the moving square gives the motion
/// detector something to find once warm-up is over.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    ticker: Interval,
    seq: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, interval: Duration) -> Self {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            width: width.max(1),
            height: height.max(1),
            ticker,
            seq: 0,
        }
    }

    /// Render frame `seq` of the pattern.
    pub fn render(&self, seq: u64) -> RgbImage {
        let side = (self.height / 6).max(1);
        let travel = u64::from(self.width.saturating_sub(side).max(1));
        let x0 = ((seq * u64::from(STEP_PX)) % travel) as u32;
        let y0 = (self.height - side) / 2;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            if (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y) {
                SQUARE
            } else {
                BACKGROUND
            }
        })
    }
}

impl FrameSource for SyntheticSource {
    async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.ticker.tick().await;
        self.seq += 1;
        let image = DynamicImage::ImageRgb8(self.render(self.seq));
        Ok(Frame::captured_now(image, self.seq))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
