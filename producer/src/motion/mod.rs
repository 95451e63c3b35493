mod background;
mod detector;

pub use background::BackgroundModel;
pub use detector::MotionDetector;

/// Bounding box of the dominant changed region in a detection frame.
///
/// Bounds are inclusive pixel coordinates and always lie inside the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionRegion {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    /// Number of changed pixels in the region.
    pub area: u32,
    /// Mean absolute difference from the background over the region's changed
    /// pixels (0-255). The speckle pass only removes mask pixels, so every
    /// counted pixel is above the threshold.
    pub score: f32,
}

impl MotionRegion {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}
