use camfeed_common::action::Action;
use camfeed_common::frame::Frame;
use image::{DynamicImage, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::motion::MotionRegion;

const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const OVERLAY_THICKNESS: u32 = 2;

/// Applies the selected [`Action`] to a working frame.
///
/// Actions are mutually exclusive: exactly one transform (or none) runs per
/// frame. Rotations are exact pixel permutations.
#[derive(Debug, Clone)]
pub struct FrameTransformer {
    overlay_color: Rgb<u8>,
    overlay_thickness: u32,
}

impl Default for FrameTransformer {
    fn default() -> Self {
        Self {
            overlay_color: OVERLAY_COLOR,
            overlay_thickness: OVERLAY_THICKNESS,
        }
    }
}

impl FrameTransformer {
    pub fn new(overlay_color: Rgb<u8>, overlay_thickness: u32) -> Self {
        Self {
            overlay_color,
            overlay_thickness: overlay_thickness.max(1),
        }
    }

    pub fn apply(&self, frame: Frame, region: Option<&MotionRegion>, action: Action) -> Frame {
        match action {
            Action::None => frame,
            Action::RotateLeft => frame.map_image(|img| img.rotate270()),
            Action::RotateRight => frame.map_image(|img| img.rotate90()),
            Action::Flip180 => frame.map_image(|img| img.rotate180()),
            Action::Greyscale => frame.map_image(|img| DynamicImage::ImageLuma8(img.to_luma8())),
            Action::MotionOverlay => match region {
                Some(region) => frame.map_image(|img| self.draw_region(img, region)),
                None => frame,
            },
        }
    }

    /// Outline `region` inward from its inclusive bounds.
    fn draw_region(&self, image: DynamicImage, region: &MotionRegion) -> DynamicImage {
        let mut canvas = image.into_rgb8();
        let (width, height) = (region.width(), region.height());
        for inset in 0..self.overlay_thickness {
            if width <= 2 * inset || height <= 2 * inset {
                break;
            }
            let rect = Rect::at((region.min_x + inset) as i32, (region.min_y + inset) as i32)
                .of_size(width - 2 * inset, height - 2 * inset);
            draw_hollow_rect_mut(&mut canvas, rect, self.overlay_color);
        }
        DynamicImage::ImageRgb8(canvas)
    }
}
