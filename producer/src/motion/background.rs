use camfeed_common::config::MotionConfig;
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::warn;

use super::MotionRegion;

/// Radius of the erode-then-dilate pass that removes speckle from the threshold mask.
const SPECKLE_RADIUS: u8 = 2;

/// Running weighted average of scene brightness.
///
/// Frames fed to the model are expected to be greyscale and blurred, all of
/// the same dimensions. The accumulator is only ever combined as
/// `acc = α·frame + (1-α)·acc`; it is initialised by the first `update` and
/// never reset afterwards.
pub struct BackgroundModel {
    accumulator: Option<Accumulator>,
    accum_weight: f32,
    threshold: u8,
    min_area: u32,
}

struct Accumulator {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl BackgroundModel {
    pub fn new(accum_weight: f32, threshold: u8, min_area: u32) -> Self {
        Self {
            accumulator: None,
            accum_weight,
            threshold,
            min_area,
        }
    }

    pub fn from_config(config: &MotionConfig) -> Self {
        Self::new(config.accum_weight, config.threshold, config.min_area)
    }

    pub fn is_initialized(&self) -> bool {
        self.accumulator.is_some()
    }

    /// Fold `frame` into the running average.
    pub fn update(&mut self, frame: &GrayImage) {
        match self.accumulator.as_mut() {
            None => {
                self.accumulator = Some(Accumulator {
                    width: frame.width(),
                    height: frame.height(),
                    values: frame.as_raw().iter().map(|&p| f32::from(p)).collect(),
                });
            }
            Some(acc) => {
                if frame.dimensions() != (acc.width, acc.height) {
                    warn!(
                        expected = format!("{}x{}", acc.width, acc.height),
                        got = format!("{}x{}", frame.width(), frame.height()),
                        "detection frame size changed, not updating background"
                    );
                    return;
                }
                let alpha = self.accum_weight;
                for (value, &pixel) in acc.values.iter_mut().zip(frame.as_raw()) {
                    *value = alpha * f32::from(pixel) + (1.0 - alpha) * *value;
                }
            }
        }
    }

    /// Compare `frame` against the background without changing it.
    ///
    /// Returns the bounding box of the largest 8-connected region whose
    /// difference exceeds the threshold and whose area reaches the minimum, or
    /// `None` if there is no background yet or nothing qualifies.
    pub fn detect(&self, frame: &GrayImage) -> Option<MotionRegion> {
        let background = self.accumulator.as_ref()?;
        let (width, height) = frame.dimensions();
        if (width, height) != (background.width, background.height) {
            warn!(
                expected = format!("{}x{}", background.width, background.height),
                got = format!("{width}x{height}"),
                "detection frame size changed, skipping detection"
            );
            return None;
        }

        let delta: Vec<u8> = frame
            .as_raw()
            .iter()
            .zip(&background.values)
            .map(|(&pixel, &bg)| pixel.abs_diff(bg.round() as u8))
            .collect();
        let mask: Vec<u8> = delta
            .iter()
            .map(|&d| if d > self.threshold { 255 } else { 0 })
            .collect();
        let mask = GrayImage::from_raw(width, height, mask)?;
        let mask = dilate(
            &erode(&mask, Norm::LInf, SPECKLE_RADIUS),
            Norm::LInf,
            SPECKLE_RADIUS,
        );

        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));
        let mut components: Vec<Component> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0] as usize;
            if label == 0 {
                continue;
            }
            if components.len() < label {
                components.resize(label, Component::EMPTY);
            }
            let d = delta[(y * width + x) as usize];
            components[label - 1].add(x, y, d);
        }

        let best = components
            .iter()
            .filter(|c| c.area >= self.min_area)
            .max_by_key(|c| c.area)?;

        Some(MotionRegion {
            min_x: best.min_x,
            min_y: best.min_y,
            max_x: best.max_x,
            max_y: best.max_y,
            area: best.area,
            score: best.delta_sum as f32 / best.area as f32,
        })
    }
}

#[derive(Clone, Copy)]
struct Component {
    area: u32,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    delta_sum: u64,
}

impl Component {
    const EMPTY: Component = Component {
        area: 0,
        min_x: u32::MAX,
        min_y: u32::MAX,
        max_x: 0,
        max_y: 0,
        delta_sum: 0,
    };

    fn add(&mut self, x: u32, y: u32, delta: u8) {
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.delta_sum += u64::from(delta);
    }
}
