use image::DynamicImage;

/// A decoded camera frame with capture metadata.
///
/// `seq` is assigned by the capture source and starts at 1, so a published
/// frame never carries tag 0. The pixel buffer is either 8-bit RGB or 8-bit
/// luma; transforms replace the image but keep `seq` and `captured_at_ms`.
#[derive(Debug, Clone)]
pub struct Frame {
    image: DynamicImage,
    seq: u64,
    captured_at_ms: i64,
}

impl Frame {
    pub fn new(image: DynamicImage, seq: u64, captured_at_ms: i64) -> Self {
        Self {
            image,
            seq,
            captured_at_ms,
        }
    }

    /// Stamp an image with the current wall-clock time.
    pub fn captured_now(image: DynamicImage, seq: u64) -> Self {
        Self::new(image, seq, chrono::Utc::now().timestamp_millis())
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Replace the pixel buffer, keeping capture order and timestamp.
    pub fn map_image(self, f: impl FnOnce(DynamicImage) -> DynamicImage) -> Self {
        Self {
            image: f(self.image),
            seq: self.seq,
            captured_at_ms: self.captured_at_ms,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn captured_at_ms(&self) -> i64 {
        self.captured_at_ms
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Channel depth: 3 for colour frames, 1 for greyscale.
    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn is_greyscale(&self) -> bool {
        self.channels() == 1
    }
}
