use bytes::{Bytes, BytesMut};
use camfeed_common::frame::Frame;
use camfeed_producer::FrameSubscriber;
use futures_util::stream::{self, Stream};
use image::codecs::jpeg::JpegEncoder;
use std::convert::Infallible;
use tracing::debug;

/// Content type of `/video_feed` responses.
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// Per-connection MJPEG encoder.
///
/// Waits for each new frame in the shared buffer, JPEG-encodes it on the
/// blocking pool and wraps it as one multipart chunk. Frames that fail to
/// encode are skipped. The sequence ends only on shutdown or when the
/// connection drops the body.
pub struct StreamEncoder {
    subscriber: FrameSubscriber,
    quality: u8,
    sent: u64,
}

impl StreamEncoder {
    pub fn new(subscriber: FrameSubscriber, quality: u8) -> Self {
        Self {
            subscriber,
            quality,
            sent: 0,
        }
    }

    /// Next multipart chunk, or `None` once the stream is over.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        loop {
            let frame = self.subscriber.next_frame().await?;
            let seq = frame.seq();
            let quality = self.quality;
            match tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality)).await {
                Ok(Ok(jpeg)) => {
                    self.sent += 1;
                    return Some(multipart_chunk(&jpeg));
                }
                Ok(Err(e)) => debug!(error = %e, seq, "failed to encode frame, skipping"),
                Err(e) => debug!(error = %e, seq, "encode task failed, skipping"),
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        stream::unfold(self, |mut encoder| async move {
            let chunk = encoder.next_chunk().await?;
            Some((Ok(chunk), encoder))
        })
    }
}

impl Drop for StreamEncoder {
    fn drop(&mut self) {
        debug!(sent = self.sent, "stream client disconnected");
    }
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Vec::new();
    frame
        .image()
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
    Ok(out)
}

/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`
pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + PART_TRAILER.len());
    buf.extend_from_slice(PART_HEADER);
    buf.extend_from_slice(jpeg);
    buf.extend_from_slice(PART_TRAILER);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camfeed_common::action::{Action, ActionCell};
    use camfeed_common::config::{MotionConfig, PipelineConfig};
    use camfeed_common::shutdown::Shutdown;
    use camfeed_producer::{CaptureError, FrameProducer, FrameSource, SharedFrameBuffer};
    use futures_util::StreamExt;
    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    fn jpeg_of(chunk: &[u8]) -> &[u8] {
        assert!(chunk.starts_with(PART_HEADER));
        assert!(chunk.ends_with(PART_TRAILER));
        &chunk[PART_HEADER.len()..chunk.len() - PART_TRAILER.len()]
    }

    #[test]
    fn chunk_layout_is_byte_exact() {
        let chunk = multipart_chunk(b"JPEG");
        assert_eq!(
            &chunk[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n"
        );
    }

    #[test]
    fn encodes_colour_and_greyscale_frames() {
        let colour = Frame::new(DynamicImage::ImageRgb8(RgbImage::new(16, 8)), 1, 0);
        let grey = Frame::new(DynamicImage::ImageLuma8(GrayImage::new(16, 8)), 2, 0);
        for frame in [colour, grey] {
            let jpeg = encode_jpeg(&frame, 80).unwrap();
            assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
            let decoded = image::load_from_memory(&jpeg).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (16, 8));
        }
    }

    #[test]
    fn unencodable_frame_is_an_error() {
        // JPEG has no alpha channel.
        let rgba = Frame::new(DynamicImage::new_rgba16(4, 4), 1, 0);
        assert!(encode_jpeg(&rgba, 80).is_err());
    }

    #[tokio::test]
    async fn unencodable_frames_are_skipped() {
        let shutdown = Shutdown::new();
        let buffer = SharedFrameBuffer::new();
        let mut encoder = StreamEncoder::new(buffer.subscribe(shutdown.listener()), 80);

        buffer.publish(Frame::new(DynamicImage::new_rgba16(4, 4), 1, 0));
        let skipped = tokio::time::timeout(Duration::from_millis(50), encoder.next_chunk()).await;
        assert!(skipped.is_err(), "bad frame must not produce a chunk");

        buffer.publish(Frame::new(DynamicImage::ImageLuma8(GrayImage::new(4, 4)), 2, 0));
        let chunk = tokio::time::timeout(Duration::from_secs(1), encoder.next_chunk())
            .await
            .unwrap()
            .unwrap();
        image::load_from_memory(jpeg_of(&chunk)).unwrap();
    }

    #[tokio::test]
    async fn stream_ends_on_shutdown() {
        let shutdown = Shutdown::new();
        let buffer = SharedFrameBuffer::new();
        let mut stream =
            Box::pin(StreamEncoder::new(buffer.subscribe(shutdown.listener()), 80).into_stream());
        shutdown.trigger();
        let end = tokio::time::timeout(Duration::from_secs(1), stream.next()).await.unwrap();
        assert!(end.is_none());
    }

    /// Emits frames 1..=5 and selects RotateLeft when frame 3 is captured.
    struct ScriptedCamera {
        frames: VecDeque<Frame>,
        action: Arc<ActionCell>,
    }

    impl FrameSource for ScriptedCamera {
        async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            match self.frames.pop_front() {
                Some(frame) => {
                    if frame.seq() >= 3 {
                        self.action.set(Action::RotateLeft);
                    }
                    Ok(frame)
                }
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn encoder_emits_rotated_frame_once_selected() {
        let shutdown = Shutdown::new();
        let buffer = SharedFrameBuffer::new();
        let action = Arc::new(ActionCell::default());

        let mut stream =
            Box::pin(StreamEncoder::new(buffer.subscribe(shutdown.listener()), 80).into_stream());

        // Nothing published yet: the encoder must not emit anything.
        let early = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(early.is_err());

        let frames = (1..=5)
            .map(|seq| {
                let img = RgbImage::from_pixel(400, 300, Rgb([seq as u8 * 40, 90, 90]));
                Frame::new(DynamicImage::ImageRgb8(img), seq, 0)
            })
            .collect();
        let camera = ScriptedCamera {
            frames,
            action: Arc::clone(&action),
        };
        let producer = FrameProducer::new(
            camera,
            &PipelineConfig::default(),
            &MotionConfig::default(),
            Arc::clone(&action),
            buffer.clone(),
        );
        let producer = tokio::spawn(producer.run(shutdown.listener()));

        let mut dims = Vec::new();
        loop {
            let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
                .await
                .expect("encoder stalled")
                .unwrap()
                .unwrap();
            let decoded = image::load_from_memory(jpeg_of(&chunk)).unwrap();
            dims.push((decoded.width(), decoded.height()));
            if (decoded.width(), decoded.height()) == (300, 400) {
                break;
            }
        }
        assert!(dims.iter().all(|d| *d == (400, 300) || *d == (300, 400)));
        assert!(buffer.read_latest().unwrap().seq() >= 3);

        shutdown.trigger();
        producer.await.unwrap().unwrap();
    }

    #[test]
    fn luma_tag_survives_encoding() {
        let frame = Frame::new(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 16, Luma([200]))),
            1,
            0,
        );
        let jpeg = encode_jpeg(&frame, 95).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap().to_luma8();
        assert!(decoded.pixels().all(|p| p[0].abs_diff(200) <= 2));
    }
}
