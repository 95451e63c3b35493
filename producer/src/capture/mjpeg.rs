use bytes::{Bytes, BytesMut};
use camfeed_common::frame::Frame;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{decode_rgb, CaptureError, FrameSource};

const DEFAULT_BOUNDARY: &str = "frame";
const HEADER_END: &[u8] = b"\r\n\r\n";
/// Parts larger than this are dropped rather than buffered.
pub const MAX_PART_SIZE: usize = 8 * 1024 * 1024;

/// Parse state for a multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--{boundary}\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting the part body. With a `Content-Length` header the body is
    /// complete once that many bytes arrived; otherwise it ends at the next boundary.
    CollectingBody { content_length: Option<usize> },
}

/// Incremental splitter for `multipart/x-mixed-replace` bodies.
///
/// Chunks are pushed as they arrive from the network; complete part bodies
/// are pulled with [`MultipartParser::next_part`]. Boundaries may straddle
/// chunk edges.
pub struct MultipartParser {
    boundary: Vec<u8>,
    buffer: BytesMut,
    state: ParseState,
    scan_from: usize,
    max_part_size: usize,
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        let boundary = boundary.trim_start_matches("--");
        Self {
            boundary: format!("--{boundary}\r\n").into_bytes(),
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            scan_from: 0,
            max_part_size: MAX_PART_SIZE,
        }
    }

    pub fn with_max_part_size(mut self, max_part_size: usize) -> Self {
        self.max_part_size = max_part_size;
        self
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pop the next complete part body, if one is buffered.
    pub fn next_part(&mut self) -> Option<Bytes> {
        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, &self.boundary) {
                        // Discard everything up to and including the boundary
                        let _ = self.buffer.split_to(pos + self.boundary.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep last few bytes in case boundary spans chunks
                        if self.buffer.len() > self.boundary.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - self.boundary.len());
                        }
                        return None;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    let Some(pos) = find_subsequence(&self.buffer, HEADER_END) else {
                        if self.buffer.len() > self.max_part_size {
                            self.drop_part("part headers never terminated");
                        }
                        return None;
                    };
                    let headers = self.buffer.split_to(pos + HEADER_END.len());
                    self.scan_from = 0;
                    self.state = ParseState::CollectingBody {
                        content_length: content_length(&headers),
                    };
                }
                ParseState::CollectingBody {
                    content_length: Some(len),
                } => {
                    if len > self.max_part_size {
                        // The body bytes are discarded while seeking the next boundary.
                        warn!(
                            content_length = len,
                            max = self.max_part_size,
                            "oversized MJPEG part, dropping"
                        );
                        self.state = ParseState::SeekingBoundary;
                        continue;
                    }
                    if self.buffer.len() < len {
                        return None;
                    }
                    let body = self.buffer.split_to(len).freeze();
                    self.state = ParseState::SeekingBoundary;
                    if !body.is_empty() {
                        return Some(body);
                    }
                }
                ParseState::CollectingBody {
                    content_length: None,
                } => {
                    let Some(pos) = find_subsequence(&self.buffer[self.scan_from..], &self.boundary)
                    else {
                        if self.buffer.len() > self.max_part_size {
                            self.drop_part("no boundary within part size limit");
                            return None;
                        }
                        // Avoid re-scanning old data on the next push
                        self.scan_from = self.buffer.len().saturating_sub(self.boundary.len());
                        return None;
                    };
                    let body_end = self.scan_from + pos;
                    // Strip trailing \r\n before boundary
                    let end = if self.buffer[..body_end].ends_with(b"\r\n") {
                        body_end - 2
                    } else {
                        body_end
                    };
                    let body = self.buffer.split_to(end).freeze();
                    // Advance past the boundary, already positioned at the next part's headers
                    let _ = self.buffer.split_to(body_end - end + self.boundary.len());
                    self.state = ParseState::SeekingHeaderEnd;
                    if !body.is_empty() {
                        return Some(body);
                    }
                }
            }
        }
    }

    /// Discard the buffered part and resynchronise on the next boundary.
    fn drop_part(&mut self, reason: &str) {
        warn!(
            buffered = self.buffer.len(),
            max = self.max_part_size,
            reason,
            "oversized MJPEG part, dropping"
        );
        self.buffer.clear();
        self.scan_from = 0;
        self.state = ParseState::SeekingBoundary;
    }
}

/// Frames from an HTTP MJPEG camera (`multipart/x-mixed-replace`).
pub struct MjpegSource {
    url: String,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    parser: MultipartParser,
    seq: u64,
}

impl MjpegSource {
    pub async fn connect(url: &str) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(CaptureError::HttpConnect)?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(CaptureError::HttpConnect)?;

        if !response.status().is_success() {
            return Err(CaptureError::HttpStatus(response.status().as_u16()));
        }

        let boundary = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(boundary_param)
            .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string());

        info!(url, status = %response.status(), boundary, "connected to MJPEG stream");

        Ok(Self {
            url: url.to_string(),
            body: response.bytes_stream().boxed(),
            parser: MultipartParser::new(&boundary),
            seq: 0,
        })
    }
}

impl FrameSource for MjpegSource {
    async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        loop {
            while let Some(part) = self.parser.next_part() {
                match decode_rgb(&part) {
                    Ok(image) => {
                        self.seq += 1;
                        debug!(seq = self.seq, bytes = part.len(), "decoded MJPEG part");
                        return Ok(Frame::captured_now(image, self.seq));
                    }
                    Err(e) => {
                        warn!(error = %e, url = self.url, bytes = part.len(), "failed to decode MJPEG part, skipping");
                    }
                }
            }

            match self.body.next().await {
                Some(chunk) => {
                    let chunk = chunk.map_err(CaptureError::HttpStream)?;
                    self.parser.push(&chunk);
                }
                None => return Err(CaptureError::StreamEnded),
            }
        }
    }

    fn name(&self) -> &str {
        "mjpeg"
    }
}

/// Extract `boundary=...` from a multipart content type.
fn boundary_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn content_length(headers: &[u8]) -> Option<usize> {
    std::str::from_utf8(headers).ok()?.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::test_server::{http_response, jpeg_bytes, serve};

    fn part(body: &[u8]) -> Vec<u8> {
        let mut out = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        out.extend_from_slice(body);
        out.extend_from_slice(b"\r\n");
        out
    }

    #[test]
    fn splits_parts_on_boundaries() {
        let mut parser = MultipartParser::new("frame");
        let mut stream = part(b"first");
        stream.extend(part(b"second"));
        stream.extend(part(b"third"));
        parser.push(&stream);

        assert_eq!(parser.next_part().as_deref(), Some(&b"first"[..]));
        assert_eq!(parser.next_part().as_deref(), Some(&b"second"[..]));
        // The last part is only complete once the next boundary arrives.
        assert_eq!(parser.next_part(), None);
        parser.push(b"--frame\r\n");
        assert_eq!(parser.next_part().as_deref(), Some(&b"third"[..]));
    }

    #[test]
    fn boundary_split_across_chunks() {
        let mut parser = MultipartParser::new("frame");
        let mut stream = b"preamble junk".to_vec();
        stream.extend(part(b"\xff\xd8payload\xff\xd9"));
        stream.extend(part(b"next"));

        let mut parts = Vec::new();
        for chunk in stream.chunks(3) {
            parser.push(chunk);
            while let Some(p) = parser.next_part() {
                parts.push(p);
            }
        }
        assert_eq!(parts, vec![Bytes::from_static(b"\xff\xd8payload\xff\xd9")]);
    }

    #[test]
    fn content_length_completes_part_without_next_boundary() {
        let mut parser = MultipartParser::new("--myboundary");
        parser.push(b"--myboundary\r\nContent-Type: image/jpeg\r\nContent-Length: 5\r\n\r\nab");
        assert_eq!(parser.next_part(), None);
        parser.push(b"cde\r\n");
        assert_eq!(parser.next_part().as_deref(), Some(&b"abcde"[..]));

        parser.push(b"--myboundary\r\ncontent-length: 2\r\n\r\nxy\r\n");
        assert_eq!(parser.next_part().as_deref(), Some(&b"xy"[..]));
    }

    #[test]
    fn oversized_content_length_is_dropped() {
        let mut parser = MultipartParser::new("frame").with_max_part_size(16);
        parser.push(b"--frame\r\nContent-Length: 1000000\r\n\r\n");
        parser.push(&[0xAA; 64]);
        assert_eq!(parser.next_part(), None);
        assert!(parser.buffer.len() <= parser.boundary.len());

        parser.push(&part(b"small"));
        parser.push(b"--frame\r\n");
        assert_eq!(parser.next_part().as_deref(), Some(&b"small"[..]));
    }

    #[test]
    fn unterminated_part_does_not_grow_unbounded() {
        let mut parser = MultipartParser::new("frame").with_max_part_size(32);
        parser.push(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
        for _ in 0..10 {
            parser.push(&[0x55; 16]);
            assert_eq!(parser.next_part(), None);
            assert!(parser.buffer.len() <= 32 + 16);
        }

        parser.push(&part(b"after"));
        parser.push(b"--frame\r\n");
        assert_eq!(parser.next_part().as_deref(), Some(&b"after"[..]));
    }

    #[test]
    fn endless_headers_are_dropped() {
        let mut parser = MultipartParser::new("frame").with_max_part_size(32);
        parser.push(b"--frame\r\n");
        for _ in 0..10 {
            parser.push(b"X-Junk: aaaaaaaaaaaaaaaa\r\n");
            assert_eq!(parser.next_part(), None);
        }
        assert!(parser.buffer.len() <= 32 + 26);
    }

    #[test]
    fn boundary_param_from_content_type() {
        assert_eq!(
            boundary_param("multipart/x-mixed-replace; boundary=frame").as_deref(),
            Some("frame")
        );
        assert_eq!(
            boundary_param("multipart/x-mixed-replace;Boundary=\"--cam01\"").as_deref(),
            Some("--cam01")
        );
        assert_eq!(boundary_param("image/jpeg"), None);
    }

    #[tokio::test]
    async fn source_skips_bad_part_then_ends_with_stream() {
        let mut stream = Vec::new();
        for payload in [b"not a jpeg".to_vec(), jpeg_bytes(12, 10)] {
            stream.extend_from_slice(b"--cam\r\nContent-Type: image/jpeg\r\n\r\n");
            stream.extend_from_slice(&payload);
            stream.extend_from_slice(b"\r\n");
        }
        stream.extend_from_slice(b"--cam\r\n");

        let url = serve(vec![http_response(
            "200 OK",
            "multipart/x-mixed-replace; boundary=cam",
            &stream,
        )])
        .await;
        let mut source = MjpegSource::connect(&url).await.unwrap();

        let frame = source.next_frame().await.unwrap();
        assert_eq!(frame.seq(), 1);
        assert_eq!((frame.width(), frame.height()), (12, 10));

        assert!(matches!(
            source.next_frame().await,
            Err(CaptureError::StreamEnded)
        ));
    }

    #[tokio::test]
    async fn error_status_fails_connect() {
        let url = serve(vec![http_response("503 Service Unavailable", "text/plain", b"busy")]).await;
        assert!(matches!(
            MjpegSource::connect(&url).await,
            Err(CaptureError::HttpStatus(503))
        ));
    }
}
