use camfeed_common::frame::Frame;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::{decode_rgb, CaptureError, FrameSource};

/// Polling fallback: fetch a single JPEG from `url` once per interval.
pub struct SnapshotSource {
    client: reqwest::Client,
    url: String,
    ticker: Interval,
    seq: u64,
}

impl SnapshotSource {
    pub fn new(url: &str, interval: Duration) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(CaptureError::HttpConnect)?;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ok(Self {
            client,
            url: url.to_string(),
            ticker,
            seq: 0,
        })
    }
}

impl FrameSource for SnapshotSource {
    /// A snapshot that fails to decode is skipped until the next tick.
    /// Connect, status and read failures end the source.
    async fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        loop {
            self.ticker.tick().await;

            let resp = self
                .client
                .get(&self.url)
                .send()
                .await
                .map_err(CaptureError::HttpConnect)?;
            if !resp.status().is_success() {
                return Err(CaptureError::HttpStatus(resp.status().as_u16()));
            }
            let jpeg_data = resp.bytes().await.map_err(CaptureError::HttpStream)?;
            match decode_rgb(&jpeg_data) {
                Ok(image) => {
                    self.seq += 1;
                    debug!(seq = self.seq, bytes = jpeg_data.len(), "fetched snapshot");
                    return Ok(Frame::captured_now(image, self.seq));
                }
                Err(e) => {
                    warn!(error = %e, url = self.url, bytes = jpeg_data.len(), "failed to decode snapshot, skipping");
                }
            }
        }
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}
