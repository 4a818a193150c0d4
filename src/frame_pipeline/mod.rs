//! FramePipeline - Still Capture and MJPEG Stream
//!
//! ## Responsibilities
//!
//! - Single-frame capture, JPEG encode, persist to the capture directory
//! - Lazy multipart JPEG stream over the shared device handle
//!
//! ## Stream behaviour
//!
//! A failed read or encode pauses for the retry delay and tries again
//! without emitting anything. Otherwise frames are paced at 1/fps. Streams
//! never reopen a stopped device; a closed handle counts as a failed read.
//! The stream ends when its cancellation token fires; dropping the
//! response body drops the producer.

use crate::device_manager::DeviceManager;
use crate::error::{Error, Result};
use crate::hardware::Frame;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Local, TimeZone, Utc};
use futures::Stream;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::fmt::Display;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause after a failed stream read or encode
pub const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Multipart boundary used by the MJPEG stream
pub const BOUNDARY: &str = "frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

/// Persisted still capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    /// Filename, also the image id
    pub id: String,
    pub path: PathBuf,
    /// Public URL under `/captures`
    pub url: String,
    /// `%Y-%m-%dT%H:%M:%SZ`
    pub captured_at_utc: String,
}

/// FramePipeline instance
pub struct FramePipeline {
    devices: Arc<DeviceManager>,
    capture_dir: PathBuf,
    frame_interval: Duration,
    retry_delay: Duration,
}

impl FramePipeline {
    /// Create new FramePipeline
    pub fn new(devices: Arc<DeviceManager>, capture_dir: PathBuf, fps: u32) -> Self {
        Self {
            devices,
            capture_dir,
            frame_interval: frame_interval(fps),
            retry_delay: RETRY_DELAY,
        }
    }

    /// Override the stream retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Capture, encode and persist one still
    pub async fn capture_still(&self, tool_id: i64, waypoint_index: i64) -> Result<CaptureRecord> {
        let frame = self
            .devices
            .with_device(|device| device.read())
            .await?
            .map_err(|e| {
                tracing::warn!(tool_id = tool_id, waypoint_index = waypoint_index, error = %e, "Still capture read failed");
                Error::CaptureFailed(e.to_string())
            })?;

        let jpeg = encode_blocking(frame).await?;

        let id = capture_filename(tool_id, waypoint_index, &Local::now());
        let path = self.capture_dir.join(&id);
        tokio::fs::write(&path, &jpeg).await?;
        let captured_at_utc = utc_timestamp(&Utc::now());

        tracing::info!(
            image_id = %id,
            bytes = jpeg.len(),
            tool_id = tool_id,
            waypoint_index = waypoint_index,
            "Still captured"
        );

        Ok(CaptureRecord {
            url: format!("/captures/{}", id),
            id,
            path,
            captured_at_utc,
        })
    }

    /// Open the device and return a fresh multipart frame stream
    pub async fn open_stream(&self, cancel: CancellationToken) -> Result<impl Stream<Item = Bytes> + Send + 'static> {
        self.devices.ensure_open().await?;
        Ok(self.frames(cancel))
    }

    /// Multipart frame stream against the current handle; never opens
    pub fn frames(&self, cancel: CancellationToken) -> impl Stream<Item = Bytes> + Send + 'static {
        let state = StreamState {
            devices: Arc::clone(&self.devices),
            cancel,
            frame_interval: self.frame_interval,
            retry_delay: self.retry_delay,
            pace: false,
            parts: 0,
            failures: 0,
        };
        tracing::debug!("MJPEG stream opened");

        futures::stream::unfold(state, |mut state| async move {
            loop {
                if state.pace && !state.pause(state.frame_interval).await {
                    return None;
                }
                state.pace = false;

                if state.cancel.is_cancelled() {
                    return None;
                }

                match state.next_jpeg().await {
                    Ok(jpeg) => {
                        state.parts += 1;
                        state.pace = true;
                        return Some((multipart_part(&jpeg), state));
                    }
                    Err(e) => {
                        state.failures += 1;
                        tracing::trace!(error = %e, "Stream frame unavailable, retrying");
                        if !state.pause(state.retry_delay).await {
                            return None;
                        }
                    }
                }
            }
        })
    }
}

struct StreamState {
    devices: Arc<DeviceManager>,
    cancel: CancellationToken,
    frame_interval: Duration,
    retry_delay: Duration,
    /// Sleep one frame interval before the next read
    pace: bool,
    parts: u64,
    failures: u64,
}

impl StreamState {
    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn next_jpeg(&self) -> Result<Vec<u8>> {
        let frame = self
            .devices
            .with_open_device(|device| device.read())
            .await?
            .ok_or_else(|| Error::CaptureFailed("camera closed".to_string()))?
            .map_err(|e| Error::CaptureFailed(e.to_string()))?;
        encode_blocking(frame).await
    }
}

impl Drop for StreamState {
    fn drop(&mut self) {
        tracing::debug!(
            parts = self.parts,
            failures = self.failures,
            "MJPEG stream closed"
        );
    }
}

/// Delay between stream parts for the configured frame rate
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / f64::from(fps.max(1)))
}

/// Encode an RGB8 frame as JPEG
pub fn encode_jpeg(frame: Frame) -> Result<Vec<u8>> {
    if frame.width == 0 || frame.height == 0 {
        return Err(Error::EncodeFailed(format!(
            "empty frame {}x{}",
            frame.width, frame.height
        )));
    }

    let (width, height, len) = (frame.width, frame.height, frame.data.len());
    let image = RgbImage::from_raw(width, height, frame.data).ok_or_else(|| {
        Error::EncodeFailed(format!(
            "buffer of {} bytes does not fit {}x{} RGB",
            len, width, height
        ))
    })?;

    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .map_err(|e| Error::EncodeFailed(e.to_string()))?;
    Ok(buf)
}

async fn encode_blocking(frame: Frame) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || encode_jpeg(frame))
        .await
        .map_err(|e| Error::Internal(format!("encode task failed: {}", e)))?
}

/// One multipart chunk: boundary, content type, payload
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + 2);
    part.put_slice(PART_HEADER);
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// `capture_t{tool}_w{waypoint}_{YYYYMMDD_HHMMSS}.jpg` in the given clock
pub fn capture_filename<Tz>(tool_id: i64, waypoint_index: i64, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "capture_t{}_w{}_{}.jpg",
        tool_id,
        waypoint_index,
        at.format("%Y%m%d_%H%M%S")
    )
}

pub fn utc_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
