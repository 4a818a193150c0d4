//! HTTP request and response bodies
//!
//! Parameter bodies live in `param_control`; everything else the routes
//! exchange is defined here.

use crate::frame_pipeline::CaptureRecord;
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub camera_open: bool,
}

/// Generic status acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

/// Absolute MJPEG URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamUrlResponse {
    pub stream_url: String,
}

/// Still capture request. Absent or null fields mean 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureRequest {
    #[serde(default)]
    pub tool_id: Option<i64>,
    #[serde(default)]
    pub waypoint_index: Option<i64>,
}

impl CaptureRequest {
    pub fn tool_id(&self) -> i64 {
        self.tool_id.unwrap_or(0)
    }

    pub fn waypoint_index(&self) -> i64 {
        self.waypoint_index.unwrap_or(0)
    }
}

/// Still capture response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub image_id: String,
    pub image_url: String,
    pub captured_at_utc: String,
}

impl From<CaptureRecord> for CaptureResponse {
    fn from(record: CaptureRecord) -> Self {
        Self {
            image_id: record.id,
            image_url: record.url,
            captured_at_utc: record.captured_at_utc,
        }
    }
}
