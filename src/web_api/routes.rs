//! API Routes

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use tower_http::services::ServeDir;

use crate::error::Error;
use crate::frame_pipeline::BOUNDARY;
use crate::models::{CaptureRequest, CaptureResponse, StatusResponse, StreamUrlResponse};
use crate::param_control::SetParametersRequest;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    let captures = ServeDir::new(&state.config.capture_dir);

    Router::new()
        // Health
        .route("/health", get(super::health_check))
        // Device lifecycle
        .route("/start", post(start_camera))
        .route("/stop", post(stop_camera))
        // Parameters
        .route("/params", get(get_params).post(set_params))
        // Frames
        .route("/stream", get(stream_url))
        .route("/mjpeg", get(mjpeg))
        .route("/capture", post(capture))
        .nest_service("/captures", captures)
        .with_state(state)
}

// ========================================
// Device Handlers
// ========================================

async fn start_camera(State(state): State<AppState>) -> impl IntoResponse {
    match state.devices.start().await {
        Ok(()) => Json(StatusResponse::new("started")).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn stop_camera(State(state): State<AppState>) -> impl IntoResponse {
    match state.devices.stop().await {
        Ok(()) => Json(StatusResponse::new("stopped")).into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Parameter Handlers
// ========================================

async fn get_params(State(state): State<AppState>) -> impl IntoResponse {
    match state.params.get_parameters().await {
        Ok(params) => Json(params).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Body is optional; an empty body changes nothing
async fn set_params(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let req = match parse_body::<SetParametersRequest>(&body, "parameter") {
        Ok(req) => req,
        Err(e) => return e.into_response(),
    };

    match state.params.set_parameters(req).await {
        Ok(()) => Json(StatusResponse::new("ok")).into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Frame Handlers
// ========================================

/// Absolute MJPEG URL built from the request's Host header
async fn stream_url(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}:{}", state.config.host, state.config.port));

    Json(StreamUrlResponse {
        stream_url: format!("http://{}/mjpeg", host),
    })
}

async fn mjpeg(State(state): State<AppState>) -> impl IntoResponse {
    let cancel = state.shutdown.child_token();

    let frames = match state.frames.open_stream(cancel).await {
        Ok(frames) => frames,
        Err(e) => return e.into_response(),
    };

    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
        )
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap_or_else(|e| Error::Internal(e.to_string()).into_response())
}

/// Body is optional; missing fields default to 0
async fn capture(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let req = match parse_body::<CaptureRequest>(&body, "capture") {
        Ok(req) => req,
        Err(e) => return e.into_response(),
    };

    match state.frames.capture_still(req.tool_id(), req.waypoint_index()).await {
        Ok(record) => Json(CaptureResponse::from(record)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// JSON body without a Content-Type requirement; blank means `T::default()`
fn parse_body<T: DeserializeOwned + Default>(body: &[u8], kind: &str) -> Result<T, Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| Error::Validation(format!("invalid {} request: {}", kind, e)))
}
