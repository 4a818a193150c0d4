//! HTTP API test suite for scopecam
//!
//! Drives the full router over the synthetic capture backend and the
//! simulated vendor SDK, so no camera or vendor library is needed.
//!
//! Run: `cargo test --test http_api`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use scopecam::hardware::{CaptureProperty, DeviceConfig, FaultPlan, SyntheticBackend};
use scopecam::state::{AppConfig, AppState, BackendKind};
use scopecam::vendor::{SimulatedVendor, SimulatedVendorLoader, VendorConfig};
use scopecam::web_api::create_router;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: AppState,
    backend: SyntheticBackend,
}

fn test_app(backend: SyntheticBackend, loader: SimulatedVendorLoader, capture_dir: &Path) -> TestApp {
    let config = AppConfig {
        capture_dir: capture_dir.to_path_buf(),
        backend: BackendKind::Synthetic,
        device: DeviceConfig {
            width: 32,
            height: 24,
            fps: 100,
            ..Default::default()
        },
        vendor: VendorConfig {
            library_path: Some(PathBuf::from("DNX64.dll")),
            ..Default::default()
        },
        ..Default::default()
    };

    let state = AppState::new(config, Arc::new(backend.clone()), Arc::new(loader));
    TestApp {
        router: create_router(state.clone()),
        state,
        backend,
    }
}

fn default_app(capture_dir: &Path) -> TestApp {
    test_app(
        SyntheticBackend::new(),
        SimulatedVendorLoader::new(SimulatedVendor::new()),
        capture_dir,
    )
}

async fn send(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.router.clone().oneshot(request).await.unwrap()
}

async fn send_raw(app: &TestApp, method: &str, uri: &str, body: &'static str) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body))
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn is_capture_name(name: &str, tool: i64, waypoint: i64) -> bool {
    let prefix = format!("capture_t{}_w{}_", tool, waypoint);
    match name.strip_prefix(prefix.as_str()).and_then(|r| r.strip_suffix(".jpg")) {
        Some(stamp) => {
            stamp.len() == 15
                && stamp[..8].chars().all(|c| c.is_ascii_digit())
                && &stamp[8..9] == "_"
                && stamp[9..].chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[tokio::test]
async fn health_tracks_start_and_stop() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_app(dir.path());

    let health = body_json(send(&app, "GET", "/health", None).await).await;
    assert_eq!(health, json!({"status": "ok", "camera_open": false}));

    for _ in 0..2 {
        let response = send(&app, "POST", "/start", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "started"}));
    }
    assert_eq!(app.backend.open_count(), 1);

    let health = body_json(send(&app, "GET", "/health", None).await).await;
    assert_eq!(health["camera_open"], true);

    for _ in 0..2 {
        let response = send(&app, "POST", "/stop", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "stopped"}));
    }
    assert_eq!(app.backend.open_handles(), 0);

    let health = body_json(send(&app, "GET", "/health", None).await).await;
    assert_eq!(health["camera_open"], false);
}

#[tokio::test]
async fn start_reports_unavailable_camera() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(
        SyntheticBackend::with_faults(FaultPlan {
            fail_open: true,
            ..Default::default()
        }),
        SimulatedVendorLoader::new(SimulatedVendor::new()),
        dir.path(),
    );

    let response = send(&app, "POST", "/start", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error_code"], "DEVICE_UNAVAILABLE");
}

#[tokio::test]
async fn params_with_failed_vendor_are_generic_and_static() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(SyntheticBackend::new(), SimulatedVendorLoader::failing(), dir.path());
    app.backend.set_property(CaptureProperty::Exposure, -6.0);
    app.backend.set_property(CaptureProperty::AutoExposure, 0.0);

    let response = send(&app, "GET", "/params", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let params = body_json(response).await;

    assert_eq!(params["exposure"], -6.0);
    assert_eq!(params["autoExposure"], false);
    assert!(params["gain"].is_null());
    assert!(params["focus"].is_null());
    assert!(params["autoFocus"].is_null());
    assert_eq!(
        params["ranges"],
        json!({
            "exposure": {"min": -13, "max": 0, "step": 1, "default": -13},
            "gain": {"min": 0, "max": 255, "step": 1, "default": 0},
            "focus": {"min": 0, "max": 255, "step": 1, "default": 0},
        })
    );
}

#[tokio::test]
async fn params_with_vendor_report_lens_range() {
    let dir = tempfile::tempdir().unwrap();
    let sdk = SimulatedVendor::new();
    sdk.set_lens_limits(700, 50);
    sdk.set_reported_exposure(333);
    let app = test_app(SyntheticBackend::new(), SimulatedVendorLoader::new(sdk), dir.path());

    let params = body_json(send(&app, "GET", "/params", None).await).await;

    assert_eq!(params["exposure"], 333.0);
    assert_eq!(params["ranges"]["focus"], json!({"min": 50, "max": 700, "step": 1, "default": 50}));
}

#[tokio::test]
async fn set_params_respects_auto_exposure_guard() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_app(dir.path());

    let response = send(
        &app,
        "POST",
        "/params",
        Some(json!({"autoExposure": true, "exposure": -5})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
    assert_eq!(app.backend.property(CaptureProperty::AutoExposure), Some(1.0));
    assert_eq!(app.backend.property(CaptureProperty::Exposure), None);

    send(
        &app,
        "POST",
        "/params",
        Some(json!({"autoExposure": false, "exposure": -5, "gain": 20})),
    )
    .await;
    assert_eq!(app.backend.property(CaptureProperty::AutoExposure), Some(0.0));
    assert_eq!(app.backend.property(CaptureProperty::Exposure), Some(-5.0));
    assert_eq!(app.backend.property(CaptureProperty::Gain), Some(20.0));
}

#[tokio::test]
async fn set_params_absorbs_hardware_faults() {
    let dir = tempfile::tempdir().unwrap();
    let sdk = SimulatedVendor::new();
    sdk.fail_call("set_lens_position");
    let app = test_app(
        SyntheticBackend::with_faults(FaultPlan {
            unsupported: [CaptureProperty::Focus].into_iter().collect(),
            ..Default::default()
        }),
        SimulatedVendorLoader::new(sdk),
        dir.path(),
    );

    let response = send(&app, "POST", "/params", Some(json!({"focus": 120, "gain": 3}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.backend.property(CaptureProperty::Gain), Some(3.0));
}

#[tokio::test]
async fn set_params_malformed_body_is_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_app(dir.path());

    for body in ["{\"gain\": ", "{\"gain\": \"high\"}"] {
        let response = send_raw(&app, "POST", "/params", body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error_code"], "VALIDATION_ERROR");
    }
    assert!(app.backend.writes().is_empty());
}

#[tokio::test]
async fn set_params_without_body_or_content_type_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_app(dir.path());

    let response = send_raw(&app, "POST", "/params", "").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.backend.writes().is_empty());

    let response = send_raw(&app, "POST", "/params", "{\"gain\": 9}").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.backend.property(CaptureProperty::Gain), Some(9.0));
}

#[tokio::test]
async fn capture_persists_and_serves_image() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_app(dir.path());

    let response = send(
        &app,
        "POST",
        "/capture",
        Some(json!({"tool_id": 3, "waypoint_index": 7})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let capture = body_json(response).await;

    let image_id = capture["image_id"].as_str().unwrap().to_string();
    assert!(is_capture_name(&image_id, 3, 7), "{}", image_id);
    assert_eq!(capture["image_url"], format!("/captures/{}", image_id));
    let captured_at = capture["captured_at_utc"].as_str().unwrap();
    assert!(captured_at.ends_with('Z'));
    chrono::NaiveDateTime::parse_from_str(captured_at, "%Y-%m-%dT%H:%M:%SZ").unwrap();
    assert!(dir.path().join(&image_id).exists());

    let response = send(&app, "GET", &format!("/captures/{}", image_id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn capture_without_body_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_app(dir.path());

    let response = send(&app, "POST", "/capture", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let capture = body_json(response).await;
    assert!(is_capture_name(capture["image_id"].as_str().unwrap(), 0, 0));
}

#[tokio::test]
async fn capture_null_fields_are_zero() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_app(dir.path());

    let response = send(
        &app,
        "POST",
        "/capture",
        Some(json!({"tool_id": null, "waypoint_index": 2})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let capture = body_json(response).await;
    assert!(is_capture_name(capture["image_id"].as_str().unwrap(), 0, 2));
}

#[tokio::test]
async fn capture_read_failure_is_500() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_app(dir.path());

    send(&app, "POST", "/start", None).await;
    app.backend.fail_next_reads(1);

    let response = send(&app, "POST", "/capture", Some(json!({}))).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error_code"], "CAPTURE_FAILED");
}

#[tokio::test]
async fn stream_url_uses_host_header() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_app(dir.path());

    let request = Request::builder()
        .uri("/stream")
        .header(header::HOST, "scope.local:12002")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(
        body_json(response).await,
        json!({"stream_url": "http://scope.local:12002/mjpeg"})
    );
}

#[tokio::test]
async fn mjpeg_streams_multipart_frames() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_app(dir.path());

    let response = send(&app, "GET", "/mjpeg", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut body = response.into_body();
    for _ in 0..3 {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let data = frame.into_data().unwrap();
        assert!(data.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8"));
        assert!(data.ends_with(b"\r\n"));
    }
}

#[tokio::test]
async fn mjpeg_ends_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let app = default_app(dir.path());

    let response = send(&app, "GET", "/mjpeg", None).await;
    let mut body = response.into_body();
    assert!(body.frame().await.is_some());

    app.state.shutdown.cancel();

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = body.frame().await {
            frame.unwrap();
        }
    })
    .await;
    assert!(drained.is_ok());
}

#[tokio::test]
async fn mjpeg_reports_unavailable_camera() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(
        SyntheticBackend::with_faults(FaultPlan {
            fail_open: true,
            ..Default::default()
        }),
        SimulatedVendorLoader::new(SimulatedVendor::new()),
        dir.path(),
    );

    let response = send(&app, "GET", "/mjpeg", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
