//! Scopecam Library
//!
//! HTTP service for a single USB microscope camera
//!
//! ## Architecture (6 Components)
//!
//! 1. DeviceManager - Single camera handle, idempotent open/close
//! 2. VendorAdapter - Optional DNX64 SDK session, resolved once
//! 3. RangeResolver - Exposure/gain/focus ranges, vendor or static
//! 4. ParameterCoordinator - Parameter writes with auto/manual guard, reads
//! 5. FramePipeline - Still capture and MJPEG stream
//! 6. WebAPI - REST API endpoints
//!
//! ## Hardware seams
//!
//! - `hardware::CaptureBackend` / `CaptureDevice` - generic capture handle
//! - `vendor::VendorSdk` / `VendorLoader` - vendor SDK binding
//!
//! Both have in-memory implementations for hardware-free runs and tests.

pub mod device_manager;
pub mod error;
pub mod frame_pipeline;
pub mod hardware;
pub mod models;
pub mod param_control;
pub mod param_range;
pub mod state;
pub mod vendor;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
