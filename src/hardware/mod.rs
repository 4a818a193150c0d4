//! Hardware - Capture Backend Seams
//!
//! ## Responsibilities
//!
//! - Capture backend / device traits (open, read, property get/set, release)
//! - Raw frame type handed to the encoder
//! - Hardware error type used for silent degradation
//!
//! Backends:
//! - `synthetic` - test pattern source, no hardware required
//! - `usb` - native USB capture via nokhwa (cargo feature `usb`)

pub mod synthetic;
#[cfg(feature = "usb")]
pub mod usb;
pub mod v4l2;

pub use synthetic::{FaultPlan, SyntheticBackend};

/// Result type for hardware calls
pub type HwResult<T> = std::result::Result<T, HardwareError>;

/// Hardware call failures
///
/// These never reach the HTTP boundary directly; callers decide whether a
/// failure is surfaced or absorbed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HardwareError {
    /// Device could not be opened or is not ready
    #[error("device not ready: {0}")]
    NotReady(String),

    /// Frame read failed
    #[error("frame read failed: {0}")]
    ReadFailed(String),

    /// Property is not supported by this backend/device
    #[error("property not supported: {0}")]
    Unsupported(String),

    /// Vendor SDK call failed
    #[error("vendor call failed: {0}")]
    Vendor(String),

    /// Any other backend failure
    #[error("{0}")]
    Other(String),
}

/// Pixel format requested from the device (FOURCC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Mjpg,
    Yuyv,
}

impl PixelFormat {
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            PixelFormat::Mjpg => *b"MJPG",
            PixelFormat::Yuyv => *b"YUYV",
        }
    }
}

/// Requested device configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: PixelFormat,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1280,
            height: 960,
            fps: 30,
            pixel_format: PixelFormat::Mjpg,
        }
    }
}

/// Generic capture properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureProperty {
    Exposure,
    AutoExposure,
    Gain,
    Focus,
    AutoFocus,
}

impl CaptureProperty {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureProperty::Exposure => "exposure",
            CaptureProperty::AutoExposure => "auto_exposure",
            CaptureProperty::Gain => "gain",
            CaptureProperty::Focus => "focus",
            CaptureProperty::AutoFocus => "auto_focus",
        }
    }
}

/// Decoded frame (packed RGB8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }
}

/// Opens devices. One backend per process.
pub trait CaptureBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open the device with the requested configuration
    fn open(&self, config: &DeviceConfig) -> HwResult<Box<dyn CaptureDevice>>;
}

/// An open capture device handle
///
/// All methods block; callers run them on the blocking thread pool.
pub trait CaptureDevice: Send {
    /// Whether the handle still reports itself as opened
    fn is_opened(&self) -> bool;

    /// Read one frame
    fn read(&mut self) -> HwResult<Frame>;

    /// Set a generic property
    fn set(&mut self, property: CaptureProperty, value: f64) -> HwResult<()>;

    /// Get a generic property
    fn get(&self, property: CaptureProperty) -> HwResult<f64>;

    /// Release the device
    fn release(&mut self) -> HwResult<()>;
}
