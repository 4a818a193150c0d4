//! Application state
//!
//! Holds configuration and the shared camera components

use crate::device_manager::DeviceManager;
use crate::error::{Error, Result};
use crate::frame_pipeline::FramePipeline;
use crate::hardware::{CaptureBackend, DeviceConfig, PixelFormat, SyntheticBackend};
use crate::param_control::ParameterCoordinator;
use crate::param_range::{ParameterRange, RangeResolver, StaticRanges};
use crate::vendor::{Dnx64Loader, SimulatedVendor, SimulatedVendorLoader, VendorAdapter, VendorConfig, VendorLoader};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// `DNX64_DLL_PATH` value selecting the in-memory vendor SDK
pub const SYNTHETIC_VENDOR: &str = "synthetic";

/// Capture backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Native USB capture (requires the `usb` feature)
    #[default]
    Usb,
    /// Generated test pattern, only when asked for explicitly
    Synthetic,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usb" => Ok(BackendKind::Usb),
            "synthetic" => Ok(BackendKind::Synthetic),
            other => Err(Error::Config(format!(
                "CAMERA_BACKEND must be usb or synthetic, got {}",
                other
            ))),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Still capture directory (served under /captures)
    pub capture_dir: PathBuf,
    /// Capture backend
    pub backend: BackendKind,
    /// Requested device format
    pub device: DeviceConfig,
    /// Vendor SDK settings
    pub vendor: VendorConfig,
    /// Static parameter ranges
    pub ranges: StaticRanges,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 12002,
            capture_dir: PathBuf::from("./captures"),
            backend: BackendKind::default(),
            device: DeviceConfig::default(),
            vendor: VendorConfig::default(),
            ranges: StaticRanges::default(),
        }
    }
}

impl AppConfig {
    /// Load from environment variables, falling back to defaults for unset
    /// or empty values, then validate
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let range = |prefix: &str, fallback: ParameterRange| -> Result<ParameterRange> {
            let min = env_or(&format!("CAMERA_{}_MIN", prefix), fallback.min)?;
            let max = env_or(&format!("CAMERA_{}_MAX", prefix), fallback.max)?;
            let step = env_or(&format!("CAMERA_{}_STEP", prefix), fallback.step)?;
            Ok(ParameterRange::fixed(min, max, step))
        };

        let config = Self {
            host: env_or("CAMERA_SERVICE_HOST", defaults.host)?,
            port: env_or("CAMERA_SERVICE_PORT", defaults.port)?,
            capture_dir: env_or("CAMERA_CAPTURE_DIR", defaults.capture_dir)?,
            backend: env_or("CAMERA_BACKEND", defaults.backend)?,
            device: DeviceConfig {
                index: env_or("CAMERA_INDEX", defaults.device.index)?,
                width: env_or("CAMERA_WIDTH", defaults.device.width)?,
                height: env_or("CAMERA_HEIGHT", defaults.device.height)?,
                fps: env_or("CAMERA_FPS", defaults.device.fps)?,
                pixel_format: PixelFormat::Mjpg,
            },
            vendor: VendorConfig {
                library_path: env_opt("DNX64_DLL_PATH")?,
                device_index: env_or("DNX64_DEVICE_INDEX", defaults.vendor.device_index)?,
                exposure_index: env_opt("DNX64_EXPOSURE_INDEX")?,
                gain_index: env_opt("DNX64_GAIN_INDEX")?,
            },
            ranges: StaticRanges {
                exposure: range("EXPOSURE", defaults.ranges.exposure)?,
                gain: range("GAIN", defaults.ranges.gain)?,
                focus: range("FOCUS", defaults.ranges.focus)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that must hold before the server starts
    pub fn validate(&self) -> Result<()> {
        self.ranges.validate()?;
        if self.backend == BackendKind::Usb && !cfg!(feature = "usb") {
            return Err(Error::Config(
                "built without the usb feature; rebuild with --features usb or set CAMERA_BACKEND=synthetic"
                    .to_string(),
            ));
        }
        if self.device.width == 0 || self.device.height == 0 {
            return Err(Error::Config(format!(
                "camera resolution {}x{} invalid",
                self.device.width, self.device.height
            )));
        }
        Ok(())
    }
}

fn env_opt<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={}: {}", key, raw, e))),
        _ => Ok(None),
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    Ok(env_opt(key)?.unwrap_or(default))
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// DeviceManager (single camera handle)
    pub devices: Arc<DeviceManager>,
    /// VendorAdapter (optional DNX64 path)
    pub vendor: Arc<VendorAdapter>,
    /// ParameterCoordinator
    pub params: Arc<ParameterCoordinator>,
    /// FramePipeline (stills + MJPEG)
    pub frames: Arc<FramePipeline>,
    /// Root token; cancelled on shutdown, parent of every stream token
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire components over explicit hardware seams
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn CaptureBackend>,
        loader: Arc<dyn VendorLoader>,
    ) -> Self {
        let devices = Arc::new(DeviceManager::new(backend, config.device.clone()));
        let vendor = Arc::new(VendorAdapter::new(loader, config.vendor.clone()));
        let ranges = RangeResolver::new(config.ranges, &config.vendor);
        let params = Arc::new(ParameterCoordinator::new(
            Arc::clone(&devices),
            Arc::clone(&vendor),
            ranges,
        ));
        let frames = Arc::new(FramePipeline::new(
            Arc::clone(&devices),
            config.capture_dir.clone(),
            config.device.fps,
        ));

        Self {
            config,
            devices,
            vendor,
            params,
            frames,
            shutdown: CancellationToken::new(),
        }
    }

    /// Select backend and vendor loader from configuration
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let backend = backend_for(config.backend)?;

        if config.backend == BackendKind::Usb && config.ranges.exposure.min < 0 {
            tracing::warn!(
                exposure_min = config.ranges.exposure.min,
                exposure_max = config.ranges.exposure.max,
                "USB exposure is exposure_absolute in 100us units; set CAMERA_EXPOSURE_MIN/MAX for this camera"
            );
        }

        let synthetic_vendor = config
            .vendor
            .library_path
            .as_deref()
            .map(|p| p.as_os_str() == SYNTHETIC_VENDOR)
            .unwrap_or(false);
        let loader: Arc<dyn VendorLoader> = if synthetic_vendor {
            Arc::new(SimulatedVendorLoader::new(SimulatedVendor::new()))
        } else {
            Arc::new(Dnx64Loader)
        };

        tracing::info!(
            backend = backend.name(),
            camera_index = config.device.index,
            vendor = ?config.vendor.library_path,
            vendor_device_index = config.vendor.device_index,
            "Camera components configured"
        );

        Ok(Self::new(config, backend, loader))
    }
}

fn backend_for(kind: BackendKind) -> Result<Arc<dyn CaptureBackend>> {
    match kind {
        BackendKind::Synthetic => Ok(Arc::new(SyntheticBackend::new())),
        #[cfg(feature = "usb")]
        BackendKind::Usb => Ok(Arc::new(crate::hardware::usb::UsbBackend::new())),
        #[cfg(not(feature = "usb"))]
        BackendKind::Usb => Err(Error::Config(
            "CAMERA_BACKEND=usb requires building with the usb feature".to_string(),
        )),
    }
}
