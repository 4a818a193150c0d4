//! DeviceManager - Single Camera Handle Lifecycle
//!
//! ## Responsibilities
//!
//! - Idempotent open (`start` / `ensure_open`) and close (`stop`)
//! - At most one open handle process-wide
//! - Health introspection without side effects
//!
//! The handle lives behind one mutex. Every transition and every device
//! operation runs under that lock on the blocking thread pool, so concurrent
//! `ensure_open` calls resolve to a single open.

use crate::error::{Error, Result};
use crate::hardware::{CaptureBackend, CaptureDevice, DeviceConfig};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Slot = Option<Box<dyn CaptureDevice>>;

/// DeviceManager instance
pub struct DeviceManager {
    backend: Arc<dyn CaptureBackend>,
    config: DeviceConfig,
    slot: Arc<Mutex<Slot>>,
}

impl DeviceManager {
    /// Create new DeviceManager. Nothing is opened until first use.
    pub fn new(backend: Arc<dyn CaptureBackend>, config: DeviceConfig) -> Self {
        Self {
            backend,
            config,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the device if it is not already open and healthy
    pub async fn start(&self) -> Result<()> {
        self.ensure_open().await
    }

    /// Same as `start`; used implicitly by frame and parameter operations
    pub async fn ensure_open(&self) -> Result<()> {
        self.with_device(|_| ()).await
    }

    /// Release the handle if open. Release failures are logged, and the
    /// manager always ends up closed.
    pub async fn stop(&self) -> Result<()> {
        let slot = Arc::clone(&self.slot);
        let index = self.config.index;

        run_blocking(move || {
            let mut guard = lock(&slot);
            if let Some(mut device) = guard.take() {
                match device.release() {
                    Ok(()) => tracing::info!(camera_index = index, "Camera released"),
                    Err(e) => tracing::warn!(
                        camera_index = index,
                        error = %e,
                        "Camera release failed, handle dropped anyway"
                    ),
                }
            } else {
                tracing::debug!(camera_index = index, "Stop requested, camera already closed");
            }
        })
        .await
    }

    /// Whether a handle is open and reports healthy
    pub async fn health(&self) -> bool {
        let slot = Arc::clone(&self.slot);
        run_blocking(move || lock(&slot).as_ref().map(|d| d.is_opened()).unwrap_or(false))
            .await
            .unwrap_or(false)
    }

    /// Run `f` against the device, opening it first if needed
    pub async fn with_device<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn CaptureDevice) -> T + Send + 'static,
        T: Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        let backend = Arc::clone(&self.backend);
        let config = self.config.clone();

        run_blocking(move || {
            let mut guard = lock(&slot);
            let device = open_locked(&mut guard, backend.as_ref(), &config)?;
            Ok(f(device))
        })
        .await?
    }

    /// Run `f` only if a healthy handle is already open; never opens.
    ///
    /// Returns `None` when the device is closed.
    pub async fn with_open_device<T, F>(&self, f: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut dyn CaptureDevice) -> T + Send + 'static,
        T: Send + 'static,
    {
        let slot = Arc::clone(&self.slot);

        run_blocking(move || {
            let mut guard = lock(&slot);
            match guard.as_mut() {
                Some(device) if device.is_opened() => Some(f(device.as_mut())),
                _ => None,
            }
        })
        .await
    }
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ensure the slot holds a healthy open device and return it
fn open_locked<'a>(
    slot: &'a mut Slot,
    backend: &dyn CaptureBackend,
    config: &DeviceConfig,
) -> Result<&'a mut dyn CaptureDevice> {
    let healthy = slot.as_ref().map(|d| d.is_opened()).unwrap_or(false);

    if !healthy {
        if let Some(mut stale) = slot.take() {
            tracing::warn!(camera_index = config.index, "Camera handle unhealthy, reopening");
            if let Err(e) = stale.release() {
                tracing::debug!(error = %e, "Release of stale handle failed");
            }
        }

        let device = backend.open(config).map_err(|e| {
            tracing::error!(
                camera_index = config.index,
                backend = backend.name(),
                error = %e,
                "Camera open failed"
            );
            Error::DeviceUnavailable(e.to_string())
        })?;

        if !device.is_opened() {
            return Err(Error::DeviceUnavailable(format!(
                "camera {} opened but not ready",
                config.index
            )));
        }

        tracing::info!(
            camera_index = config.index,
            backend = backend.name(),
            width = config.width,
            height = config.height,
            fps = config.fps,
            pixel_format = %String::from_utf8_lossy(&config.pixel_format.fourcc()),
            "Camera opened"
        );
        *slot = Some(device);
    }

    match slot.as_mut() {
        Some(device) => Ok(device.as_mut()),
        None => Err(Error::Internal("camera slot empty after open".to_string())),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))
}
