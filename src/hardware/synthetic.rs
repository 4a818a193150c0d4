//! Synthetic capture backend
//!
//! Generates a moving test pattern and keeps properties in memory.
//! Used when `CAMERA_BACKEND=synthetic` and as the hardware double in tests,
//! where a [`FaultPlan`] injects open/read/property failures.

use super::{CaptureBackend, CaptureDevice, CaptureProperty, DeviceConfig, Frame, HardwareError, HwResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Failures to inject into the synthetic device
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Every open attempt reports not-ready
    pub fail_open: bool,
    /// The next N frame reads fail
    pub failing_reads: u32,
    /// Release reports an error (state must still become closed)
    pub fail_release: bool,
    /// Properties whose set/get fail as unsupported
    pub unsupported: HashSet<CaptureProperty>,
}

#[derive(Debug, Default)]
struct Shared {
    faults: Mutex<FaultPlan>,
    properties: Mutex<HashMap<CaptureProperty, f64>>,
    writes: Mutex<Vec<(CaptureProperty, f64)>>,
    opens: AtomicUsize,
    open_handles: AtomicUsize,
    reads: AtomicUsize,
    disconnected: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Synthetic backend handle. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SyntheticBackend {
    shared: Arc<Shared>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with an initial fault plan
    pub fn with_faults(faults: FaultPlan) -> Self {
        let backend = Self::new();
        backend.set_faults(faults);
        backend
    }

    /// Replace the current fault plan
    pub fn set_faults(&self, faults: FaultPlan) {
        *lock(&self.shared.faults) = faults;
    }

    /// Make the next `n` reads fail
    pub fn fail_next_reads(&self, n: u32) {
        lock(&self.shared.faults).failing_reads = n;
    }

    /// Seed a property value as if the device reported it
    pub fn set_property(&self, property: CaptureProperty, value: f64) {
        lock(&self.shared.properties).insert(property, value);
    }

    /// Current stored property value
    pub fn property(&self, property: CaptureProperty) -> Option<f64> {
        lock(&self.shared.properties).get(&property).copied()
    }

    /// All successful property writes, in order
    pub fn writes(&self) -> Vec<(CaptureProperty, f64)> {
        lock(&self.shared.writes).clone()
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Number of handles currently open
    pub fn open_handles(&self) -> usize {
        self.shared.open_handles.load(Ordering::SeqCst)
    }

    /// Simulate the device dropping off the bus; open handles report unhealthy
    pub fn disconnect(&self) {
        self.shared.disconnected.store(true, Ordering::SeqCst);
    }

    /// Number of read attempts (successful or not)
    pub fn read_attempts(&self) -> usize {
        self.shared.reads.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&self, config: &DeviceConfig) -> HwResult<Box<dyn CaptureDevice>> {
        if lock(&self.shared.faults).fail_open {
            return Err(HardwareError::NotReady(format!(
                "synthetic device {} not ready",
                config.index
            )));
        }

        self.shared.disconnected.store(false, Ordering::SeqCst);
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        self.shared.open_handles.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SyntheticDevice {
            shared: Arc::clone(&self.shared),
            width: config.width,
            height: config.height,
            frame_no: 0,
            opened: true,
        }))
    }
}

struct SyntheticDevice {
    shared: Arc<Shared>,
    width: u32,
    height: u32,
    frame_no: u64,
    opened: bool,
}

impl SyntheticDevice {
    fn check_supported(&self, property: CaptureProperty) -> HwResult<()> {
        if lock(&self.shared.faults).unsupported.contains(&property) {
            return Err(HardwareError::Unsupported(property.as_str().to_string()));
        }
        Ok(())
    }

    fn pattern(&self) -> Vec<u8> {
        let shift = (self.frame_no * 4) as u32;
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                data.push(((x + shift) % 256) as u8);
                data.push((y % 256) as u8);
                data.push((((x + y) / 2 + shift) % 256) as u8);
            }
        }
        data
    }

    fn mark_closed(&mut self) {
        if self.opened {
            self.opened = false;
            self.shared.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl CaptureDevice for SyntheticDevice {
    fn is_opened(&self) -> bool {
        self.opened && !self.shared.disconnected.load(Ordering::SeqCst)
    }

    fn read(&mut self) -> HwResult<Frame> {
        self.shared.reads.fetch_add(1, Ordering::SeqCst);

        if !self.is_opened() {
            return Err(HardwareError::ReadFailed("device not opened".to_string()));
        }

        {
            let mut faults = lock(&self.shared.faults);
            if faults.failing_reads > 0 {
                faults.failing_reads -= 1;
                return Err(HardwareError::ReadFailed("injected read failure".to_string()));
            }
        }

        self.frame_no += 1;
        Ok(Frame::new(self.width, self.height, self.pattern()))
    }

    fn set(&mut self, property: CaptureProperty, value: f64) -> HwResult<()> {
        self.check_supported(property)?;
        lock(&self.shared.properties).insert(property, value);
        lock(&self.shared.writes).push((property, value));
        Ok(())
    }

    fn get(&self, property: CaptureProperty) -> HwResult<f64> {
        self.check_supported(property)?;
        lock(&self.shared.properties)
            .get(&property)
            .copied()
            .ok_or_else(|| HardwareError::Unsupported(format!("{} never set", property.as_str())))
    }

    fn release(&mut self) -> HwResult<()> {
        self.mark_closed();
        if lock(&self.shared.faults).fail_release {
            return Err(HardwareError::Other("injected release failure".to_string()));
        }
        Ok(())
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.mark_closed();
    }
}
