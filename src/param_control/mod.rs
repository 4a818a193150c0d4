//! ParamControl - Parameter Read/Write Coordinator
//!
//! ## Responsibilities
//!
//! - Apply partial parameter updates to the generic device handle and,
//!   when available, the vendor SDK
//! - Auto/manual guard: a manual value is not written in a request that
//!   enables the matching auto mode
//! - Read current values with vendor override and per-field degradation
//!
//! Hardware faults on individual fields are logged and swallowed. Only
//! device open failure surfaces to the caller.

mod types;

pub use types::{auto_flag, ParameterState, SetParametersRequest};

use crate::device_manager::DeviceManager;
use crate::error::Result;
use crate::hardware::{CaptureDevice, CaptureProperty, HwResult};
use crate::param_range::RangeResolver;
use crate::vendor::{VendorAdapter, VendorHandle};
use std::sync::Arc;

/// ParameterCoordinator instance
pub struct ParameterCoordinator {
    devices: Arc<DeviceManager>,
    vendor: Arc<VendorAdapter>,
    ranges: RangeResolver,
}

impl ParameterCoordinator {
    pub fn new(devices: Arc<DeviceManager>, vendor: Arc<VendorAdapter>, ranges: RangeResolver) -> Self {
        Self {
            devices,
            vendor,
            ranges,
        }
    }

    /// Apply the present fields of `request`
    pub async fn set_parameters(&self, request: SetParametersRequest) -> Result<()> {
        self.devices.ensure_open().await?;
        let vendor = self.vendor.get().await;

        tracing::debug!(
            request = ?request,
            vendor = vendor.is_some(),
            "Applying camera parameters"
        );

        self.devices
            .with_device(move |device| apply_parameters(device, vendor.as_ref(), &request))
            .await
    }

    /// Current values and ranges
    pub async fn get_parameters(&self) -> Result<ParameterState> {
        self.devices.ensure_open().await?;
        let vendor = self.vendor.get().await;
        let ranges = self.ranges.clone();

        self.devices
            .with_device(move |device| read_parameters(device, vendor.as_ref(), &ranges))
            .await
    }
}

/// Write path. Each hardware call is isolated; none can fail the request.
pub fn apply_parameters(
    device: &mut dyn CaptureDevice,
    vendor: Option<&VendorHandle>,
    request: &SetParametersRequest,
) {
    if let Some(enabled) = request.auto_exposure {
        generic_set(device, CaptureProperty::AutoExposure, flag_value(enabled));
        if let Some(vendor) = vendor {
            swallow("set_auto_exposure", vendor.set_auto_exposure(enabled));
        }
    }

    if let Some(exposure) = request.exposure {
        if request.exposure_allowed() {
            generic_set(device, CaptureProperty::Exposure, exposure);
            if let Some(vendor) = vendor {
                swallow("set_exposure_value", vendor.set_exposure_value(exposure as i32));
            }
        } else {
            tracing::debug!(exposure = exposure, "Exposure ignored, auto exposure enabled in same request");
        }
    }

    if let Some(gain) = request.gain {
        generic_set(device, CaptureProperty::Gain, gain);
    }

    if let Some(enabled) = request.auto_focus {
        generic_set(device, CaptureProperty::AutoFocus, flag_value(enabled));
    }

    if let Some(focus) = request.focus {
        if request.focus_allowed() {
            generic_set(device, CaptureProperty::Focus, focus);
            if let Some(vendor) = vendor {
                swallow("set_lens_position", vendor.set_lens_position(focus as i32));
            }
        } else {
            tracing::debug!(focus = focus, "Focus ignored, autofocus enabled in same request");
        }
    }
}

/// Read path. Vendor values override generic ones for exposure and auto
/// exposure; a failed read leaves the field unknown.
pub fn read_parameters(
    device: &mut dyn CaptureDevice,
    vendor: Option<&VendorHandle>,
    ranges: &RangeResolver,
) -> ParameterState {
    let mut exposure = generic_get(device, CaptureProperty::Exposure);
    let gain = generic_get(device, CaptureProperty::Gain);
    let focus = generic_get(device, CaptureProperty::Focus);
    let mut auto_exposure = generic_get(device, CaptureProperty::AutoExposure).and_then(auto_flag);
    let auto_focus = generic_get(device, CaptureProperty::AutoFocus).and_then(auto_flag);

    if let Some(vendor) = vendor {
        if let Some(value) = swallow("exposure_value", vendor.exposure_value()) {
            exposure = Some(f64::from(value));
        }
        if let Some(value) = swallow("auto_exposure", vendor.auto_exposure()) {
            auto_exposure = auto_flag(f64::from(value));
        }
    }

    ParameterState {
        exposure,
        gain,
        focus,
        auto_exposure,
        auto_focus,
        ranges: ranges.resolve(vendor),
    }
}

fn flag_value(enabled: bool) -> f64 {
    if enabled {
        1.0
    } else {
        0.0
    }
}

fn generic_set(device: &mut dyn CaptureDevice, property: CaptureProperty, value: f64) {
    if let Err(e) = device.set(property, value) {
        tracing::debug!(property = property.as_str(), value = value, error = %e, "Generic property write failed");
    }
}

fn generic_get(device: &dyn CaptureDevice, property: CaptureProperty) -> Option<f64> {
    match device.get(property) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(property = property.as_str(), error = %e, "Generic property read failed");
            None
        }
    }
}

fn swallow<T>(call: &'static str, result: HwResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(call = call, error = %e, "Vendor call failed");
            None
        }
    }
}
