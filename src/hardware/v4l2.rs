//! V4L2 control conventions used by the USB backend
//!
//! `V4L2_CID_EXPOSURE_AUTO` is a menu, not a boolean: 0 is full auto,
//! 1 is manual, 2 is shutter priority and 3 is aperture priority. UVC
//! microscopes typically only offer manual and aperture priority.

use super::{HardwareError, HwResult};

/// V4L2 control ids for the auto modes nokhwa has no known control for
pub const CID_EXPOSURE_AUTO: u128 = 0x009a_0901;
pub const CID_FOCUS_AUTO: u128 = 0x009a_090c;

pub const EXPOSURE_AUTO: i64 = 0;
pub const EXPOSURE_MANUAL: i64 = 1;
pub const EXPOSURE_SHUTTER_PRIORITY: i64 = 2;
pub const EXPOSURE_APERTURE_PRIORITY: i64 = 3;

/// Menu value for an auto-exposure flag (1.0 on, 0.0 off)
pub fn exposure_mode(flag: f64) -> i64 {
    if flag != 0.0 {
        EXPOSURE_APERTURE_PRIORITY
    } else {
        EXPOSURE_MANUAL
    }
}

/// Auto-exposure flag (1.0 on, 0.0 off) for a menu value
pub fn exposure_flag(mode: i64) -> HwResult<f64> {
    match mode {
        EXPOSURE_MANUAL => Ok(0.0),
        EXPOSURE_AUTO | EXPOSURE_APERTURE_PRIORITY => Ok(1.0),
        other => Err(HardwareError::Unsupported(format!(
            "exposure mode {} has no auto/manual equivalent",
            other
        ))),
    }
}
