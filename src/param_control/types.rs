//! Parameter request and state types

use crate::param_range::ParameterRanges;
use serde::{Deserialize, Serialize};

/// Partial parameter update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetParametersRequest {
    #[serde(default)]
    pub exposure: Option<f64>,
    #[serde(default)]
    pub gain: Option<f64>,
    #[serde(default)]
    pub focus: Option<f64>,
    #[serde(default)]
    pub auto_exposure: Option<bool>,
    #[serde(default)]
    pub auto_focus: Option<bool>,
}

impl SetParametersRequest {
    /// Manual exposure is suppressed when the same request enables auto exposure
    pub fn exposure_allowed(&self) -> bool {
        self.auto_exposure != Some(true)
    }

    /// Manual focus is suppressed when the same request enables autofocus
    pub fn focus_allowed(&self) -> bool {
        self.auto_focus != Some(true)
    }
}

/// Current parameter values. `None` serializes as null (unknown).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterState {
    pub exposure: Option<f64>,
    pub gain: Option<f64>,
    pub focus: Option<f64>,
    pub auto_exposure: Option<bool>,
    pub auto_focus: Option<bool>,
    pub ranges: ParameterRanges,
}

/// Tri-state decoding of an auto-mode flag: 1 is on, 0 is off, anything
/// else is unknown.
pub fn auto_flag(raw: f64) -> Option<bool> {
    if raw == 1.0 {
        Some(true)
    } else if raw == 0.0 {
        Some(false)
    } else {
        None
    }
}
