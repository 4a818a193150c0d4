//! ParamRange - Parameter Range Resolution
//!
//! ## Responsibilities
//!
//! - {min, max, step, default} for exposure, gain and focus
//! - Vendor-discovered ranges when the vendor path is available
//! - Static configured ranges otherwise
//!
//! Ranges are recomputed on every request; nothing is cached.

use crate::error::{Error, Result};
use crate::vendor::{VendorConfig, VendorHandle};
use serde::{Deserialize, Serialize};

/// Valid value range for one tunable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: i32,
    pub max: i32,
    pub step: i32,
    pub default: i32,
}

impl ParameterRange {
    /// Static range shape: default is the minimum
    pub fn fixed(min: i32, max: i32, step: i32) -> Self {
        Self {
            min,
            max,
            step,
            default: min,
        }
    }

    /// min <= default <= max and step > 0
    pub fn is_valid(&self) -> bool {
        self.min <= self.default && self.default <= self.max && self.step > 0
    }
}

/// Ranges embedded in the parameter read response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterRanges {
    pub exposure: ParameterRange,
    pub gain: ParameterRange,
    pub focus: ParameterRange,
}

/// Static fallback ranges from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticRanges {
    pub exposure: ParameterRange,
    pub gain: ParameterRange,
    pub focus: ParameterRange,
}

impl Default for StaticRanges {
    fn default() -> Self {
        Self {
            exposure: ParameterRange::fixed(-13, 0, 1),
            gain: ParameterRange::fixed(0, 255, 1),
            focus: ParameterRange::fixed(0, 255, 1),
        }
    }
}

impl StaticRanges {
    /// Reject configured ranges that break the range invariant
    pub fn validate(&self) -> Result<()> {
        for (name, range) in [
            ("exposure", &self.exposure),
            ("gain", &self.gain),
            ("focus", &self.focus),
        ] {
            if !range.is_valid() {
                return Err(Error::Config(format!(
                    "{} range invalid: min={} max={} step={} default={}",
                    name, range.min, range.max, range.step, range.default
                )));
            }
        }
        Ok(())
    }
}

/// RangeResolver instance
#[derive(Debug, Clone)]
pub struct RangeResolver {
    statics: StaticRanges,
    exposure_index: Option<i32>,
    gain_index: Option<i32>,
}

impl RangeResolver {
    pub fn new(statics: StaticRanges, vendor: &VendorConfig) -> Self {
        Self {
            statics,
            exposure_index: vendor.exposure_index,
            gain_index: vendor.gain_index,
        }
    }

    /// Resolve all three ranges. Blocking when a vendor handle is given.
    pub fn resolve(&self, vendor: Option<&VendorHandle>) -> ParameterRanges {
        ParameterRanges {
            exposure: self.exposure(vendor),
            gain: self.gain(vendor),
            focus: self.focus(vendor),
        }
    }

    pub fn exposure(&self, vendor: Option<&VendorHandle>) -> ParameterRange {
        proc_amp_range(vendor, self.exposure_index, "exposure").unwrap_or(self.statics.exposure)
    }

    pub fn gain(&self, vendor: Option<&VendorHandle>) -> ParameterRange {
        proc_amp_range(vendor, self.gain_index, "gain").unwrap_or(self.statics.gain)
    }

    /// Focus from the vendor lens limits. The vendor call only reports two
    /// limits, so default is min and step is 1.
    pub fn focus(&self, vendor: Option<&VendorHandle>) -> ParameterRange {
        let Some(vendor) = vendor else {
            return self.statics.focus;
        };

        match vendor.lens_position_limits() {
            Ok((a, b)) => ParameterRange::fixed(a.min(b), a.max(b), 1),
            Err(e) => {
                tracing::debug!(error = %e, "Lens limits unavailable, using static focus range");
                self.statics.focus
            }
        }
    }
}

fn proc_amp_range(
    vendor: Option<&VendorHandle>,
    index: Option<i32>,
    name: &'static str,
) -> Option<ParameterRange> {
    let (vendor, index) = (vendor?, index?);

    match vendor.proc_amp_range(index) {
        Ok(raw) => {
            let range = ParameterRange {
                min: raw.min,
                max: raw.max,
                step: raw.step,
                default: raw.default,
            };
            if range.is_valid() {
                Some(range)
            } else {
                tracing::warn!(
                    parameter = name,
                    index = index,
                    min = raw.min,
                    max = raw.max,
                    step = raw.step,
                    default = raw.default,
                    "Vendor range violates min <= default <= max, step > 0; using static range"
                );
                None
            }
        }
        Err(e) => {
            tracing::debug!(parameter = name, index = index, error = %e, "Vendor range query failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::{ProcAmpRange, SimulatedVendor};
    use std::sync::Arc;

    fn vendor_config(exposure: Option<i32>, gain: Option<i32>) -> VendorConfig {
        VendorConfig {
            exposure_index: exposure,
            gain_index: gain,
            ..Default::default()
        }
    }

    fn handle(sdk: &SimulatedVendor) -> VendorHandle {
        VendorHandle::new(Arc::new(sdk.clone()), 0)
    }

    #[test]
    fn test_default_static_ranges_hold_invariant() {
        let statics = StaticRanges::default();
        statics.validate().unwrap();
        for range in [statics.exposure, statics.gain, statics.focus] {
            assert!(range.min <= range.default && range.default <= range.max);
            assert!(range.step > 0);
        }
    }

    #[test]
    fn test_invalid_static_range_rejected() {
        let statics = StaticRanges {
            gain: ParameterRange::fixed(10, 5, 1),
            ..Default::default()
        };
        assert!(matches!(statics.validate(), Err(Error::Config(_))));

        let statics = StaticRanges {
            focus: ParameterRange::fixed(0, 5, 0),
            ..Default::default()
        };
        assert!(statics.validate().is_err());
    }

    #[test]
    fn test_no_vendor_uses_statics() {
        let resolver = RangeResolver::new(StaticRanges::default(), &vendor_config(Some(1), Some(2)));
        let ranges = resolver.resolve(None);

        assert_eq!(ranges.exposure, ParameterRange::fixed(-13, 0, 1));
        assert_eq!(ranges.gain, ParameterRange::fixed(0, 255, 1));
        assert_eq!(ranges.focus, ParameterRange::fixed(0, 255, 1));
    }

    #[test]
    fn test_vendor_ranges_when_indices_configured() {
        let sdk = SimulatedVendor::new();
        sdk.set_range(7, ProcAmpRange { kind: 3, min: 1, max: 1000, step: 5, default: 100 });
        sdk.set_range(9, ProcAmpRange { kind: 0, min: 0, max: 64, step: 2, default: 16 });
        sdk.set_lens_limits(950, 120);
        let vendor = handle(&sdk);

        let resolver = RangeResolver::new(StaticRanges::default(), &vendor_config(Some(7), Some(9)));
        let ranges = resolver.resolve(Some(&vendor));

        assert_eq!(ranges.exposure, ParameterRange { min: 1, max: 1000, step: 5, default: 100 });
        assert_eq!(ranges.gain, ParameterRange { min: 0, max: 64, step: 2, default: 16 });
        assert_eq!(ranges.focus, ParameterRange { min: 120, max: 950, step: 1, default: 120 });
    }

    #[test]
    fn test_vendor_without_indices_uses_statics_for_exposure_gain() {
        let sdk = SimulatedVendor::new();
        sdk.set_range(7, ProcAmpRange { kind: 3, min: 1, max: 1000, step: 5, default: 100 });
        let vendor = handle(&sdk);

        let resolver = RangeResolver::new(StaticRanges::default(), &vendor_config(None, None));
        let ranges = resolver.resolve(Some(&vendor));

        assert_eq!(ranges.exposure, StaticRanges::default().exposure);
        assert_eq!(ranges.gain, StaticRanges::default().gain);
        // Focus still comes from the lens limits (simulated default 900/100)
        assert_eq!(ranges.focus, ParameterRange::fixed(100, 900, 1));
    }

    #[test]
    fn test_failed_vendor_queries_fall_back_per_parameter() {
        let sdk = SimulatedVendor::new();
        sdk.fail_call("lens_position_limits");
        sdk.set_range(7, ProcAmpRange { kind: 3, min: 1, max: 1000, step: 5, default: 100 });
        let vendor = handle(&sdk);

        // gain index 9 has no range configured -> query fails
        let resolver = RangeResolver::new(StaticRanges::default(), &vendor_config(Some(7), Some(9)));
        let ranges = resolver.resolve(Some(&vendor));

        assert_eq!(ranges.exposure.max, 1000);
        assert_eq!(ranges.gain, StaticRanges::default().gain);
        assert_eq!(ranges.focus, StaticRanges::default().focus);
    }

    #[test]
    fn test_invalid_vendor_range_falls_back() {
        let sdk = SimulatedVendor::new();
        sdk.set_range(7, ProcAmpRange { kind: 0, min: 10, max: 1, step: 0, default: 5 });
        let vendor = handle(&sdk);

        let resolver = RangeResolver::new(StaticRanges::default(), &vendor_config(Some(7), None));
        assert_eq!(resolver.exposure(Some(&vendor)), StaticRanges::default().exposure);
    }
}
