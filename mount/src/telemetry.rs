//! Mount telemetry snapshot
//!
//! The status poller is the only writer. Readers take a clone of the record.

use crate::protocol::{GinfoStatus, PierSide};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Site parameters reported by the mount
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    /// Elevation in meters
    pub elevation: Option<f64>,
    /// Longitude in degrees, east positive
    pub longitude: Option<f64>,
    /// Latitude in degrees
    pub latitude: Option<f64>,
}

/// Firmware identification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    pub product_name: String,
    pub number_string: String,
    /// `a.b.c` encoded as `a*10000 + b*100 + c`
    pub number: u32,
    pub date: String,
    pub time: String,
    pub hardware_version: String,
}

/// Latest known mount state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MountTelemetry {
    // fast cadence
    pub status: Option<GinfoStatus>,
    /// Local sidereal time as text (`HH:MM:SS.ss`)
    pub local_sidereal_time: Option<String>,
    /// Local sidereal time in hours
    pub local_sidereal_time_hours: Option<f64>,
    /// Right ascension J2000 in hours
    pub ra_j2000: Option<f64>,
    /// Declination J2000 in degrees
    pub dec_j2000: Option<f64>,

    // medium cadence
    pub slew_rate: Option<String>,
    /// Minutes until the mount flips
    pub time_to_flip: Option<i32>,
    /// Minutes until the meridian
    pub time_to_meridian: Option<i32>,
    pub meridian_limit_track: Option<i32>,
    pub meridian_limit_slew: Option<i32>,

    // slow cadence
    pub refraction_temperature: Option<f64>,
    pub refraction_pressure: Option<f64>,
    pub telescope_temperature: Option<f64>,
    pub refraction_enabled: Option<bool>,
    pub unattended_flip: Option<bool>,
    pub dual_axis_tracking: Option<bool>,
    pub horizon_limit_high: Option<i32>,
    pub horizon_limit_low: Option<i32>,
    pub utc_data_valid: Option<String>,
    pub utc_data_expiration: Option<String>,

    // once
    pub site: SiteInfo,
    pub firmware: FirmwareInfo,
}

impl MountTelemetry {
    pub fn pier_side(&self) -> Option<PierSide> {
        self.status.as_ref().map(|s| s.pier_side)
    }

    pub fn is_slewing(&self) -> bool {
        self.status.as_ref().map(|s| s.slewing).unwrap_or(false)
    }

    /// Tracking when the status code is 0
    pub fn is_tracking(&self) -> bool {
        self.status.as_ref().map(|s| s.status == 0).unwrap_or(false)
    }
}

/// Telemetry shared between the poller and its readers
pub type SharedTelemetry = Arc<RwLock<MountTelemetry>>;

/// Create an empty shared telemetry record
pub fn shared_telemetry() -> SharedTelemetry {
    Arc::new(RwLock::new(MountTelemetry::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_telemetry() {
        let telemetry = MountTelemetry::default();
        assert!(telemetry.pier_side().is_none());
        assert!(!telemetry.is_slewing());
        assert!(!telemetry.is_tracking());
    }

    #[test]
    fn test_status_accessors() {
        let telemetry = MountTelemetry {
            status: Some(GinfoStatus {
                ra_jnow: 1.0,
                dec_jnow: 2.0,
                pier_side: PierSide::East,
                azimuth: 3.0,
                altitude: 4.0,
                julian_date: "2458000.5".to_string(),
                status: 0,
                slewing: true,
            }),
            ..MountTelemetry::default()
        };
        assert_eq!(telemetry.pier_side(), Some(PierSide::East));
        assert!(telemetry.is_slewing());
        assert!(telemetry.is_tracking());
    }
}
