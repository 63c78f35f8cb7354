//! Horizon profile
//!
//! Minimum usable altitude for every integer azimuth, built from a sparse
//! list of breakpoints by linear interpolation.

use crate::error::{ModelingError, ModelingResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of azimuth bins
pub const HORIZON_BINS: usize = 360;

/// 360 bins of minimum altitude, or empty for no restriction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonProfile {
    bins: Vec<f64>,
}

impl HorizonProfile {
    /// A profile that accepts every point
    pub fn none() -> Self {
        Self::default()
    }

    /// Build the profile from `(azimuth, altitude)` breakpoints.
    ///
    /// Breakpoints are sorted by azimuth. Interpolation starts from an
    /// implicit `(0, 0)` origin and the last altitude is held up to 359°.
    /// With `use_fixed_floor` every bin is raised to at least
    /// `floor_altitude`, and an empty breakpoint list becomes a flat
    /// horizon at the floor.
    pub fn build(
        breakpoints: &[(f64, f64)],
        use_fixed_floor: bool,
        floor_altitude: f64,
    ) -> ModelingResult<Self> {
        let mut points: Vec<(f64, f64)> = breakpoints
            .iter()
            .map(|&(az, alt)| (az.clamp(0.0, 359.0), alt))
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        if points.is_empty() {
            if !use_fixed_floor {
                return Err(ModelingError::InvalidInput(
                    "horizon needs breakpoints or a fixed floor".to_string(),
                ));
            }
            points = vec![(0.0, floor_altitude), (359.0, floor_altitude)];
        }

        if let Some(&(last_az, last_alt)) = points.last() {
            if last_az < 359.0 {
                points.push((359.0, last_alt));
            }
        }

        let mut bins = vec![0.0; HORIZON_BINS];
        let (mut prev_az, mut prev_alt) = (0.0_f64, 0.0_f64);
        for &(az, alt) in &points {
            if az > prev_az {
                let slope = (alt - prev_alt) / (az - prev_az);
                let first = prev_az.ceil() as usize;
                let last = az.floor() as usize;
                for j in first..=last.min(HORIZON_BINS - 1) {
                    bins[j] = prev_alt + slope * (j as f64 - prev_az);
                }
            } else {
                bins[az as usize] = alt;
            }
            prev_az = az;
            prev_alt = alt;
        }

        if use_fixed_floor {
            for bin in bins.iter_mut() {
                *bin = bin.max(floor_altitude);
            }
        }

        Ok(Self { bins })
    }

    /// Load a horizon file and build the profile from it.
    ///
    /// Problems are returned as a message instead of an error, together with
    /// whatever profile could still be built from the floor setting.
    pub fn from_file(
        path: &Path,
        use_fixed_floor: bool,
        floor_altitude: f64,
    ) -> (Option<Self>, Option<String>) {
        let (breakpoints, message) = match load_breakpoints(path) {
            Ok(points) => (points, None),
            Err(msg) => {
                tracing::warn!("{}", msg);
                (Vec::new(), Some(msg))
            }
        };

        match Self::build(&breakpoints, use_fixed_floor, floor_altitude) {
            Ok(profile) => (Some(profile), message),
            Err(e) => (None, message.or_else(|| Some(e.to_string()))),
        }
    }

    /// True when the point clears the horizon. Points outside the populated
    /// azimuth range, and every point of an empty profile, are accepted.
    pub fn is_above(&self, azimuth: f64, altitude: f64) -> bool {
        match self.altitude_at(azimuth) {
            Some(min_alt) => altitude > min_alt,
            None => true,
        }
    }

    /// Minimum altitude at an azimuth
    pub fn altitude_at(&self, azimuth: f64) -> Option<f64> {
        if azimuth < 0.0 || !azimuth.is_finite() {
            return None;
        }
        self.bins.get(azimuth.floor() as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bins(&self) -> &[f64] {
        &self.bins
    }
}

/// Read `az:alt` or `az alt` lines; blank lines are skipped
pub fn load_breakpoints(path: &Path) -> Result<Vec<(f64, f64)>, String> {
    if path.as_os_str().is_empty() {
        return Err("No horizon points filename given".to_string());
    }
    if !path.is_file() {
        return Err(format!(
            "Horizon points file {} does not exist",
            path.display()
        ));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Error loading horizon points: {}", e))?;

    let mut points = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = if line.contains(':') {
            line.split(':').collect()
        } else {
            line.split_whitespace().collect()
        };
        let parsed = match fields.as_slice() {
            [az, alt] => az
                .trim()
                .parse::<f64>()
                .and_then(|az| alt.trim().parse::<f64>().map(|alt| (az, alt)))
                .ok(),
            _ => None,
        };
        match parsed {
            Some(point) => points.push(point),
            None => {
                return Err(format!(
                    "Error loading horizon points: line {} '{}' is not az/alt",
                    number + 1,
                    line
                ))
            }
        }
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_profile_has_360_bins() {
        let profile = HorizonProfile::build(&[(0.0, 10.0), (90.0, 30.0), (180.0, 10.0)], false, 0.0).unwrap();
        assert_eq!(profile.len(), 360);

        let profile = HorizonProfile::build(&[(250.5, 3.0)], true, 5.0).unwrap();
        assert_eq!(profile.len(), 360);
    }

    #[test]
    fn test_interpolation_and_hold() {
        let profile = HorizonProfile::build(&[(90.0, 30.0), (0.0, 10.0), (180.0, 10.0)], false, 0.0).unwrap();
        assert!(close(profile.altitude_at(0.0).unwrap(), 10.0));
        assert!(close(profile.altitude_at(45.0).unwrap(), 20.0));
        assert!(close(profile.altitude_at(90.0).unwrap(), 30.0));
        assert!(close(profile.altitude_at(135.0).unwrap(), 20.0));
        assert!(close(profile.altitude_at(200.0).unwrap(), 10.0));
        assert!(close(profile.altitude_at(359.9).unwrap(), 10.0));
    }

    #[test]
    fn test_implicit_origin() {
        let profile = HorizonProfile::build(&[(100.0, 50.0)], false, 0.0).unwrap();
        assert!(close(profile.altitude_at(0.0).unwrap(), 0.0));
        assert!(close(profile.altitude_at(50.0).unwrap(), 25.0));
        assert!(close(profile.altitude_at(300.0).unwrap(), 50.0));
    }

    #[test]
    fn test_is_above_is_strict() {
        let profile = HorizonProfile::build(&[(0.0, 10.0), (90.0, 30.0), (180.0, 10.0)], false, 0.0).unwrap();
        assert!(!profile.is_above(45.0, 20.0));
        assert!(profile.is_above(45.0, 20.5));
        assert!(!profile.is_above(45.7, 19.0));
        assert!(profile.is_above(400.0, -10.0));
        assert!(profile.is_above(-1.0, -10.0));
    }

    #[test]
    fn test_empty_profile_accepts_everything() {
        let profile = HorizonProfile::none();
        assert!(profile.is_empty());
        assert!(profile.is_above(10.0, -90.0));
    }

    #[test]
    fn test_fixed_floor() {
        let profile = HorizonProfile::build(&[], true, 15.0).unwrap();
        assert!(profile.bins().iter().all(|&b| close(b, 15.0)));

        let profile = HorizonProfile::build(&[(0.0, 5.0), (180.0, 40.0)], true, 10.0).unwrap();
        assert!(close(profile.altitude_at(0.0).unwrap(), 10.0));
        assert!(close(profile.altitude_at(180.0).unwrap(), 40.0));
    }

    #[test]
    fn test_no_breakpoints_no_floor_is_invalid() {
        let err = HorizonProfile::build(&[], false, 0.0).unwrap_err();
        assert!(matches!(err, ModelingError::InvalidInput(_)));
    }

    #[test]
    fn test_load_both_file_formats() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0:10").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "90 30").unwrap();
        writeln!(file, "180:10.5").unwrap();
        let points = load_breakpoints(file.path()).unwrap();
        assert_eq!(points, vec![(0.0, 10.0), (90.0, 30.0), (180.0, 10.5)]);

        let (profile, msg) = HorizonProfile::from_file(file.path(), false, 0.0);
        assert!(msg.is_none());
        assert!(close(profile.unwrap().altitude_at(45.0).unwrap(), 20.0));
    }

    #[test]
    fn test_load_errors_are_values() {
        let (profile, msg) = HorizonProfile::from_file(Path::new(""), false, 0.0);
        assert!(profile.is_none());
        assert!(msg.unwrap().contains("No horizon points filename"));

        let (profile, msg) = HorizonProfile::from_file(Path::new("/nonexistent/horizon.txt"), true, 5.0);
        assert!(msg.unwrap().contains("does not exist"));
        assert!(close(profile.unwrap().altitude_at(100.0).unwrap(), 5.0));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "10:abc").unwrap();
        let err = load_breakpoints(file.path()).unwrap_err();
        assert!(err.contains("line 1"));
    }
}
