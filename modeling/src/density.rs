//! Declination band tables for density point generation
//!
//! Each table lists declination bands and the hour angle step to use inside
//! them. Tables are plain configuration and carry a version number so that
//! stored configurations can be migrated when the built-in steps change.

use serde::{Deserialize, Serialize};

/// Smallest hour angle step in hours
pub const MIN_HOUR_ANGLE_STEP: f64 = 0.1;

/// Smallest declination step in degrees
pub const MIN_DEC_STEP: f64 = 1.0;

fn too_small(step: f64, min: f64) -> bool {
    step.is_nan() || step < min
}

/// Point density of a generated band set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DensityKind {
    Max,
    Normal,
    Min,
}

/// Hour angle step used below a declination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityBand {
    /// Band applies to declinations strictly below this value
    pub dec_below: f64,
    /// Hour angle step in hours
    pub hour_angle_step: f64,
}

/// Declination sweep with per-band hour angle steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityTable {
    pub version: u32,
    /// First declination in degrees
    pub dec_start: f64,
    /// Last declination in degrees (inclusive)
    pub dec_end: f64,
    pub dec_step: f64,
    /// Checked in order, first match wins
    pub bands: Vec<DensityBand>,
    /// Step for declinations above every band
    pub default_step: f64,
}

impl DensityTable {
    /// Reject steps that would generate an unbounded number of points
    pub fn validate(&self) -> Result<(), String> {
        if too_small(self.dec_step, MIN_DEC_STEP) {
            return Err(format!(
                "declination step {} is below {}°",
                self.dec_step, MIN_DEC_STEP
            ));
        }
        let steps = self
            .bands
            .iter()
            .map(|band| band.hour_angle_step)
            .chain(std::iter::once(self.default_step));
        for step in steps {
            if too_small(step, MIN_HOUR_ANGLE_STEP) {
                return Err(format!(
                    "hour angle step {} is below {}h",
                    step, MIN_HOUR_ANGLE_STEP
                ));
            }
        }
        Ok(())
    }

    pub fn declinations(&self) -> Vec<f64> {
        if too_small(self.dec_step, MIN_DEC_STEP) {
            return Vec::new();
        }
        let count = ((self.dec_end - self.dec_start) / self.dec_step).floor() as i64;
        (0..=count.max(-1))
            .map(|k| self.dec_start + k as f64 * self.dec_step)
            .collect()
    }

    pub fn hour_angle_step(&self, dec: f64) -> f64 {
        self.bands
            .iter()
            .find(|band| dec < band.dec_below)
            .map(|band| band.hour_angle_step)
            .unwrap_or(self.default_step)
    }

    /// Hour angles from +12h towards -12h, the end excluded
    pub fn hour_angles(&self, dec: f64) -> Vec<f64> {
        let step = self.hour_angle_step(dec);
        if too_small(step, MIN_HOUR_ANGLE_STEP) {
            return Vec::new();
        }
        let mut angles = Vec::new();
        let mut k = 0;
        loop {
            let ha = 12.0 - k as f64 * step;
            if ha <= -12.0 + 1e-9 {
                break;
            }
            angles.push(ha);
            k += 1;
        }
        angles
    }

    pub fn max() -> Self {
        Self {
            version: 1,
            dec_start: -10.0,
            dec_end: 80.0,
            dec_step: 10.0,
            bands: vec![
                DensityBand { dec_below: 30.0, hour_angle_step: 1.5 },
                DensityBand { dec_below: 70.0, hour_angle_step: 1.0 },
            ],
            default_step: 3.0,
        }
    }

    pub fn normal() -> Self {
        Self {
            version: 1,
            dec_start: -15.0,
            dec_end: 75.0,
            dec_step: 15.0,
            bands: vec![DensityBand { dec_below: 60.0, hour_angle_step: 1.0 }],
            default_step: 2.0,
        }
    }

    pub fn min() -> Self {
        Self {
            version: 1,
            dec_start: -15.0,
            dec_end: 75.0,
            dec_step: 30.0,
            bands: Vec::new(),
            default_step: 3.0,
        }
    }
}

/// One table per density kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityTables {
    pub max: DensityTable,
    pub normal: DensityTable,
    pub min: DensityTable,
}

impl Default for DensityTables {
    fn default() -> Self {
        Self {
            max: DensityTable::max(),
            normal: DensityTable::normal(),
            min: DensityTable::min(),
        }
    }
}

impl DensityTables {
    pub fn table(&self, kind: DensityKind) -> &DensityTable {
        match kind {
            DensityKind::Max => &self.max,
            DensityKind::Normal => &self.normal,
            DensityKind::Min => &self.min,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (kind, table) in [
            (DensityKind::Max, &self.max),
            (DensityKind::Normal, &self.normal),
            (DensityKind::Min, &self.min),
        ] {
            table
                .validate()
                .map_err(|e| format!("{:?} density table: {}", kind, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declination_sweeps() {
        assert_eq!(
            DensityTable::max().declinations(),
            vec![-10.0, 0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0]
        );
        assert_eq!(
            DensityTable::normal().declinations(),
            vec![-15.0, 0.0, 15.0, 30.0, 45.0, 60.0, 75.0]
        );
        assert_eq!(DensityTable::min().declinations(), vec![-15.0, 15.0, 45.0, 75.0]);
    }

    #[test]
    fn test_hour_angle_steps() {
        let max = DensityTable::max();
        assert_eq!(max.hour_angle_step(20.0), 1.5);
        assert_eq!(max.hour_angle_step(30.0), 1.0);
        assert_eq!(max.hour_angle_step(70.0), 3.0);

        let normal = DensityTable::normal();
        assert_eq!(normal.hour_angle_step(45.0), 1.0);
        assert_eq!(normal.hour_angle_step(60.0), 2.0);
    }

    #[test]
    fn test_hour_angles_exclude_end() {
        let angles = DensityTable::normal().hour_angles(0.0);
        assert_eq!(angles.len(), 24);
        assert_eq!(angles[0], 12.0);
        assert_eq!(*angles.last().unwrap(), -11.0);

        let angles = DensityTable::max().hour_angles(0.0);
        assert_eq!(angles.len(), 16);
        assert_eq!(*angles.last().unwrap(), -10.5);
    }

    #[test]
    fn test_tiny_steps_are_rejected() {
        let mut table = DensityTable::normal();
        table.default_step = 1e-9;
        assert!(table.validate().unwrap_err().contains("hour angle step"));
        assert!(table.hour_angles(70.0).is_empty());
        assert_eq!(table.hour_angles(0.0).len(), 24);

        let mut table = DensityTable::min();
        table.dec_step = 1e-6;
        assert!(table.validate().is_err());
        assert!(table.declinations().is_empty());

        let mut tables = DensityTables::default();
        assert!(tables.validate().is_ok());
        tables.max.bands[0].hour_angle_step = f64::NAN;
        assert!(tables.validate().unwrap_err().starts_with("Max"));
    }

    #[test]
    fn test_tables_roundtrip_through_json() {
        let tables = DensityTables::default();
        let json = serde_json::to_string(&tables).unwrap();
        let back: DensityTables = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tables);
        assert_eq!(back.table(DensityKind::Min).version, 1);
    }
}
