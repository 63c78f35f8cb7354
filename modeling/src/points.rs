//! Model point generation
//!
//! Produces the base and refinement point lists a model run visits. Every
//! generator replaces its target list, optionally drops points below the
//! horizon, optionally sorts by pier side, and publishes one
//! `PointsChanged` event.

use crate::density::{DensityKind, DensityTables};
use crate::error::{ModelingError, ModelingResult};
use crate::events::{EventSink, ModelingEvent};
use crate::horizon::HorizonProfile;
use serde::{Deserialize, Serialize};
use skyalign_mount::SharedTransform;
use std::path::Path;

/// Horizontal position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AzAlt {
    pub azimuth: f64,
    pub altitude: f64,
}

impl AzAlt {
    pub fn new(azimuth: f64, altitude: f64) -> Self {
        Self { azimuth, altitude }
    }
}

/// A position the model run visits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyPoint {
    pub azimuth: f64,
    pub altitude: f64,
    /// False once the point is part of the model
    pub visible: bool,
    /// False for slew-only points
    pub solve: bool,
    pub index: usize,
}

impl SkyPoint {
    pub fn new(azimuth: f64, altitude: f64, index: usize) -> Self {
        Self {
            azimuth,
            altitude,
            visible: true,
            solve: true,
            index,
        }
    }

    pub fn position(&self) -> AzAlt {
        AzAlt::new(self.azimuth, self.altitude)
    }
}

/// Which list a file import fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointSetKind {
    Base,
    Refinement,
}

/// Base and refinement positions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSet {
    pub base: Vec<AzAlt>,
    pub refinement: Vec<AzAlt>,
}

impl PointSet {
    /// Run points for a list, indices in order starting at `first_index`
    pub fn sky_points(positions: &[AzAlt], first_index: usize) -> Vec<SkyPoint> {
        positions
            .iter()
            .enumerate()
            .map(|(i, p)| SkyPoint::new(p.azimuth, p.altitude, first_index + i))
            .collect()
    }

    pub fn base_points(&self) -> Vec<SkyPoint> {
        Self::sky_points(&self.base, 0)
    }

    pub fn refinement_points(&self) -> Vec<SkyPoint> {
        Self::sky_points(&self.refinement, 0)
    }
}

/// Points on the east side (azimuth < 180) by ascending altitude, followed by
/// the west side by ascending altitude. Ties keep their input order.
pub fn sort_by_side(points: &[AzAlt]) -> Vec<AzAlt> {
    let (mut east, mut west): (Vec<AzAlt>, Vec<AzAlt>) =
        points.iter().partition(|p| p.azimuth < 180.0);
    east.sort_by(|a, b| a.altitude.total_cmp(&b.altitude));
    west.sort_by(|a, b| a.altitude.total_cmp(&b.altitude));
    east.extend(west);
    east
}

/// Keep the points that clear the horizon
pub fn delete_below_horizon(points: &[AzAlt], profile: &HorizonProfile) -> Vec<AzAlt> {
    points
        .iter()
        .copied()
        .filter(|p| profile.is_above(p.azimuth, p.altitude))
        .collect()
}

/// Owner of the point set and the generators that fill it
pub struct PointSetGenerator {
    points: PointSet,
    horizon: HorizonProfile,
    transform: SharedTransform,
    density_tables: DensityTables,
    events: EventSink,
}

impl PointSetGenerator {
    pub fn new(transform: SharedTransform, events: EventSink) -> Self {
        Self {
            points: PointSet::default(),
            horizon: HorizonProfile::none(),
            transform,
            density_tables: DensityTables::default(),
            events,
        }
    }

    pub fn with_density_tables(mut self, tables: DensityTables) -> Self {
        self.density_tables = tables;
        self
    }

    pub fn points(&self) -> &PointSet {
        &self.points
    }

    pub fn horizon(&self) -> &HorizonProfile {
        &self.horizon
    }

    pub fn set_horizon(&mut self, horizon: HorizonProfile) {
        self.horizon = horizon;
    }

    pub fn set_density_tables(&mut self, tables: DensityTables) {
        self.density_tables = tables;
    }

    /// Regular azimuth/altitude grid into the refinement list
    pub fn generate_grid(
        &mut self,
        rows: usize,
        cols: usize,
        alt_min: f64,
        alt_max: f64,
        apply_mask: bool,
        sort: bool,
    ) -> ModelingResult<Vec<SkyPoint>> {
        if cols == 0 || rows < 2 {
            return Err(ModelingError::InvalidInput(format!(
                "grid needs at least 2 rows and 1 column, got {} x {}",
                rows, cols
            )));
        }
        if alt_max < alt_min {
            return Err(ModelingError::InvalidInput(format!(
                "grid altitude range {}..{} is inverted",
                alt_min, alt_max
            )));
        }

        let az_step = 360.0 / cols as f64;
        let alt_step = (alt_max - alt_min) / (rows - 1) as f64;
        let mut positions = Vec::with_capacity(rows * cols);
        for c in 0..cols {
            let azimuth = 5.0 + c as f64 * az_step;
            if azimuth >= 360.0 {
                break;
            }
            for r in 0..rows {
                positions.push(AzAlt::new(azimuth, alt_min + r as f64 * alt_step));
            }
        }

        Ok(self.replace_refinement(positions, apply_mask, sort))
    }

    /// Hour angle / declination sweep into the refinement list
    pub fn generate_density_band(
        &mut self,
        kind: DensityKind,
        apply_mask: bool,
        sort: bool,
    ) -> Vec<SkyPoint> {
        let table = self.density_tables.table(kind).clone();
        let mut generated = Vec::new();
        for dec in table.declinations() {
            for ha in table.hour_angles(dec) {
                let (azimuth, altitude) = self.transform.hour_angle_to_az_alt(ha, dec);
                if altitude > 0.0 {
                    generated.push(AzAlt::new(azimuth, altitude));
                }
            }
        }

        let positions = if sort {
            let (east, west): (Vec<AzAlt>, Vec<AzAlt>) =
                generated.into_iter().partition(|p| p.azimuth <= 180.0);
            west.into_iter().chain(east).collect()
        } else {
            generated
        };
        tracing::debug!("Generated {:?} density band with {} points", kind, positions.len());
        self.replace_refinement(positions, apply_mask, sort)
    }

    /// `count` base points spaced evenly from a seed azimuth
    pub fn generate_base_triangle(
        &mut self,
        az_seed: f64,
        alt_seed: f64,
        count: usize,
    ) -> ModelingResult<Vec<SkyPoint>> {
        if count == 0 {
            return Err(ModelingError::InvalidInput(
                "base point count must be at least 1".to_string(),
            ));
        }
        let spacing = 360.0 / count as f64;
        let positions: Vec<AzAlt> = (0..count)
            .map(|i| AzAlt::new((az_seed + i as f64 * spacing).rem_euclid(360.0), alt_seed))
            .collect();

        self.points.base = positions;
        self.publish();
        Ok(self.points.base_points())
    }

    /// Track of a moving object into the refinement list
    pub fn generate_from_moving_object(
        &mut self,
        apply_mask: bool,
        hours_span: f64,
        num_points: usize,
        hours_preview: f64,
        ra_jnow: f64,
        dec_jnow: f64,
    ) -> Vec<SkyPoint> {
        let mut positions = Vec::new();
        if num_points > 0 {
            for i in 0..num_points {
                let ra = (ra_jnow - i as f64 * hours_span / num_points as f64 - hours_preview)
                    .rem_euclid(24.0);
                let (azimuth, altitude) = self.transform.ra_dec_to_az_alt(ra, dec_jnow);
                if altitude > 0.0 {
                    positions.push(AzAlt::new(azimuth, altitude));
                }
            }
        }
        self.replace_refinement(positions, apply_mask, false)
    }

    /// Load a point file into the base or refinement list.
    ///
    /// Problems are returned as a message; the list receives whatever was
    /// read before the problem.
    pub fn import_from_file(
        &mut self,
        path: &Path,
        kind: PointSetKind,
        apply_mask: bool,
        sort: bool,
    ) -> (Vec<SkyPoint>, Option<String>) {
        let (positions, message) = read_point_file(path, kind);
        if let Some(msg) = &message {
            self.events.warn(msg.clone());
        }

        let points = match kind {
            PointSetKind::Base => {
                self.points.base = positions;
                self.publish();
                self.points.base_points()
            }
            PointSetKind::Refinement => self.replace_refinement(positions, apply_mask, sort),
        };
        (points, message)
    }

    /// Sort the refinement list by pier side
    pub fn sort_refinement(&mut self) -> Vec<SkyPoint> {
        self.points.refinement = sort_by_side(&self.points.refinement);
        self.publish();
        self.points.refinement_points()
    }

    /// Drop refinement points below the horizon
    pub fn delete_refinement_below_horizon(&mut self) -> Vec<SkyPoint> {
        self.points.refinement = delete_below_horizon(&self.points.refinement, &self.horizon);
        self.publish();
        self.points.refinement_points()
    }

    /// Empty both lists
    pub fn clear_all(&mut self) {
        self.points = PointSet::default();
        self.publish();
    }

    fn replace_refinement(
        &mut self,
        mut positions: Vec<AzAlt>,
        apply_mask: bool,
        sort: bool,
    ) -> Vec<SkyPoint> {
        if apply_mask {
            positions = delete_below_horizon(&positions, &self.horizon);
        }
        if sort {
            positions = sort_by_side(&positions);
        }
        self.points.refinement = positions;
        self.publish();
        self.points.refinement_points()
    }

    fn publish(&self) {
        self.events.emit(ModelingEvent::PointsChanged {
            base: self.points.base.len(),
            refinement: self.points.refinement.len(),
        });
    }
}

/// Parse a point file.
///
/// `GRID` lines carry azimuth and altitude in the third and fourth column;
/// the first three are base points, the rest refinement. Other lines are
/// `az:alt` (refinement) or colon separated with more fields (base).
pub fn read_point_file(path: &Path, kind: PointSetKind) -> (Vec<AzAlt>, Option<String>) {
    let mut positions = Vec::new();
    if path.as_os_str().is_empty() {
        return (positions, Some("No model points filename given".to_string()));
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return (
                positions,
                Some(format!(
                    "Error loading model points from file {}: {}",
                    path.display(),
                    e
                )),
            )
        }
    };

    let parse_error = |line: &str| {
        format!(
            "Error loading model points from file {}: cannot parse '{}'",
            path.display(),
            line
        )
    };

    let mut grid_count = 0;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("GRID") {
            let fields: Vec<&str> = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|f| !f.is_empty())
                .collect();
            let point = match (fields.get(2), fields.get(3)) {
                (Some(az), Some(alt)) => az.parse::<f64>().ok().zip(alt.parse::<f64>().ok()),
                _ => None,
            };
            let Some((azimuth, altitude)) = point else {
                return (positions, Some(parse_error(line)));
            };
            grid_count += 1;
            let line_kind = if grid_count <= 3 {
                PointSetKind::Base
            } else {
                PointSetKind::Refinement
            };
            if line_kind == kind {
                positions.push(AzAlt::new(azimuth, altitude));
            }
        } else {
            let fields: Vec<&str> = line.split(':').collect();
            let point = match (fields.first(), fields.get(1)) {
                (Some(az), Some(alt)) => az
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .zip(alt.trim().parse::<f64>().ok()),
                _ => None,
            };
            let Some((azimuth, altitude)) = point else {
                return (positions, Some(parse_error(line)));
            };
            let line_kind = if fields.len() == 2 {
                PointSetKind::Refinement
            } else {
                PointSetKind::Base
            };
            if line_kind == kind {
                positions.push(AzAlt::new(azimuth, altitude));
            }
        }
    }
    (positions, None)
}
