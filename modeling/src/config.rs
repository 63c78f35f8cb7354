//! Modeling configuration
//!
//! Persisted as pretty JSON. Missing fields fall back to their defaults so
//! older files keep loading.

use crate::density::DensityTables;
use crate::error::{ModelingError, ModelingResult};
use crate::horizon::HorizonProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Horizon mask source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonConfig {
    /// Breakpoint file, `az:alt` or `az alt` per line
    pub file: Option<PathBuf>,
    pub use_fixed_floor: bool,
    /// Degrees
    pub floor_altitude: f64,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            file: None,
            use_fixed_floor: true,
            floor_altitude: 10.0,
        }
    }
}

impl HorizonConfig {
    /// Build the profile, returning a problem message alongside it
    pub fn load_profile(&self) -> (HorizonProfile, Option<String>) {
        let (profile, message) = match &self.file {
            Some(path) => HorizonProfile::from_file(path, self.use_fixed_floor, self.floor_altitude),
            None => match HorizonProfile::build(&[], self.use_fixed_floor, self.floor_altitude) {
                Ok(profile) => (Some(profile), None),
                Err(_) => (None, None),
            },
        };
        (profile.unwrap_or_else(HorizonProfile::none), message)
    }
}

/// Camera and solver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub exposure_secs: f64,
    pub binning: u32,
    pub iso: u32,
    pub fast_download: bool,
    pub subframe_enabled: bool,
    /// Subframe size in percent of the sensor
    pub subframe_percent: f64,
    pub blind_solve: bool,
    /// Micrometers
    pub pixel_size_um: f64,
    pub focal_length_mm: f64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            exposure_secs: 3.0,
            binning: 1,
            iso: 100,
            fast_download: true,
            subframe_enabled: false,
            subframe_percent: 100.0,
            blind_solve: false,
            pixel_size_um: 4.8,
            focal_length_mm: 1000.0,
        }
    }
}

impl CameraSettings {
    /// Arcseconds per pixel
    pub fn scale_hint(&self) -> f64 {
        if self.focal_length_mm <= 0.0 {
            return 0.0;
        }
        self.pixel_size_um * self.binning as f64 * 206.6 / self.focal_length_mm
    }

    /// Subframe scale, `None` for full frame
    pub fn subframe_scale(&self) -> Option<f64> {
        self.subframe_enabled
            .then(|| (self.subframe_percent / 100.0).clamp(0.0, 1.0))
    }
}

/// Repeated captures at one position with tracking off in between
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeChangeConfig {
    pub azimuth: f64,
    pub altitude: f64,
    pub runs: usize,
}

impl Default for TimeChangeConfig {
    fn default() -> Self {
        Self {
            azimuth: 180.0,
            altitude: 60.0,
            runs: 10,
        }
    }
}

/// Alternating slews between two positions, solving at the first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HysteresisConfig {
    pub azimuth1: f64,
    pub altitude1: f64,
    pub azimuth2: f64,
    pub altitude2: f64,
    pub runs: usize,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            azimuth1: 45.0,
            altitude1: 45.0,
            azimuth2: 225.0,
            altitude2: 45.0,
            runs: 5,
        }
    }
}

/// Complete modeling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelingConfig {
    /// Images go to `<image_root>/<run directory>`
    pub image_root: PathBuf,
    /// Analysis files go here
    pub results_root: PathBuf,
    pub settle_time_secs: u64,
    pub keep_images: bool,
    pub clear_model_first: bool,
    pub sort_points: bool,
    pub delete_below_horizon: bool,
    pub horizon: HorizonConfig,
    pub camera: CameraSettings,
    pub density_tables: DensityTables,
    pub time_change: TimeChangeConfig,
    pub hysteresis: HysteresisConfig,
}

impl Default for ModelingConfig {
    fn default() -> Self {
        Self {
            image_root: PathBuf::from("images"),
            results_root: PathBuf::from("analysedata"),
            settle_time_secs: 1,
            keep_images: false,
            clear_model_first: false,
            sort_points: true,
            delete_below_horizon: true,
            horizon: HorizonConfig::default(),
            camera: CameraSettings::default(),
            density_tables: DensityTables::default(),
            time_change: TimeChangeConfig::default(),
            hysteresis: HysteresisConfig::default(),
        }
    }
}

impl ModelingConfig {
    pub fn load(path: &Path) -> ModelingResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        tracing::debug!("Loaded modeling config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> ModelingResult<()> {
        self.density_tables
            .validate()
            .map_err(ModelingError::InvalidInput)
    }

    pub fn save(&self, path: &Path) -> ModelingResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::debug!("Saved modeling config to {}", path.display());
        Ok(())
    }
}
