//! Image metadata sidecar
//!
//! Each captured image gets a JSON file next to it carrying the mount state
//! at capture time and, after solving, the solved position. Keys use the
//! FITS keyword names so the values can be copied into a header unchanged.

use crate::error::ModelingResult;
use crate::imaging::{CaptureRequest, SolveResult};
use serde::{Deserialize, Serialize};
use skyalign_mount::protocol;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    #[serde(rename = "DATE-OBS")]
    pub date_obs: String,
    /// Mount RA J2000 as `HH MM SS.ss`
    #[serde(rename = "OBJCTRA")]
    pub object_ra: String,
    /// Mount Dec J2000 as `sDD MM SS.s`
    #[serde(rename = "OBJCTDEC")]
    pub object_dec: String,
    #[serde(rename = "CDELT1")]
    pub cdelt1: f64,
    #[serde(rename = "CDELT2")]
    pub cdelt2: f64,
    #[serde(rename = "PIXSCALE")]
    pub pixel_scale: f64,
    #[serde(rename = "SCALE")]
    pub scale: f64,
    #[serde(rename = "MW_MRA")]
    pub mount_ra_jnow: String,
    #[serde(rename = "MW_MDEC")]
    pub mount_dec_jnow: String,
    #[serde(rename = "MW_ST")]
    pub sidereal_time: String,
    #[serde(rename = "MW_MSIDE")]
    pub pier_side: String,
    #[serde(rename = "MW_EXP")]
    pub exposure_secs: f64,
    #[serde(rename = "MW_AZ")]
    pub azimuth: f64,
    #[serde(rename = "MW_ALT")]
    pub altitude: f64,
    #[serde(rename = "MW_RTMP", skip_serializing_if = "Option::is_none", default)]
    pub refraction_temperature: Option<f64>,
    #[serde(rename = "MW_RPRS", skip_serializing_if = "Option::is_none", default)]
    pub refraction_pressure: Option<f64>,

    // solved values
    #[serde(rename = "MW_PRA", skip_serializing_if = "Option::is_none", default)]
    pub solved_ra_jnow: Option<f64>,
    #[serde(rename = "MW_PDEC", skip_serializing_if = "Option::is_none", default)]
    pub solved_dec_jnow: Option<f64>,
    #[serde(rename = "MW_SRA", skip_serializing_if = "Option::is_none", default)]
    pub solved_ra_j2000: Option<f64>,
    #[serde(rename = "MW_SDEC", skip_serializing_if = "Option::is_none", default)]
    pub solved_dec_j2000: Option<f64>,
    #[serde(rename = "MW_PSCAL", skip_serializing_if = "Option::is_none", default)]
    pub solved_scale: Option<f64>,
    #[serde(rename = "MW_PANGL", skip_serializing_if = "Option::is_none", default)]
    pub solved_angle: Option<f64>,
    #[serde(rename = "MW_PTS", skip_serializing_if = "Option::is_none", default)]
    pub solve_duration_secs: Option<f64>,
}

impl ImageMetadata {
    /// Metadata for a capture taken with `request`
    pub fn from_capture(request: &CaptureRequest, scale_hint: f64) -> Self {
        let sidereal_time: String = request.local_sidereal_time.chars().take(10).collect();
        Self {
            date_obs: chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            object_ra: spaced(protocol::format_hours(request.ra_j2000, 2)),
            object_dec: spaced(protocol::format_degrees(request.dec_j2000, ' ', 1)),
            cdelt1: scale_hint,
            cdelt2: scale_hint,
            pixel_scale: scale_hint,
            scale: scale_hint,
            mount_ra_jnow: spaced(protocol::format_hours(request.ra_jnow, 3)),
            mount_dec_jnow: spaced(protocol::format_degrees(request.dec_jnow, ' ', 2)),
            sidereal_time,
            pier_side: request
                .pier_side
                .map(|side| side.code().to_string())
                .unwrap_or_default(),
            exposure_secs: request.exposure_secs,
            azimuth: request.azimuth,
            altitude: request.altitude,
            refraction_temperature: request.refraction_temperature,
            refraction_pressure: request.refraction_pressure,
            solved_ra_jnow: None,
            solved_dec_jnow: None,
            solved_ra_j2000: None,
            solved_dec_j2000: None,
            solved_scale: None,
            solved_angle: None,
            solve_duration_secs: None,
        }
    }

    pub fn record_solve(&mut self, solve: &SolveResult, ra_jnow: f64, dec_jnow: f64) {
        self.solved_ra_jnow = Some(ra_jnow);
        self.solved_dec_jnow = Some(dec_jnow);
        self.solved_ra_j2000 = Some(solve.ra_j2000);
        self.solved_dec_j2000 = Some(solve.dec_j2000);
        self.solved_scale = Some(solve.scale);
        self.solved_angle = Some(solve.angle);
        self.solve_duration_secs = Some(solve.duration_secs);
    }

    /// Sidecar path for an image
    pub fn sidecar_path(image_path: &Path) -> PathBuf {
        image_path.with_extension("json")
    }

    pub async fn write(&self, image_path: &Path) -> ModelingResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(Self::sidecar_path(image_path), json).await?;
        Ok(())
    }

    pub async fn read(image_path: &Path) -> ModelingResult<Self> {
        let data = tokio::fs::read(Self::sidecar_path(image_path)).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}

fn spaced(text: String) -> String {
    text.replace(':', " ")
}
