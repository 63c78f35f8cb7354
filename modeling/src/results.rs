//! Model run results and their persistence

use crate::error::ModelingResult;
use serde::{Deserialize, Serialize};
use skyalign_mount::PierSide;
use std::path::{Path, PathBuf};

/// Measurement taken at one point of a model run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRunResult {
    pub index: usize,
    pub azimuth_commanded: f64,
    pub altitude_commanded: f64,
    /// Mount position at capture time
    pub ra_j2000: f64,
    pub dec_j2000: f64,
    pub ra_jnow: f64,
    pub dec_jnow: f64,
    pub pier_side: Option<PierSide>,
    pub solved_ra_j2000: f64,
    pub solved_dec_j2000: f64,
    pub solved_ra_jnow: f64,
    pub solved_dec_jnow: f64,
    /// Arcseconds
    pub ra_error_arcsec: f64,
    pub dec_error_arcsec: f64,
    pub model_error_arcsec: f64,
    pub scale: f64,
    pub angle: f64,
    pub solve_duration_secs: f64,
    pub image_path: PathBuf,
    pub local_sidereal_time: String,
    /// The point went into the mount model
    pub star_added: bool,
}

pub fn save_results(path: &Path, results: &[ModelRunResult]) -> ModelingResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(results)?)?;
    tracing::info!("Saved {} model results to {}", results.len(), path.display());
    Ok(())
}

pub fn load_results(path: &Path) -> ModelingResult<Vec<ModelRunResult>> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelingError;

    fn sample(index: usize) -> ModelRunResult {
        ModelRunResult {
            index,
            azimuth_commanded: 120.0,
            altitude_commanded: 45.0,
            ra_j2000: 10.0,
            dec_j2000: 20.0,
            ra_jnow: 10.01,
            dec_jnow: 20.05,
            pier_side: Some(PierSide::West),
            solved_ra_j2000: 10.0001,
            solved_dec_j2000: 20.001,
            solved_ra_jnow: 10.0101,
            solved_dec_jnow: 20.051,
            ra_error_arcsec: 0.36,
            dec_error_arcsec: 3.6,
            model_error_arcsec: 3.618,
            scale: 1.3,
            angle: 90.0,
            solve_duration_secs: 2.5,
            image_path: PathBuf::from("images/run/modeling000.fit"),
            local_sidereal_time: "10:00:00.00".to_string(),
            star_added: true,
        }
    }

    #[test]
    fn test_save_and_load_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysedata").join("2024-01-01-20-00-00_base.json");
        let results = vec![sample(0), sample(1)];

        save_results(&path, &results).unwrap();
        let loaded = load_results(&path).unwrap();
        assert_eq!(loaded, results);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_results(Path::new("/nonexistent/results.json")).unwrap_err();
        assert!(matches!(err, ModelingError::Io(_)));
    }
}
