//! Dome interface

use crate::imaging::BackendResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Dome driver
#[async_trait]
pub trait Dome: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Start a slew to an azimuth in degrees
    async fn slew_to_azimuth(&self, azimuth: f64) -> BackendResult<()>;

    async fn is_slewing(&self) -> BackendResult<bool>;
}

pub type SharedDome = Arc<dyn Dome>;

/// Used when no dome is attached
pub struct NoDome;

#[async_trait]
impl Dome for NoDome {
    fn is_connected(&self) -> bool {
        false
    }

    async fn slew_to_azimuth(&self, _azimuth: f64) -> BackendResult<()> {
        Ok(())
    }

    async fn is_slewing(&self) -> BackendResult<bool> {
        Ok(false)
    }
}

/// Dome azimuth for a mount azimuth
pub fn dome_azimuth(azimuth: f64) -> f64 {
    azimuth.clamp(0.0, 359.9)
}
