//! Imaging backend interface
//!
//! Camera capture and plate solving are provided by an external application
//! behind `ImagingBackend`. The pipeline only sees the request and result
//! structs defined here.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use skyalign_mount::PierSide;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Result type for backend operations
pub type BackendResult<T> = Result<T, String>;

/// Sensor geometry reported by the camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraProps {
    pub sensor_width: u32,
    pub sensor_height: u32,
    pub can_subframe: bool,
    pub gain: Option<String>,
}

/// Readout window, already divided by the binning
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Subframe {
    pub enabled: bool,
    pub size_x: u32,
    pub size_y: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Subframe {
    /// Window for a sensor, centered when `scale` is given and the camera
    /// supports it, full frame otherwise
    pub fn for_sensor(props: &CameraProps, scale: Option<f64>, binning: u32) -> Self {
        let binning = binning.max(1);
        let (width, height) = (props.sensor_width, props.sensor_height);
        let mut frame = match scale {
            Some(scale) if props.can_subframe => {
                let size_x = (width as f64 * scale) as u32;
                let size_y = (height as f64 * scale) as u32;
                Self {
                    enabled: true,
                    size_x,
                    size_y,
                    offset_x: (width - size_x.min(width)) / 2,
                    offset_y: (height - size_y.min(height)) / 2,
                }
            }
            Some(_) => {
                tracing::warn!("Camera does not support subframe");
                Self::full(width, height)
            }
            None => Self::full(width, height),
        };
        frame.size_x /= binning;
        frame.size_y /= binning;
        frame
    }

    fn full(width: u32, height: u32) -> Self {
        Self {
            enabled: false,
            size_x: width,
            size_y: height,
            offset_x: 0,
            offset_y: 0,
        }
    }
}

/// Image request for one point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub directory: PathBuf,
    pub file_name: String,
    pub exposure_secs: f64,
    pub binning: u32,
    pub iso: u32,
    pub fast_download: bool,
    pub subframe: Subframe,
    pub blind_solve: bool,
    /// Arcseconds per pixel
    pub scale_hint: f64,
    pub azimuth: f64,
    pub altitude: f64,
    pub ra_j2000: f64,
    pub dec_j2000: f64,
    pub ra_jnow: f64,
    pub dec_jnow: f64,
    pub pier_side: Option<PierSide>,
    pub local_sidereal_time: String,
    pub refraction_temperature: Option<f64>,
    pub refraction_pressure: Option<f64>,
}

impl CaptureRequest {
    pub fn image_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResult {
    pub image_path: PathBuf,
    /// Scale derived from the image header, when it carries one
    pub scale_hint: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveRequest {
    pub image_path: PathBuf,
    pub ra_j2000_hint: f64,
    pub dec_j2000_hint: f64,
    pub scale_hint: f64,
    pub blind: bool,
    pub use_fits_headers: bool,
}

/// Solved image center in J2000
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    pub ra_j2000: f64,
    pub dec_j2000: f64,
    pub scale: f64,
    pub angle: f64,
    pub duration_secs: f64,
}

/// Camera and plate solver provider
#[async_trait]
pub trait ImagingBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn camera_props(&self) -> BackendResult<CameraProps>;

    async fn capture_image(&self, request: &CaptureRequest) -> BackendResult<CaptureResult>;

    async fn solve_image(&self, request: &SolveRequest) -> BackendResult<SolveResult>;
}

pub type SharedBackend = Arc<dyn ImagingBackend>;

/// Placeholder selected until a real backend is chosen
pub struct NoBackend;

#[async_trait]
impl ImagingBackend for NoBackend {
    fn name(&self) -> &str {
        "No Cam"
    }

    async fn camera_props(&self) -> BackendResult<CameraProps> {
        Err("No imaging backend selected".to_string())
    }

    async fn capture_image(&self, _request: &CaptureRequest) -> BackendResult<CaptureResult> {
        Err("No imaging backend selected".to_string())
    }

    async fn solve_image(&self, _request: &SolveRequest) -> BackendResult<SolveResult> {
        Err("No imaging backend selected".to_string())
    }
}

/// Simulated camera and solver.
///
/// Writes an empty placeholder image and solves it to the hinted position
/// plus a small random error.
pub struct SimulatorBackend {
    sensor_width: u32,
    sensor_height: u32,
}

impl Default for SimulatorBackend {
    fn default() -> Self {
        Self {
            sensor_width: 800,
            sensor_height: 600,
        }
    }
}

impl SimulatorBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImagingBackend for SimulatorBackend {
    fn name(&self) -> &str {
        "Simulator"
    }

    async fn camera_props(&self) -> BackendResult<CameraProps> {
        Ok(CameraProps {
            sensor_width: self.sensor_width,
            sensor_height: self.sensor_height,
            can_subframe: true,
            gain: None,
        })
    }

    async fn capture_image(&self, request: &CaptureRequest) -> BackendResult<CaptureResult> {
        let path = request.image_path();
        tracing::debug!("[SIM] Capturing {:.1}s image to {}", request.exposure_secs, path.display());
        tokio::fs::create_dir_all(&request.directory)
            .await
            .map_err(|e| format!("Cannot create {}: {}", request.directory.display(), e))?;
        tokio::fs::write(&path, b"SIMPLE  =                    T")
            .await
            .map_err(|e| format!("Cannot write {}: {}", path.display(), e))?;
        Ok(CaptureResult {
            image_path: path,
            scale_hint: None,
        })
    }

    async fn solve_image(&self, request: &SolveRequest) -> BackendResult<SolveResult> {
        let (ra_offset, dec_offset) = {
            let mut rng = rand::thread_rng();
            (
                (2.0 * rng.gen::<f64>() - 1.0) / 3600.0,
                (2.0 * rng.gen::<f64>() - 1.0) / 360.0,
            )
        };
        Ok(SolveResult {
            ra_j2000: request.ra_j2000_hint + ra_offset,
            dec_j2000: request.dec_j2000_hint + dec_offset,
            scale: 1.3,
            angle: 90.0,
            duration_secs: 2.5,
        })
    }
}

/// Holder of the selected backend.
///
/// The lock is held for the duration of every capture or solve call, so a
/// new selection waits for the call in flight to finish.
pub struct BackendChooser {
    current: Mutex<SharedBackend>,
}

impl Default for BackendChooser {
    fn default() -> Self {
        Self::new(Arc::new(NoBackend))
    }
}

impl BackendChooser {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            current: Mutex::new(backend),
        }
    }

    /// Lock the current backend for a call
    pub async fn lock(&self) -> MutexGuard<'_, SharedBackend> {
        self.current.lock().await
    }

    pub async fn select(&self, backend: SharedBackend) {
        let mut current = self.current.lock().await;
        tracing::info!("Imaging backend changed from {} to {}", current.name(), backend.name());
        *current = backend;
    }

    pub async fn name(&self) -> String {
        self.current.lock().await.name().to_string()
    }
}
