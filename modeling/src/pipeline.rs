//! Model run pipeline
//!
//! Drives the mount (and dome) through a list of points. At every point it
//! settles, captures, plate solves and, for model building runs, feeds the
//! solved position back to the mount as a refinement star.
//!
//! Cancellation is cooperative. The flag is checked:
//! - before every slew, where a set flag is cleared and the run stops with
//!   the results gathered so far
//! - in every cycle of the slew waits
//! - in every second of the settle countdown
//! - before the capture of a point
//!
//! Calls into the imaging backend are never interrupted.

use crate::config::{CameraSettings, ModelingConfig};
use crate::dome::{dome_azimuth, SharedDome};
use crate::error::{ModelingError, ModelingResult};
use crate::events::{EventSink, ModelingEvent, RunProgress};
use crate::imaging::{BackendChooser, CaptureRequest, SolveRequest, SolveResult, Subframe};
use crate::metadata::ImageMetadata;
use crate::points::SkyPoint;
use crate::results::ModelRunResult;
use serde::{Deserialize, Serialize};
use skyalign_mount::{protocol, Mount, SharedTelemetry, SharedTransform};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Poll cycles allowed for the mount to report a started slew
const SLEW_START_CYCLES: u32 = 30;

/// Pause after deleting the mount model
const CLEAR_MODEL_PAUSE: Duration = Duration::from_secs(4);

/// Image file name prefix
const CAPTURE_FILE_PREFIX: &str = "modeling";

/// Directory of single point sync runs
pub const PLATE_SOLVE_SYNC_DIRECTORY: &str = "platesolvesync";

/// Stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Idle,
    Preparing,
    Slewing,
    Settling,
    Capturing,
    Solving,
    Syncing,
    Cancelled,
}

/// Kind of model run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunKind {
    Base,
    Refinement,
    All,
    Check,
    /// Repeated captures at one position, tracking off between captures
    TimeChange,
    /// Alternating positions, solving only at the first
    Hysteresis,
}

impl RunKind {
    pub fn label(&self) -> &'static str {
        match self {
            RunKind::Base => "Base",
            RunKind::Refinement => "Refinement",
            RunKind::All => "All",
            RunKind::Check => "Check",
            RunKind::TimeChange => "TimeChange",
            RunKind::Hysteresis => "Hysteresis",
        }
    }

    /// Runs that add solved points to the mount model
    pub fn syncs_model(&self) -> bool {
        matches!(self, RunKind::Base | RunKind::Refinement | RunKind::All)
    }

    /// Suffix of the analysis file name
    pub fn file_suffix(&self) -> &'static str {
        match self {
            RunKind::Base => "base",
            RunKind::Refinement => "refinement",
            RunKind::All => "all",
            RunKind::Check => "check",
            RunKind::TimeChange => "timechange",
            RunKind::Hysteresis => "hysteresis",
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Settings a run takes from the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub image_root: PathBuf,
    pub camera: CameraSettings,
    pub keep_images: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from_config(&ModelingConfig::default())
    }
}

impl RunConfig {
    pub fn from_config(config: &ModelingConfig) -> Self {
        Self {
            image_root: config.image_root.clone(),
            camera: config.camera.clone(),
            keep_images: config.keep_images,
        }
    }
}

/// What a run produced
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub results: Vec<ModelRunResult>,
    /// The run points with updated visibility
    pub points: Vec<SkyPoint>,
    pub cancelled: bool,
    /// Points added to the mount model
    pub modeled: usize,
}

/// Clears the running flag when a run ends
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Capture request parts shared by every point of a run
struct CaptureSetup {
    directory: PathBuf,
    subframe: Subframe,
}

/// Solved capture of one point
struct SolvedImage {
    request: CaptureRequest,
    solve: SolveResult,
    image_path: PathBuf,
    ra_jnow: f64,
    dec_jnow: f64,
}

/// Model run pipeline
pub struct ModelRunPipeline {
    mount: Mount,
    telemetry: SharedTelemetry,
    transform: SharedTransform,
    backend: Arc<BackendChooser>,
    dome: SharedDome,
    events: EventSink,
    cancel: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl ModelRunPipeline {
    pub fn new(
        mount: Mount,
        telemetry: SharedTelemetry,
        transform: SharedTransform,
        backend: Arc<BackendChooser>,
        dome: SharedDome,
        events: EventSink,
    ) -> Self {
        Self {
            mount,
            telemetry,
            transform,
            backend,
            dome,
            events,
            cancel: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn mount(&self) -> &Mount {
        &self.mount
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn backend(&self) -> &Arc<BackendChooser> {
        &self.backend
    }

    pub fn set_dome(&mut self, dome: SharedDome) {
        self.dome = dome;
    }

    /// Flag checked at the cancellation points of a run
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Request cancellation of the current run
    pub fn cancel(&self) {
        tracing::info!("Model run cancellation requested");
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn start_running(&self) -> ModelingResult<RunningGuard> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ModelingError::Busy("a model run is in progress".to_string()));
        }
        Ok(RunningGuard(self.running.clone()))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn set_stage(&self, stage: PipelineStage) {
        tracing::debug!("Pipeline stage {:?}", stage);
        self.events.emit(ModelingEvent::StageChanged(stage));
    }

    /// Run `points` and return what was measured
    pub async fn run(
        &self,
        kind: RunKind,
        points: Vec<SkyPoint>,
        directory: &str,
        settle_time_secs: u64,
        config: &RunConfig,
    ) -> ModelingResult<RunOutcome> {
        let _running = self.start_running()?;
        let run_id = Uuid::new_v4();
        let total = points.len();

        let mut outcome = RunOutcome {
            points,
            ..Default::default()
        };

        self.events.emit(ModelingEvent::Progress(RunProgress::reset()));
        self.events.emit(ModelingEvent::RunStarted { run_id, kind, total });
        self.events.log(format!("Start {} Model", kind));

        if total == 0 {
            self.events.warn(format!("There are no points for the {} model", kind));
            self.finish(run_id, kind, &outcome);
            return Ok(outcome);
        }

        self.set_stage(PipelineStage::Preparing);
        let setup = match self.prepare(directory, config).await {
            Ok(setup) => setup,
            Err(e) => {
                self.events.warn(format!("{} Model canceled! Error: {}", kind, e));
                self.finish(run_id, kind, &outcome);
                return Ok(outcome);
            }
        };

        if let Err(e) = self.start_mount().await {
            self.events.warn(format!("{} Model canceled! Error: {}", kind, e));
            self.remove_images(&setup.directory, config.keep_images).await;
            self.finish(run_id, kind, &outcome);
            return Ok(outcome);
        }

        let started = tokio::time::Instant::now();
        for i in 0..total {
            let point = outcome.points[i];

            if point.visible {
                if self.cancel.swap(false, Ordering::SeqCst) {
                    self.events.log(format!("{} Model canceled !", kind));
                    if let Err(e) = self.mount.start_tracking().await {
                        tracing::warn!("Could not restart tracking: {}", e);
                    }
                    self.events.emit(ModelingEvent::Progress(RunProgress::reset()));
                    outcome.cancelled = true;
                    break;
                }

                self.events.log(format!(
                    "Slewing to point {:2} @ Az: {:3.0}° Alt: {:2.0}°",
                    i + 1,
                    point.azimuth,
                    point.altitude
                ));
                if let Err(e) = self.slew_for_run(kind, i, &point).await {
                    self.events.warn(format!("Slew to point {} failed: {}", i + 1, e));
                    self.emit_progress(i + 1, total, started);
                    continue;
                }
                self.settle(settle_time_secs).await;
            }

            if point.visible && point.solve && !self.is_cancelled() {
                if let Some(result) = self
                    .measure_point(kind, i, &point, &setup, config, &mut outcome)
                    .await
                {
                    outcome.results.push(result);
                }
            }

            self.emit_progress(i + 1, total, started);
        }

        // A flag raised during the last point
        if self.cancel.swap(false, Ordering::SeqCst) {
            outcome.cancelled = true;
        }

        self.remove_images(&setup.directory, config.keep_images).await;
        self.finish(run_id, kind, &outcome);
        Ok(outcome)
    }

    /// Unpark and start tracking
    async fn start_mount(&self) -> ModelingResult<()> {
        self.mount.unpark().await?;
        self.mount.start_tracking().await?;
        Ok(())
    }

    async fn remove_images(&self, directory: &Path, keep_images: bool) {
        if keep_images {
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(directory).await {
            tracing::debug!("Could not remove {}: {}", directory.display(), e);
        }
    }

    fn finish(&self, run_id: Uuid, kind: RunKind, outcome: &RunOutcome) {
        self.events.log(format!(
            "{} Model run finished. Number of modeled points: {:3}",
            kind, outcome.modeled
        ));
        self.set_stage(if outcome.cancelled {
            PipelineStage::Cancelled
        } else {
            PipelineStage::Idle
        });
        self.events.emit(ModelingEvent::RunFinished {
            run_id,
            kind,
            modeled: outcome.modeled,
            cancelled: outcome.cancelled,
        });
    }

    fn emit_progress(&self, completed: usize, total: usize, started: tokio::time::Instant) {
        let elapsed = started.elapsed().as_secs_f64();
        self.events.emit(ModelingEvent::Progress(RunProgress::after_point(
            completed, total, elapsed,
        )));
    }

    /// Camera geometry and image directory
    async fn prepare(&self, directory: &str, config: &RunConfig) -> ModelingResult<CaptureSetup> {
        let props = {
            let backend = self.backend.lock().await;
            backend
                .camera_props()
                .await
                .map_err(ModelingError::DeviceUnavailable)?
        };
        tracing::info!(
            "Camera props: {}x{}, subframe: {}",
            props.sensor_width,
            props.sensor_height,
            props.can_subframe
        );

        let subframe = Subframe::for_sensor(
            &props,
            config.camera.subframe_scale(),
            config.camera.binning,
        );
        let directory = config.image_root.join(directory);
        tokio::fs::create_dir_all(&directory).await?;
        Ok(CaptureSetup {
            directory,
            subframe,
        })
    }

    async fn slew_for_run(&self, kind: RunKind, index: usize, point: &SkyPoint) -> ModelingResult<()> {
        self.set_stage(PipelineStage::Slewing);
        if kind == RunKind::TimeChange {
            // Slew once, afterwards the sky drifts through the field
            if index == 0 {
                self.slew_mount_dome(point.azimuth, point.altitude).await?;
                self.mount.stop_tracking().await?;
            }
            return Ok(());
        }
        self.slew_mount_dome(point.azimuth, point.altitude).await
    }

    /// Slew the mount, and the dome when connected, and wait until both stopped
    pub async fn slew_mount_dome(&self, azimuth: f64, altitude: f64) -> ModelingResult<()> {
        self.mount.slew_to_az_alt(azimuth, altitude).await?;

        let dome_connected = self.dome.is_connected();
        if dome_connected {
            if let Err(e) = self.dome.slew_to_azimuth(dome_azimuth(azimuth)).await {
                self.events.warn(format!("Dome slew failed: {}", e));
            }
        }

        for _ in 0..SLEW_START_CYCLES {
            if self.is_cancelled() || self.mount.is_slewing().await? {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        loop {
            if self.is_cancelled() {
                return Ok(());
            }
            let mount_slewing = self.mount.is_slewing().await?;
            let dome_slewing = if dome_connected {
                self.dome.is_slewing().await.unwrap_or_else(|e| {
                    tracing::warn!("Dome status failed: {}", e);
                    false
                })
            } else {
                false
            };
            if !mount_slewing && !dome_slewing {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn settle(&self, settle_time_secs: u64) {
        self.set_stage(PipelineStage::Settling);
        self.events.log(format!(
            "Wait mount settling / delay time: {:02} sec",
            settle_time_secs
        ));
        let mut remaining = settle_time_secs;
        while remaining > 0 {
            if self.is_cancelled() {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            remaining -= 1;
            self.events
                .emit(ModelingEvent::SettleCountdown { remaining_secs: remaining });
        }
    }

    /// Capture, solve and sync one point
    async fn measure_point(
        &self,
        kind: RunKind,
        index: usize,
        point: &SkyPoint,
        setup: &CaptureSetup,
        config: &RunConfig,
        outcome: &mut RunOutcome,
    ) -> Option<ModelRunResult> {
        let file_name = format!("{}{:03}.fit", CAPTURE_FILE_PREFIX, index);
        let tracking_toggle = kind == RunKind::TimeChange;
        self.events
            .log(format!("Capturing image for modeling point {:2}", index + 1));

        let solved = match self
            .capture_and_solve(setup, file_name, point, &config.camera, tracking_toggle)
            .await
        {
            Ok(solved) => solved,
            Err(e) => {
                self.events.warn(e);
                return None;
            }
        };

        let mut star_added = false;
        if kind.syncs_model() {
            self.set_stage(PipelineStage::Syncing);
            match self.add_refinement_star(solved.ra_jnow, solved.dec_jnow).await {
                Ok(()) => {
                    self.events.log("Point added");
                    star_added = true;
                    outcome.modeled += 1;
                    outcome.points[index].visible = false;
                    self.events.emit(ModelingEvent::PointProcessed {
                        index: point.index,
                        visible: false,
                    });
                }
                Err(ModelingError::ProtocolMismatch(reason)) => {
                    tracing::debug!("{}", reason);
                    self.events.warn("Point could not be added - please check!")
                }
                Err(e) => self.events.warn(format!("Point could not be added: {}", e)),
            }
        }

        let request = &solved.request;
        let ra_error = (solved.solve.ra_j2000 - request.ra_j2000) * 3600.0;
        let dec_error = (solved.solve.dec_j2000 - request.dec_j2000) * 3600.0;
        self.events.log(format!(
            "RA_diff:  {:2.1}    DEC_diff: {:2.1}",
            ra_error, dec_error
        ));

        Some(ModelRunResult {
            index: point.index,
            azimuth_commanded: point.azimuth,
            altitude_commanded: point.altitude,
            ra_j2000: request.ra_j2000,
            dec_j2000: request.dec_j2000,
            ra_jnow: request.ra_jnow,
            dec_jnow: request.dec_jnow,
            pier_side: request.pier_side,
            solved_ra_j2000: solved.solve.ra_j2000,
            solved_dec_j2000: solved.solve.dec_j2000,
            solved_ra_jnow: solved.ra_jnow,
            solved_dec_jnow: solved.dec_jnow,
            ra_error_arcsec: ra_error,
            dec_error_arcsec: dec_error,
            model_error_arcsec: ra_error.hypot(dec_error),
            scale: solved.solve.scale,
            angle: solved.solve.angle,
            solve_duration_secs: solved.solve.duration_secs,
            image_path: solved.image_path,
            local_sidereal_time: request.local_sidereal_time.clone(),
            star_added,
        })
    }

    /// Capture request from the current mount state
    async fn capture_request(
        &self,
        setup: &CaptureSetup,
        file_name: String,
        azimuth: f64,
        altitude: f64,
        camera: &CameraSettings,
    ) -> ModelingResult<CaptureRequest> {
        let local_sidereal_time = self.mount.sidereal_time().await?;
        let status = self.mount.read_status().await?;
        let (ra_j2000, dec_j2000) = self.transform.jnow_to_j2000(status.ra_jnow, status.dec_jnow);
        let (refraction_temperature, refraction_pressure) = {
            let telemetry = self.telemetry.read().await;
            (telemetry.refraction_temperature, telemetry.refraction_pressure)
        };

        Ok(CaptureRequest {
            directory: setup.directory.clone(),
            file_name,
            exposure_secs: camera.exposure_secs,
            binning: camera.binning,
            iso: camera.iso,
            fast_download: camera.fast_download,
            subframe: setup.subframe,
            blind_solve: camera.blind_solve,
            scale_hint: camera.scale_hint(),
            azimuth,
            altitude,
            ra_j2000,
            dec_j2000,
            ra_jnow: status.ra_jnow,
            dec_jnow: status.dec_jnow,
            pier_side: Some(status.pier_side),
            local_sidereal_time,
            refraction_temperature,
            refraction_pressure,
        })
    }

    /// Capture and solve at the current position. Failures come back as the
    /// log line describing them.
    async fn capture_and_solve(
        &self,
        setup: &CaptureSetup,
        file_name: String,
        point: &SkyPoint,
        camera: &CameraSettings,
        tracking_toggle: bool,
    ) -> Result<SolvedImage, String> {
        self.set_stage(PipelineStage::Capturing);
        let request = self
            .capture_request(setup, file_name, point.azimuth, point.altitude, camera)
            .await
            .map_err(|e| format!("Reading mount state failed: {}", e))?;

        if tracking_toggle {
            self.mount
                .start_tracking()
                .await
                .map_err(|e| format!("Tracking on failed: {}", e))?;
        }
        let capture = {
            let backend = self.backend.lock().await;
            backend.capture_image(&request).await
        };
        if tracking_toggle {
            if let Err(e) = self.mount.stop_tracking().await {
                tracing::warn!("Tracking off failed: {}", e);
            }
        }
        let capture = capture.map_err(|e| format!("Capturing image failed: {}", e))?;

        let scale_hint = capture.scale_hint.unwrap_or(request.scale_hint);
        let mut metadata = ImageMetadata::from_capture(&request, scale_hint);
        if let Err(e) = metadata.write(&capture.image_path).await {
            tracing::warn!("Could not write image metadata: {}", e);
        }

        self.set_stage(PipelineStage::Solving);
        self.events.log("Solving Image");
        let solve_request = SolveRequest {
            image_path: capture.image_path.clone(),
            ra_j2000_hint: request.ra_j2000,
            dec_j2000_hint: request.dec_j2000,
            scale_hint,
            blind: request.blind_solve,
            use_fits_headers: true,
        };
        let solve = {
            let backend = self.backend.lock().await;
            backend.solve_image(&solve_request).await
        };
        self.events
            .log(format!("Image path: {}", capture.image_path.display()));
        let solve = solve.map_err(|e| format!("Solving error: {}", e))?;

        let (ra_jnow, dec_jnow) = self.transform.j2000_to_jnow(solve.ra_j2000, solve.dec_j2000);
        metadata.record_solve(&solve, ra_jnow, dec_jnow);
        if let Err(e) = metadata.write(&capture.image_path).await {
            tracing::warn!("Could not update image metadata: {}", e);
        }

        Ok(SolvedImage {
            request,
            solve,
            image_path: capture.image_path,
            ra_jnow,
            dec_jnow,
        })
    }

    /// Solve the current position and sync the mount to it
    pub async fn plate_solve_sync(&self, config: &RunConfig) -> ModelingResult<bool> {
        let _running = self.start_running()?;
        self.events.log("Start Sync Mount Model");

        self.set_stage(PipelineStage::Preparing);
        let setup = match self.prepare(PLATE_SOLVE_SYNC_DIRECTORY, config).await {
            Ok(setup) => setup,
            Err(e) => {
                self.events.warn(format!("Sync Mount Model canceled! Error: {}", e));
                self.set_stage(PipelineStage::Idle);
                return Ok(false);
            }
        };

        let synced = self.solve_and_sync(&setup, config).await;
        self.remove_images(&setup.directory, config.keep_images).await;
        self.events.log("Sync Mount Model finished !");
        self.set_stage(PipelineStage::Idle);
        synced
    }

    async fn solve_and_sync(&self, setup: &CaptureSetup, config: &RunConfig) -> ModelingResult<bool> {
        if let Err(e) = self.start_mount().await {
            self.events.warn(format!("Sync Mount Model canceled! Error: {}", e));
            return Ok(false);
        }

        let status = self.mount.read_status().await?;
        let point = SkyPoint::new(status.azimuth, status.altitude, 0);
        let file_name = format!("{}.fit", PLATE_SOLVE_SYNC_DIRECTORY);

        let solved = match self
            .capture_and_solve(setup, file_name, &point, &config.camera, false)
            .await
        {
            Ok(solved) => solved,
            Err(e) => {
                self.events.warn(e);
                return Ok(false);
            }
        };

        self.set_stage(PipelineStage::Syncing);
        match self.sync_mount_model(solved.ra_jnow, solved.dec_jnow).await {
            Ok(()) => {
                self.events.log("Mount model synced");
                Ok(true)
            }
            Err(ModelingError::ProtocolMismatch(reason)) => {
                self.events.warn(format!("Error in sync mount model: {}", reason));
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Plain sync to a position of date. A reply other than `Coord...` is a
    /// `ProtocolMismatch`.
    pub async fn sync_mount_model(&self, ra_jnow: f64, dec_jnow: f64) -> ModelingResult<()> {
        tracing::info!("Sync mount model to RA {:.5}h, Dec {:.5}°", ra_jnow, dec_jnow);
        self.mount.set_target_ra_dec(ra_jnow, dec_jnow).await?;
        let reply = self.mount.sync_plain().await?;
        if reply.starts_with("Coord") {
            Ok(())
        } else {
            Err(ModelingError::ProtocolMismatch(format!(
                "sync replied '{}'",
                reply
            )))
        }
    }

    /// Add a refinement star at a position of date.
    ///
    /// The star counts as added when the model grew by exactly one star,
    /// whatever the sync reply says. Otherwise the result is a
    /// `ProtocolMismatch`.
    pub async fn add_refinement_star(&self, ra_jnow: f64, dec_jnow: f64) -> ModelingResult<()> {
        tracing::info!("Adding refinement star RA {:.5}h, Dec {:.5}°", ra_jnow, dec_jnow);
        self.mount.set_target_ra_dec(ra_jnow, dec_jnow).await?;
        let before = self.mount.number_model_stars().await?;
        let reply = self.mount.sync_refine().await?;
        let after = self.mount.number_model_stars().await?;

        let added = i64::from(after) - i64::from(before) == 1;
        match (reply.as_str(), added) {
            ("E", true) => tracing::warn!("Star added, but the mount replied E"),
            ("E", false) => tracing::error!("Error adding star"),
            (_, false) => tracing::warn!(
                "Mount replied '{}' but the model has {} stars instead of {}",
                reply,
                after,
                before + 1
            ),
            (_, true) => tracing::info!("Refinement star added"),
        }
        if added {
            Ok(())
        } else {
            Err(ModelingError::ProtocolMismatch(format!(
                "model has {} stars after adding to {}",
                after, before
            )))
        }
    }

    /// Number of stars in the mount model
    pub async fn number_model_stars(&self) -> ModelingResult<u32> {
        Ok(self.mount.number_model_stars().await?)
    }

    /// Delete the mount model
    pub async fn clear_alignment_model(&self) -> ModelingResult<()> {
        self.events
            .log("Clearing alignment model - taking 4 seconds.");
        self.mount.clear_model().await?;
        tokio::time::sleep(CLEAR_MODEL_PAUSE).await;
        self.events.log("Model cleared!");
        Ok(())
    }

    /// Program a complete model from run results in one batch.
    ///
    /// Returns true when the mount computed a model.
    pub async fn program_batch_model(&self, results: &[ModelRunResult]) -> ModelingResult<bool> {
        let _running = self.start_running()?;
        self.events
            .log(format!("Programming model with {} points", results.len()));
        self.mount.new_alignment().await?;

        for result in results {
            let pier_side = match result.pier_side {
                Some(side) => side,
                None => {
                    self.events
                        .warn(format!("Point {} has no pier side, skipped", result.index));
                    continue;
                }
            };
            let sidereal_time = match protocol::parse_sexagesimal(&result.local_sidereal_time) {
                Ok(hours) => hours,
                Err(e) => {
                    self.events
                        .warn(format!("Point {} skipped: {}", result.index, e));
                    continue;
                }
            };
            let command = protocol::format_batch_point(
                result.ra_jnow,
                result.dec_jnow,
                pier_side,
                result.solved_ra_jnow,
                result.solved_dec_jnow,
                sidereal_time,
            );
            let reply = self.mount.add_alignment_point(&command).await?;
            if reply == "E" {
                self.events
                    .warn(format!("Point {} could not be added", result.index));
            }
        }

        let reply = self.mount.end_alignment().await?;
        let computed = reply == "V";
        if computed {
            self.events.log("Model programmed");
        } else {
            self.events.warn("Model could not be calculated with these points");
        }
        Ok(computed)
    }
}

/// Run directory name from the current UTC time
pub fn run_directory_name() -> String {
    chrono::Utc::now().format("%Y-%m-%d-%H-%M-%S").to_string()
}

/// Analysis file for a run
pub fn results_path(root: &Path, directory: &str, kind: RunKind) -> PathBuf {
    root.join(format!("{}_{}.json", directory, kind.file_suffix()))
}
