//! Alignment session
//!
//! Owns the point set, the pipeline and the run results. One activity runs
//! at a time: a model run and a point set change never overlap, and the
//! imaging backend cannot be swapped while a run is active.

use crate::config::ModelingConfig;
use crate::density::DensityKind;
use crate::error::{ModelingError, ModelingResult};
use crate::events::EventSink;
use crate::imaging::SharedBackend;
use crate::pipeline::{results_path, run_directory_name, ModelRunPipeline, RunConfig, RunKind, RunOutcome};
use crate::points::{AzAlt, PointSet, PointSetGenerator, PointSetKind, SkyPoint};
use crate::results::{save_results, ModelRunResult};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Minimum number of model stars for refinement runs
const MIN_BASE_STARS: u32 = 3;

/// What the session is busy with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionActivity {
    Idle,
    /// A point set operation
    Generating,
    Running(RunKind),
    /// Sync, batch programming or clearing of the mount model
    MountModel,
}

/// Returns the session to idle when dropped
pub struct ActivityGuard {
    activity: Arc<Mutex<SessionActivity>>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        let mut activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        *activity = SessionActivity::Idle;
    }
}

/// Run points kept for a retry, with the modeled points marked invisible
struct PendingPoints {
    kind: RunKind,
    points: Vec<SkyPoint>,
}

/// Modeling session
pub struct AlignmentSession {
    pipeline: ModelRunPipeline,
    generator: tokio::sync::Mutex<PointSetGenerator>,
    config: RwLock<ModelingConfig>,
    activity: Arc<Mutex<SessionActivity>>,
    model_results: RwLock<Vec<ModelRunResult>>,
    analysis_results: RwLock<Vec<ModelRunResult>>,
    pending: tokio::sync::Mutex<Option<PendingPoints>>,
}

impl AlignmentSession {
    pub fn new(pipeline: ModelRunPipeline, mut generator: PointSetGenerator, config: ModelingConfig) -> Self {
        let (horizon, message) = config.horizon.load_profile();
        if let Some(msg) = message {
            pipeline.events().warn(msg);
        }
        generator.set_horizon(horizon);
        generator.set_density_tables(config.density_tables.clone());

        Self {
            pipeline,
            generator: tokio::sync::Mutex::new(generator),
            config: RwLock::new(config),
            activity: Arc::new(Mutex::new(SessionActivity::Idle)),
            model_results: RwLock::new(Vec::new()),
            analysis_results: RwLock::new(Vec::new()),
            pending: tokio::sync::Mutex::new(None),
        }
    }

    pub fn events(&self) -> &EventSink {
        self.pipeline.events()
    }

    pub fn pipeline(&self) -> &ModelRunPipeline {
        &self.pipeline
    }

    pub fn activity(&self) -> SessionActivity {
        *self.activity.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, next: SessionActivity) -> ModelingResult<ActivityGuard> {
        let mut activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        match *activity {
            SessionActivity::Idle => {
                *activity = next;
                Ok(ActivityGuard {
                    activity: self.activity.clone(),
                })
            }
            SessionActivity::Generating => Err(ModelingError::Busy(
                "point set operation in progress".to_string(),
            )),
            SessionActivity::Running(kind) => Err(ModelingError::Busy(format!(
                "{} model run in progress",
                kind
            ))),
            SessionActivity::MountModel => Err(ModelingError::Busy(
                "mount model operation in progress".to_string(),
            )),
        }
    }

    pub async fn config(&self) -> ModelingConfig {
        self.config.read().await.clone()
    }

    /// Replace the configuration and reload the horizon
    pub async fn update_config(&self, config: ModelingConfig) -> ModelingResult<()> {
        let _guard = self.begin(SessionActivity::Generating)?;
        config.validate()?;
        let (horizon, message) = config.horizon.load_profile();
        if let Some(msg) = message {
            self.events().warn(msg);
        }
        {
            let mut generator = self.generator.lock().await;
            generator.set_horizon(horizon);
            generator.set_density_tables(config.density_tables.clone());
        }
        *self.config.write().await = config;
        Ok(())
    }

    // point set

    pub async fn points(&self) -> PointSet {
        self.generator.lock().await.points().clone()
    }

    /// Run a point set operation under the activity gate
    async fn with_generator<T>(
        &self,
        operation: impl FnOnce(&mut PointSetGenerator, &ModelingConfig) -> T,
    ) -> ModelingResult<T> {
        let _guard = self.begin(SessionActivity::Generating)?;
        let config = self.config.read().await.clone();
        let mut generator = self.generator.lock().await;
        let value = operation(&mut *generator, &config);
        *self.pending.lock().await = None;
        Ok(value)
    }

    pub async fn generate_grid(
        &self,
        rows: usize,
        cols: usize,
        alt_min: f64,
        alt_max: f64,
    ) -> ModelingResult<Vec<SkyPoint>> {
        self.with_generator(|generator, config| {
            generator.generate_grid(
                rows,
                cols,
                alt_min,
                alt_max,
                config.delete_below_horizon,
                config.sort_points,
            )
        })
        .await?
    }

    pub async fn generate_density_band(&self, kind: DensityKind) -> ModelingResult<Vec<SkyPoint>> {
        self.with_generator(|generator, config| {
            generator.generate_density_band(kind, config.delete_below_horizon, config.sort_points)
        })
        .await
    }

    pub async fn generate_base_triangle(
        &self,
        azimuth: f64,
        altitude: f64,
        count: usize,
    ) -> ModelingResult<Vec<SkyPoint>> {
        self.with_generator(|generator, _| generator.generate_base_triangle(azimuth, altitude, count))
            .await?
    }

    pub async fn generate_from_moving_object(
        &self,
        hours_span: f64,
        num_points: usize,
        hours_preview: f64,
        ra_jnow: f64,
        dec_jnow: f64,
    ) -> ModelingResult<Vec<SkyPoint>> {
        self.with_generator(|generator, config| {
            generator.generate_from_moving_object(
                config.delete_below_horizon,
                hours_span,
                num_points,
                hours_preview,
                ra_jnow,
                dec_jnow,
            )
        })
        .await
    }

    /// Import a point file; file problems come back as the message
    pub async fn import_points(
        &self,
        path: &Path,
        kind: PointSetKind,
    ) -> ModelingResult<(Vec<SkyPoint>, Option<String>)> {
        self.with_generator(|generator, config| {
            generator.import_from_file(path, kind, config.delete_below_horizon, config.sort_points)
        })
        .await
    }

    pub async fn sort_points(&self) -> ModelingResult<Vec<SkyPoint>> {
        self.with_generator(|generator, _| generator.sort_refinement()).await
    }

    pub async fn delete_below_horizon(&self) -> ModelingResult<Vec<SkyPoint>> {
        self.with_generator(|generator, _| generator.delete_refinement_below_horizon())
            .await
    }

    pub async fn clear_points(&self) -> ModelingResult<()> {
        self.with_generator(|generator, _| generator.clear_all()).await
    }

    // runs

    /// Run a model under the activity gate
    pub async fn run(&self, kind: RunKind) -> ModelingResult<RunOutcome> {
        let guard = self.begin(SessionActivity::Running(kind))?;
        self.pipeline.cancel_flag().store(false, std::sync::atomic::Ordering::SeqCst);
        let outcome = self.execute(kind).await;
        drop(guard);
        outcome
    }

    /// Start a model run on its own task
    pub fn spawn_run(self: &Arc<Self>, kind: RunKind) -> ModelingResult<JoinHandle<ModelingResult<RunOutcome>>> {
        let guard = self.begin(SessionActivity::Running(kind))?;
        self.pipeline.cancel_flag().store(false, std::sync::atomic::Ordering::SeqCst);
        let session = self.clone();
        Ok(tokio::spawn(async move {
            let outcome = session.execute(kind).await;
            drop(guard);
            outcome
        }))
    }

    pub async fn run_base(&self) -> ModelingResult<RunOutcome> {
        self.run(RunKind::Base).await
    }

    pub async fn run_refinement(&self) -> ModelingResult<RunOutcome> {
        self.run(RunKind::Refinement).await
    }

    pub async fn run_all(&self) -> ModelingResult<RunOutcome> {
        self.run(RunKind::All).await
    }

    pub async fn run_check(&self) -> ModelingResult<RunOutcome> {
        self.run(RunKind::Check).await
    }

    pub async fn run_time_change(&self) -> ModelingResult<RunOutcome> {
        self.run(RunKind::TimeChange).await
    }

    pub async fn run_hysteresis(&self) -> ModelingResult<RunOutcome> {
        self.run(RunKind::Hysteresis).await
    }

    /// Ask the active run to stop at its next checkpoint
    pub fn cancel(&self) {
        if matches!(self.activity(), SessionActivity::Running(_)) {
            self.pipeline.cancel();
        }
    }

    async fn execute(&self, kind: RunKind) -> ModelingResult<RunOutcome> {
        match kind {
            RunKind::Base => self.execute_base().await,
            RunKind::Refinement => self.execute_refinement().await,
            RunKind::All => {
                let mut outcome = self.execute_base().await?;
                if outcome.cancelled {
                    return Ok(outcome);
                }
                let refinement = self.execute_refinement().await?;
                outcome.results.extend(refinement.results);
                outcome.points.extend(refinement.points);
                outcome.modeled += refinement.modeled;
                outcome.cancelled = refinement.cancelled;
                Ok(outcome)
            }
            RunKind::Check => {
                let set = self.points().await;
                let mut points = set.base_points();
                points.extend(PointSet::sky_points(&set.refinement, set.base.len()));
                self.execute_analysis(kind, points).await
            }
            RunKind::TimeChange => {
                let tc = self.config.read().await.time_change.clone();
                let positions = vec![AzAlt::new(tc.azimuth, tc.altitude); tc.runs];
                self.execute_analysis(kind, PointSet::sky_points(&positions, 0))
                    .await
            }
            RunKind::Hysteresis => {
                let points = hysteresis_points(&self.config.read().await.hysteresis);
                self.execute_analysis(kind, points).await
            }
        }
    }

    async fn execute_base(&self) -> ModelingResult<RunOutcome> {
        let config = self.config().await;
        let (points, continued) = self
            .points_for_retry(RunKind::Base, self.points().await.base_points())
            .await;
        // A continued run keeps the stars it already added
        if config.clear_model_first && !continued {
            self.pipeline.clear_alignment_model().await?;
        }

        let directory = run_directory_name();
        let outcome = self
            .pipeline
            .run(RunKind::Base, points, &directory, config.settle_time_secs, &RunConfig::from_config(&config))
            .await?;

        self.remember_points(RunKind::Base, &outcome).await;
        let mut model_results = self.model_results.write().await;
        if !continued {
            model_results.clear();
        }
        model_results.extend(outcome.results.iter().cloned());
        if !model_results.is_empty() {
            self.save(&config, &directory, RunKind::Base, &model_results);
        }
        Ok(outcome)
    }

    async fn execute_refinement(&self) -> ModelingResult<RunOutcome> {
        self.require_base_model().await?;
        let config = self.config().await;

        // Refinement indices follow the points already in the model results
        let first_index = self.model_results.read().await.len();
        let fresh = PointSet::sky_points(&self.points().await.refinement, first_index);
        let (points, _) = self.points_for_retry(RunKind::Refinement, fresh).await;
        let directory = run_directory_name();
        let outcome = self
            .pipeline
            .run(
                RunKind::Refinement,
                points,
                &directory,
                config.settle_time_secs,
                &RunConfig::from_config(&config),
            )
            .await?;

        self.remember_points(RunKind::Refinement, &outcome).await;
        let mut model_results = self.model_results.write().await;
        model_results.extend(outcome.results.iter().cloned());
        if !model_results.is_empty() {
            self.save(&config, &directory, RunKind::Refinement, &model_results);
        }
        Ok(outcome)
    }

    async fn execute_analysis(&self, kind: RunKind, points: Vec<SkyPoint>) -> ModelingResult<RunOutcome> {
        let config = self.config().await;
        let directory = run_directory_name();
        let outcome = self
            .pipeline
            .run(kind, points, &directory, config.settle_time_secs, &RunConfig::from_config(&config))
            .await?;
        if !outcome.results.is_empty() {
            *self.analysis_results.write().await = outcome.results.clone();
            self.save(&config, &directory, kind, &outcome.results);
        }
        Ok(outcome)
    }

    async fn require_base_model(&self) -> ModelingResult<()> {
        let stars = self.pipeline.number_model_stars().await?;
        if stars < MIN_BASE_STARS {
            let message = "Refine stopped, no BASE model available !";
            self.events().warn(message);
            return Err(ModelingError::InvalidInput(message.to_string()));
        }
        Ok(())
    }

    /// The points of an interrupted run of the same kind if some are left,
    /// otherwise `fresh`. True when continuing.
    async fn points_for_retry(&self, kind: RunKind, fresh: Vec<SkyPoint>) -> (Vec<SkyPoint>, bool) {
        let pending = self.pending.lock().await;
        match pending.as_ref() {
            Some(p) if p.kind == kind && p.points.iter().any(|point| point.visible) => {
                let left = p.points.iter().filter(|point| point.visible).count();
                self.events()
                    .log(format!("Continuing {} model with {} points left", kind, left));
                (p.points.clone(), true)
            }
            _ => (fresh, false),
        }
    }

    async fn remember_points(&self, kind: RunKind, outcome: &RunOutcome) {
        let mut pending = self.pending.lock().await;
        *pending = if outcome.points.iter().any(|p| p.visible) {
            Some(PendingPoints {
                kind,
                points: outcome.points.clone(),
            })
        } else {
            None
        };
    }

    fn save(&self, config: &ModelingConfig, directory: &str, kind: RunKind, results: &[ModelRunResult]) {
        let path = results_path(&config.results_root, directory, kind);
        if let Err(e) = save_results(&path, results) {
            self.events()
                .warn(format!("Could not save results to {}: {}", path.display(), e));
        }
    }

    pub async fn model_results(&self) -> Vec<ModelRunResult> {
        self.model_results.read().await.clone()
    }

    pub async fn analysis_results(&self) -> Vec<ModelRunResult> {
        self.analysis_results.read().await.clone()
    }

    // mount model

    pub async fn plate_solve_sync(&self) -> ModelingResult<bool> {
        let _guard = self.begin(SessionActivity::MountModel)?;
        let config = self.config().await;
        self.pipeline.plate_solve_sync(&RunConfig::from_config(&config)).await
    }

    pub async fn clear_alignment_model(&self) -> ModelingResult<()> {
        let _guard = self.begin(SessionActivity::MountModel)?;
        self.pipeline.clear_alignment_model().await
    }

    /// Program the mount with the stored model results
    pub async fn program_batch_model(&self) -> ModelingResult<bool> {
        let _guard = self.begin(SessionActivity::MountModel)?;
        let results = self.model_results().await;
        if results.is_empty() {
            return Err(ModelingError::InvalidInput("no model results to program".to_string()));
        }
        self.pipeline.program_batch_model(&results).await
    }

    // backend

    /// Swap the imaging backend; rejected while the camera may be in use
    pub async fn select_backend(&self, backend: SharedBackend) -> ModelingResult<()> {
        match self.activity() {
            SessionActivity::Running(kind) => {
                return Err(ModelingError::Busy(format!(
                    "cannot change the imaging backend during a {} run",
                    kind
                )))
            }
            SessionActivity::MountModel => {
                return Err(ModelingError::Busy(
                    "cannot change the imaging backend during a mount model operation".to_string(),
                ))
            }
            _ => {}
        }
        self.pipeline.backend().select(backend).await;
        Ok(())
    }

    pub async fn backend_name(&self) -> String {
        self.pipeline.backend().name().await
    }
}

/// Alternating hysteresis positions, solving only at the first
pub fn hysteresis_points(config: &crate::config::HysteresisConfig) -> Vec<SkyPoint> {
    let mut points = Vec::with_capacity(config.runs * 2);
    for _ in 0..config.runs {
        let index = points.len();
        points.push(SkyPoint::new(config.azimuth1, config.altitude1, index));
        let mut slew_only = SkyPoint::new(config.azimuth2, config.altitude2, index + 1);
        slew_only.solve = false;
        points.push(slew_only);
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HysteresisConfig;
    use crate::dome::NoDome;
    use crate::events::ModelingEvent;
    use crate::imaging::{BackendChooser, SimulatorBackend};
    use crate::testing::{FakeMount, ScriptedBackend};
    use skyalign_mount::{shared_telemetry, Mount, SiteTransform};

    struct Harness {
        session: Arc<AlignmentSession>,
        mount: Arc<FakeMount>,
        backend: Arc<ScriptedBackend>,
        dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let mount = FakeMount::new();
        let backend = ScriptedBackend::new();
        let dir = tempfile::tempdir().unwrap();
        let events = EventSink::new();
        let transform = Arc::new(SiteTransform::default());
        let pipeline = ModelRunPipeline::new(
            Mount::new(mount.clone()),
            shared_telemetry(),
            transform.clone(),
            Arc::new(BackendChooser::new(backend.clone())),
            Arc::new(NoDome),
            events.clone(),
        );
        let generator = PointSetGenerator::new(transform, events);
        let config = ModelingConfig {
            image_root: dir.path().join("images"),
            results_root: dir.path().join("analysedata"),
            settle_time_secs: 0,
            delete_below_horizon: false,
            ..Default::default()
        };
        Harness {
            session: Arc::new(AlignmentSession::new(pipeline, generator, config)),
            mount,
            backend,
            dir,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refinement_needs_base_model() {
        let h = harness();
        h.session.generate_grid(2, 2, 30.0, 60.0).await.unwrap();
        let err = h.session.run_refinement().await.unwrap_err();
        assert!(err.to_string().contains("no BASE model"));
        assert_eq!(h.backend.captures(), 0);
        assert_eq!(h.session.activity(), SessionActivity::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_without_model_stars() {
        let h = harness();
        h.session.generate_base_triangle(10.0, 50.0, 3).await.unwrap();
        h.session.generate_grid(2, 2, 30.0, 60.0).await.unwrap();
        assert_eq!(h.mount.star_count(), 0);

        let outcome = h.session.run_check().await.unwrap();
        assert_eq!(outcome.results.len(), 7);
        assert_eq!(h.backend.captures(), 7);
        assert_eq!(h.mount.star_count(), 0);
        assert!(!h.mount.sent().iter().any(|c| c == "CMS"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_continued_run_keeps_model() {
        let h = harness();
        let mut config = h.session.config().await;
        config.clear_model_first = true;
        h.session.update_config(config).await.unwrap();
        h.session.generate_base_triangle(10.0, 50.0, 3).await.unwrap();
        h.backend.cancel_after(1, h.session.pipeline().cancel_flag());

        let first = h.session.run_base().await.unwrap();
        assert!(first.cancelled);
        assert_eq!(h.mount.star_count(), 1);

        h.backend.cancel_after(usize::MAX, h.session.pipeline().cancel_flag());
        let second = h.session.run_base().await.unwrap();
        assert_eq!(second.modeled, 2);
        assert_eq!(h.mount.sent().iter().filter(|c| *c == "delalig").count(), 1);
        assert_eq!(h.mount.star_count(), 3);
        assert_eq!(h.session.model_results().await.len(), 3);

        // A fresh run clears again
        h.session.run_base().await.unwrap();
        assert_eq!(h.mount.sent().iter().filter(|c| *c == "delalig").count(), 2);
        assert_eq!(h.mount.star_count(), 3);
        assert_eq!(h.session.model_results().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_base_then_refinement() {
        let h = harness();
        h.session.generate_base_triangle(10.0, 50.0, 3).await.unwrap();
        h.session.generate_grid(2, 2, 30.0, 60.0).await.unwrap();

        let base = h.session.run_base().await.unwrap();
        assert_eq!(base.modeled, 3);
        let refinement = h.session.run_refinement().await.unwrap();
        assert_eq!(refinement.modeled, 4);
        assert_eq!(h.mount.star_count(), 7);

        let results = h.session.model_results().await;
        assert_eq!(results.len(), 7);
        assert_eq!(
            results.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4, 5, 6]
        );

        let saved: Vec<_> = std::fs::read_dir(h.dir.path().join("analysedata"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(saved.iter().any(|name| name.ends_with("_base.json")));
        assert!(saved.iter().any(|name| name.ends_with("_refinement.json")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_all() {
        let h = harness();
        h.session.generate_base_triangle(10.0, 50.0, 3).await.unwrap();
        h.session.generate_grid(2, 3, 30.0, 60.0).await.unwrap();
        let outcome = h.session.run_all().await.unwrap();
        assert_eq!(outcome.modeled, 9);
        assert_eq!(outcome.results.len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_runs_base_and_refinement_points() {
        let h = harness();
        h.session.generate_base_triangle(10.0, 50.0, 3).await.unwrap();
        h.session.generate_grid(2, 2, 30.0, 60.0).await.unwrap();
        h.session.run_base().await.unwrap();

        let outcome = h.session.run_check().await.unwrap();
        assert_eq!(outcome.results.len(), 7);
        assert_eq!(outcome.modeled, 0);
        assert_eq!(outcome.results[3].index, 3);
        assert_eq!(h.session.analysis_results().await.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_change_and_hysteresis_runs() {
        let h = harness();
        let mut config = h.session.config().await;
        config.time_change.runs = 3;
        config.hysteresis.runs = 2;
        h.session.update_config(config).await.unwrap();

        let outcome = h.session.run_time_change().await.unwrap();
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(h.mount.sent().iter().filter(|c| *c == "MS").count(), 1);

        let outcome = h.session.run_hysteresis().await.unwrap();
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(h.mount.sent().iter().filter(|c| *c == "MS").count(), 5);
    }

    #[test]
    fn test_hysteresis_points_alternate() {
        let points = hysteresis_points(&HysteresisConfig {
            azimuth1: 10.0,
            altitude1: 20.0,
            azimuth2: 200.0,
            altitude2: 50.0,
            runs: 2,
        });
        assert_eq!(points.len(), 4);
        assert!(points[0].solve && points[2].solve);
        assert!(!points[1].solve && !points[3].solve);
        assert_eq!(points[1].azimuth, 200.0);
        assert_eq!(points[3].index, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_skips_modeled_points() {
        let h = harness();
        h.session.generate_base_triangle(10.0, 50.0, 3).await.unwrap();
        h.backend.cancel_after(1, h.session.pipeline().cancel_flag());

        let first = h.session.run_base().await.unwrap();
        assert!(first.cancelled);
        assert_eq!(first.modeled, 1);

        h.backend.cancel_after(usize::MAX, h.session.pipeline().cancel_flag());
        let second = h.session.run_base().await.unwrap();
        assert!(!second.cancelled);
        assert_eq!(second.modeled, 2);
        assert_eq!(h.backend.captures(), 3);
        assert_eq!(h.session.model_results().await.len(), 3);

        // Nothing left, the next run starts over
        let third = h.session.run_base().await.unwrap();
        assert_eq!(third.modeled, 3);
        assert_eq!(h.session.model_results().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_gate() {
        let h = harness();
        let mut config = h.session.config().await;
        config.settle_time_secs = 30;
        h.session.update_config(config).await.unwrap();
        h.session.generate_base_triangle(10.0, 50.0, 3).await.unwrap();

        let mut rx = h.session.events().subscribe();
        let handle = h.session.spawn_run(RunKind::Base).unwrap();
        assert_eq!(h.session.activity(), SessionActivity::Running(RunKind::Base));

        let err = h.session.generate_grid(2, 2, 30.0, 60.0).await.unwrap_err();
        assert!(matches!(err, ModelingError::Busy(_)));
        assert!(h.session.spawn_run(RunKind::Check).is_err());
        let err = h
            .session
            .select_backend(Arc::new(SimulatorBackend::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelingError::Busy(_)));

        loop {
            if let ModelingEvent::SettleCountdown { .. } = rx.recv().await.unwrap() {
                break;
            }
        }
        h.session.cancel();

        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.results.is_empty());
        assert_eq!(h.session.activity(), SessionActivity::Idle);

        h.session
            .select_backend(Arc::new(SimulatorBackend::new()))
            .await
            .unwrap();
        assert_eq!(h.session.backend_name().await, "Simulator");
    }

    #[tokio::test(start_paused = true)]
    async fn test_program_batch_model() {
        let h = harness();
        assert!(h.session.program_batch_model().await.is_err());

        h.session.generate_base_triangle(10.0, 50.0, 3).await.unwrap();
        h.session.run_base().await.unwrap();
        assert!(h.session.program_batch_model().await.unwrap());
        let newalpt = h.mount.sent().iter().filter(|c| c.starts_with("newalpt")).count();
        assert_eq!(newalpt, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_model_first() {
        let h = harness();
        let mut config = h.session.config().await;
        config.clear_model_first = true;
        h.session.update_config(config).await.unwrap();
        h.session.generate_base_triangle(10.0, 50.0, 3).await.unwrap();

        h.session.run_base().await.unwrap();
        let sent = h.mount.sent();
        let clear = sent.iter().position(|c| c == "delalig").unwrap();
        let unpark = sent.iter().position(|c| c == "PO").unwrap();
        assert!(clear < unpark);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_config_rejects_tiny_density_step() {
        let h = harness();
        let mut config = h.session.config().await;
        let dec_step = config.density_tables.normal.dec_step;
        config.density_tables.normal.dec_step = 0.001;
        let err = h.session.update_config(config).await.unwrap_err();
        assert!(matches!(err, ModelingError::InvalidInput(_)));
        assert_eq!(h.session.config().await.density_tables.normal.dec_step, dec_step);
    }
}
