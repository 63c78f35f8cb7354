//! Events published by point generation and model runs

use crate::pipeline::{PipelineStage, RunKind};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Progress of a model run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    /// `i of N`
    pub status: String,
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
    /// Estimated remaining time as `MM:SS`
    pub time_left: String,
}

impl RunProgress {
    /// Placeholder shown between runs
    pub fn reset() -> Self {
        Self {
            status: "-- of --".to_string(),
            completed: 0,
            total: 0,
            percent: 0.0,
            time_left: "--:--".to_string(),
        }
    }

    /// Progress after `completed` of `total` points, `elapsed_secs` into the run
    pub fn after_point(completed: usize, total: usize, elapsed_secs: f64) -> Self {
        let total = total.max(1);
        let remaining_points = total.saturating_sub(completed);
        let remaining = if completed > 0 {
            elapsed_secs / completed as f64 * remaining_points as f64
        } else {
            0.0
        };
        let remaining = remaining.max(0.0) as u64;
        Self {
            status: format!("{} of {}", completed, total),
            completed,
            total,
            percent: completed as f64 / total as f64,
            time_left: format!("{:02}:{:02}", remaining / 60, remaining % 60),
        }
    }
}

/// Event emitted by the modeling components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ModelingEvent {
    /// Timestamped log line (`HH:MM:SS`)
    Log { timestamp: String, message: String },
    StageChanged(PipelineStage),
    Progress(RunProgress),
    SettleCountdown { remaining_secs: u64 },
    PointsChanged { base: usize, refinement: usize },
    /// A point was handled; `visible == false` once it is part of the model
    PointProcessed { index: usize, visible: bool },
    RunStarted { run_id: Uuid, kind: RunKind, total: usize },
    RunFinished { run_id: Uuid, kind: RunKind, modeled: usize, cancelled: bool },
}

/// Sending side of the event stream with logging helpers
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<ModelingEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModelingEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ModelingEvent) {
        let _ = self.tx.send(event);
    }

    /// Info log line to tracing and to subscribers
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);
        self.send_log(message);
    }

    /// Warning log line to tracing and to subscribers
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.send_log(message);
    }

    fn send_log(&self, message: String) {
        self.emit(ModelingEvent::Log {
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            message,
        });
    }
}
