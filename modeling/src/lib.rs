//! Alignment Modeling
//!
//! Builds and checks the pointing model of a mount by plate solving images
//! taken at a set of sky positions.
//!
//! ## Features
//!
//! - Point set generation from grids, declination bands, base triangles,
//!   moving object tracks and point files
//! - Horizon masking and pier side sorting
//! - Model run pipeline with slew, settle, capture, solve and sync stages
//! - Cooperative cancellation and retry of interrupted runs
//! - Analysis runs (check, time change, hysteresis) saved as JSON
//! - Batch programming of a model from stored results

pub mod config;
pub mod density;
pub mod dome;
mod error;
pub mod events;
pub mod horizon;
pub mod imaging;
pub mod metadata;
pub mod pipeline;
pub mod points;
pub mod results;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::{CameraSettings, HorizonConfig, HysteresisConfig, ModelingConfig, TimeChangeConfig};
pub use density::{DensityKind, DensityTable, DensityTables};
pub use dome::{Dome, NoDome, SharedDome};
pub use error::{ModelingError, ModelingResult};
pub use events::{EventSink, ModelingEvent, RunProgress};
pub use horizon::HorizonProfile;
pub use imaging::{BackendChooser, ImagingBackend, NoBackend, SharedBackend, SimulatorBackend};
pub use pipeline::{ModelRunPipeline, PipelineStage, RunConfig, RunKind, RunOutcome};
pub use points::{AzAlt, PointSet, PointSetGenerator, PointSetKind, SkyPoint};
pub use results::{load_results, save_results, ModelRunResult};
pub use session::{AlignmentSession, SessionActivity};
