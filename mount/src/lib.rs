//! Mount Command Link
//!
//! Implements the text command protocol of the mount controller.
//!
//! ## Features
//!
//! - Request/reply link over TCP with per-command reply grammars
//! - Typed command wrapper for slewing, syncing and model management
//! - Shared telemetry refreshed by a three-cadence status poller
//! - Exponential backoff with jitter for reconnection
//! - Coordinate transform seam for epoch and horizontal conversion

mod client;
mod error;
mod mount;
pub mod poller;
pub mod protocol;
pub mod telemetry;
pub mod transform;

#[cfg(test)]
mod testing;

pub use client::*;
pub use error::{MountError, MountResult};
pub use mount::Mount;
pub use poller::{
    EnvironmentReading, PollerConfig, PollerHandle, RefractionUpdate, SharedEnvironment,
    StatusPoller,
};
pub use protocol::{GinfoStatus, PierSide, ReplyKind, MOUNT_DEFAULT_PORT};
pub use telemetry::{shared_telemetry, FirmwareInfo, MountTelemetry, SharedTelemetry, SiteInfo};
pub use transform::{CoordinateTransform, SharedTransform, SiteTransform};
