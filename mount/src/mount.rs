//! Mount command wrapper
//!
//! Provides typed mount operations on top of a `MountLink`.

use crate::client::SharedMountLink;
use crate::error::{MountError, MountResult};
use crate::protocol::{self, commands, GinfoStatus};

/// Typed command surface of the mount
#[derive(Clone)]
pub struct Mount {
    link: SharedMountLink,
}

impl Mount {
    /// Create a new mount wrapper
    pub fn new(link: SharedMountLink) -> Self {
        Self { link }
    }

    /// Underlying link
    pub fn link(&self) -> &SharedMountLink {
        &self.link
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Send a raw command and return its reply
    pub async fn query(&self, command: &str) -> MountResult<String> {
        self.link.send_command(command).await
    }

    /// Read the combined status record
    pub async fn read_status(&self) -> MountResult<GinfoStatus> {
        let reply = self.query(commands::GET_STATUS).await?;
        protocol::parse_ginfo(&reply)
    }

    /// Check if the mount is slewing
    pub async fn is_slewing(&self) -> MountResult<bool> {
        Ok(self.read_status().await?.slewing)
    }

    /// Local sidereal time as reported (`HH:MM:SS.ss`)
    pub async fn sidereal_time(&self) -> MountResult<String> {
        self.query(commands::GET_SIDEREAL_TIME).await
    }

    /// Unpark the mount
    pub async fn unpark(&self) -> MountResult<()> {
        self.query(commands::UNPARK).await.map(|_| ())
    }

    /// Switch tracking on
    pub async fn start_tracking(&self) -> MountResult<()> {
        self.query(commands::TRACKING_ON).await.map(|_| ())
    }

    /// Switch tracking off
    pub async fn stop_tracking(&self) -> MountResult<()> {
        self.query(commands::TRACKING_OFF).await.map(|_| ())
    }

    /// Set a horizontal target and start the slew
    pub async fn slew_to_az_alt(&self, azimuth: f64, altitude: f64) -> MountResult<()> {
        tracing::info!("Slewing mount to Az: {:.2}°, Alt: {:.2}°", azimuth, altitude);

        for command in [
            protocol::format_azimuth_target(azimuth),
            protocol::format_altitude_target(altitude),
        ] {
            let reply = self.query(&command).await?;
            if reply != "1" {
                return Err(MountError::MalformedReply {
                    command,
                    reply,
                    reason: "target rejected".to_string(),
                });
            }
        }

        let reply = self.query(commands::SLEW_TO_TARGET).await?;
        if reply != "0" {
            return Err(MountError::MalformedReply {
                command: commands::SLEW_TO_TARGET.to_string(),
                reply,
                reason: "slew not possible".to_string(),
            });
        }
        Ok(())
    }

    /// Load equatorial target coordinates of date (RA hours, Dec degrees)
    pub async fn set_target_ra_dec(&self, ra_hours: f64, dec_degrees: f64) -> MountResult<()> {
        for command in [
            protocol::format_ra_target(ra_hours),
            protocol::format_dec_target(dec_degrees),
        ] {
            let reply = self.query(&command).await?;
            if reply != "1" {
                tracing::warn!("Mount rejected '{}' with '{}'", command, reply);
            }
        }
        Ok(())
    }

    /// Number of stars in the active alignment model
    pub async fn number_model_stars(&self) -> MountResult<u32> {
        let reply = self.query(commands::GET_MODEL_STAR_COUNT).await?;
        reply
            .trim()
            .parse::<u32>()
            .map_err(|e| MountError::MalformedReply {
                command: commands::GET_MODEL_STAR_COUNT.to_string(),
                reply: reply.clone(),
                reason: e.to_string(),
            })
    }

    /// Add the loaded target as a refinement star, returns the raw reply
    pub async fn sync_refine(&self) -> MountResult<String> {
        self.query(commands::SYNC_REFINE).await
    }

    /// Plain sync on the loaded target, returns the raw reply
    pub async fn sync_plain(&self) -> MountResult<String> {
        self.query(commands::SYNC_CONFIG_PLAIN).await?;
        self.query(commands::SYNC).await
    }

    /// Delete the active alignment model
    pub async fn clear_model(&self) -> MountResult<String> {
        self.query(commands::CLEAR_MODEL).await
    }

    /// Open a batch alignment
    pub async fn new_alignment(&self) -> MountResult<String> {
        self.query(commands::NEW_ALIGNMENT).await
    }

    /// Add one batch point, `E` means rejected
    pub async fn add_alignment_point(&self, point_command: &str) -> MountResult<String> {
        self.query(point_command).await
    }

    /// Close the batch alignment, `V` means the model was computed
    pub async fn end_alignment(&self) -> MountResult<String> {
        self.query(commands::END_ALIGNMENT).await
    }

    /// Push refraction inputs; returns false when they are out of range
    pub async fn set_refraction(&self, temperature_c: f64, pressure_hpa: f64) -> MountResult<bool> {
        if !protocol::refraction_in_range(temperature_c, pressure_hpa) {
            tracing::debug!(
                "Refraction data out of range: {:.1}°C, {:.1} hPa",
                temperature_c,
                pressure_hpa
            );
            return Ok(false);
        }
        self.query(&protocol::format_refraction_pressure(pressure_hpa))
            .await?;
        self.query(&protocol::format_refraction_temperature(temperature_c))
            .await?;
        Ok(true)
    }
}
