//! Mount status poller
//!
//! Refreshes the shared telemetry on three cadences. Fast: sidereal time and
//! `Ginfo`. Medium: slew rate, flip timing and optional refraction update.
//! Slow: environment, limits and UTC data. Site and firmware are read once
//! per connection.

use crate::error::MountResult;
use crate::mount::Mount;
use crate::protocol::{self, commands, UTC_DATA_MIN_FIRMWARE};
use crate::telemetry::{FirmwareInfo, SharedTelemetry, SiteInfo};
use crate::transform::SharedTransform;
use crate::MountTimeoutConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// When refraction data is pushed to the mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RefractionUpdate {
    #[default]
    Off,
    /// Only while the mount is not tracking
    WhenNotTracking,
    /// On every medium cadence
    Always,
}

/// Weather reading used for the refraction update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    pub temperature_c: f64,
    pub pressure_hpa: f64,
}

/// Latest weather reading, written by an environment source
pub type SharedEnvironment = Arc<RwLock<Option<EnvironmentReading>>>;

/// Poll cadences
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub fast: Duration,
    pub medium: Duration,
    pub slow: Duration,
    pub refraction: RefractionUpdate,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::from_timeouts(&MountTimeoutConfig::default())
    }
}

impl PollerConfig {
    pub fn from_timeouts(timeouts: &MountTimeoutConfig) -> Self {
        Self {
            fast: Duration::from_millis(timeouts.fast_poll_ms),
            medium: Duration::from_millis(timeouts.medium_poll_ms),
            slow: Duration::from_millis(timeouts.slow_poll_ms),
            refraction: RefractionUpdate::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cadence {
    Fast,
    Medium,
    Slow,
}

/// Periodic status reader, sole writer of the shared telemetry
pub struct StatusPoller {
    mount: Mount,
    telemetry: SharedTelemetry,
    transform: SharedTransform,
    config: PollerConfig,
    environment: Option<SharedEnvironment>,
}

/// Handle to a running poller task
pub struct PollerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop the poller and wait for it to finish
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!("Status poller ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl StatusPoller {
    pub fn new(
        mount: Mount,
        telemetry: SharedTelemetry,
        transform: SharedTransform,
        config: PollerConfig,
    ) -> Self {
        Self {
            mount,
            telemetry,
            transform,
            config,
            environment: None,
        }
    }

    /// Attach a weather source for refraction updates
    pub fn with_environment(mut self, environment: SharedEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn telemetry(&self) -> SharedTelemetry {
        self.telemetry.clone()
    }

    /// Start polling on a background task
    pub fn spawn(self) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut fast = tokio::time::interval(self.config.fast);
            let mut medium = tokio::time::interval(self.config.medium);
            let mut slow = tokio::time::interval(self.config.slow);
            for interval in [&mut fast, &mut medium, &mut slow] {
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            }

            if let Err(e) = self.poll_once().await {
                tracing::warn!("Initial site/firmware poll failed: {}", e);
            }

            tracing::info!("Status poller started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = fast.tick() => self.run_cadence(Cadence::Fast).await,
                    _ = medium.tick() => self.run_cadence(Cadence::Medium).await,
                    _ = slow.tick() => self.run_cadence(Cadence::Slow).await,
                }
            }
            tracing::info!("Status poller stopped");
        });

        PollerHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }

    async fn run_cadence(&self, cadence: Cadence) {
        if !self.mount.is_connected() {
            if cadence != Cadence::Slow {
                return;
            }
            match self.mount.link().reconnect().await {
                Ok(()) => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!("Site/firmware poll after reconnect failed: {}", e);
                    }
                }
                Err(e) => {
                    tracing::warn!("Mount reconnect failed: {}", e);
                    return;
                }
            }
        }

        let result = match cadence {
            Cadence::Fast => self.poll_fast().await,
            Cadence::Medium => self.poll_medium().await,
            Cadence::Slow => self.poll_slow().await,
        };
        if let Err(e) = result {
            tracing::warn!("{:?} status poll failed: {}", cadence, e);
        }
    }

    /// Site and firmware, read once per connection
    pub async fn poll_once(&self) -> MountResult<()> {
        self.mount.query(commands::SET_ULTRA_PRECISION).await?;

        let elevation = self.mount.query(commands::GET_SITE_ELEVATION).await?;
        let longitude = self.mount.query(commands::GET_SITE_LONGITUDE).await?;
        let latitude = self.mount.query(commands::GET_SITE_LATITUDE).await?;
        let date = self.mount.query(commands::GET_FIRMWARE_DATE).await?;
        let number_string = self.mount.query(commands::GET_FIRMWARE_NUMBER).await?;
        let product_name = self.mount.query(commands::GET_PRODUCT_NAME).await?;
        let time = self.mount.query(commands::GET_FIRMWARE_TIME).await?;
        let hardware_version = self.mount.query(commands::GET_HARDWARE_VERSION).await?;

        // The mount reports longitude west positive
        let site = SiteInfo {
            elevation: elevation.trim().parse().ok(),
            longitude: protocol::parse_sexagesimal(&longitude).ok().map(|v| -v),
            latitude: protocol::parse_sexagesimal(&latitude).ok(),
        };
        let number = protocol::parse_firmware_number(&number_string).unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            0
        });
        let firmware = FirmwareInfo {
            product_name,
            number_string,
            number,
            date,
            time,
            hardware_version,
        };

        if let (Some(lat), Some(lon)) = (site.latitude, site.longitude) {
            self.transform.update_site(lat, lon);
        }
        tracing::info!(
            "Mount {} firmware {} ({})",
            firmware.product_name,
            firmware.number_string,
            firmware.number
        );

        let mut telemetry = self.telemetry.write().await;
        telemetry.site = site;
        telemetry.firmware = firmware;
        Ok(())
    }

    /// Sidereal time and status
    pub async fn poll_fast(&self) -> MountResult<()> {
        let lst = self.mount.sidereal_time().await?;
        let status = self.mount.read_status().await?;

        let lst_hours = protocol::parse_sexagesimal(&lst).ok();
        if let Some(hours) = lst_hours {
            self.transform.update_sidereal_time(hours);
        }
        let (ra_j2000, dec_j2000) = self.transform.jnow_to_j2000(status.ra_jnow, status.dec_jnow);

        let mut telemetry = self.telemetry.write().await;
        telemetry.local_sidereal_time = Some(lst);
        telemetry.local_sidereal_time_hours = lst_hours;
        telemetry.ra_j2000 = Some(ra_j2000);
        telemetry.dec_j2000 = Some(dec_j2000);
        telemetry.status = Some(status);
        Ok(())
    }

    /// Slew rate, flip timing and refraction
    pub async fn poll_medium(&self) -> MountResult<()> {
        self.update_refraction().await?;

        let slew_rate = self.mount.query(commands::GET_SLEW_RATE).await?;
        let time_to_flip = self.int_query(commands::GET_TIME_TO_FLIP).await?;
        let limit_track = self.int_query(commands::GET_MERIDIAN_LIMIT_TRACK).await?;
        let limit_slew = self.int_query(commands::GET_MERIDIAN_LIMIT_SLEW).await?;

        // Limit in degrees, 4 minutes of time per degree
        let time_to_meridian = time_to_flip - limit_track * 4;

        let mut telemetry = self.telemetry.write().await;
        telemetry.slew_rate = Some(slew_rate);
        telemetry.time_to_flip = Some(time_to_flip);
        telemetry.meridian_limit_track = Some(limit_track);
        telemetry.meridian_limit_slew = Some(limit_slew);
        telemetry.time_to_meridian = Some(time_to_meridian);
        Ok(())
    }

    /// Environment, limits and UTC data
    pub async fn poll_slow(&self) -> MountResult<()> {
        let time_to_flip = self.int_query(commands::GET_TIME_TO_FLIP).await?;
        let refraction_temperature = self.float_query(commands::GET_REFRACTION_TEMPERATURE).await?;
        let refraction_pressure = self.float_query(commands::GET_REFRACTION_PRESSURE).await?;
        let telescope_temperature = self.float_query(commands::GET_TELESCOPE_TEMPERATURE).await?;
        let refraction_enabled = self.flag_query(commands::GET_REFRACTION_STATUS).await?;
        let unattended_flip = self.flag_query(commands::GET_UNATTENDED_FLIP).await?;
        let limit_track = self.int_query(commands::GET_MERIDIAN_LIMIT_TRACK).await?;
        let limit_slew = self.int_query(commands::GET_MERIDIAN_LIMIT_SLEW).await?;
        let dual_axis_tracking = self.flag_query(commands::GET_DUAL_AXIS_TRACKING).await?;
        let horizon_high = self.int_query(commands::GET_HORIZON_LIMIT_HIGH).await?;
        let horizon_low = self.int_query(commands::GET_HORIZON_LIMIT_LOW).await?;

        let firmware_number = self.telemetry.read().await.firmware.number;
        let utc_data = if firmware_number >= UTC_DATA_MIN_FIRMWARE {
            let reply = self.mount.query(commands::GET_UTC_DATA).await?;
            let mut parts = reply.splitn(2, ',');
            let valid = parts.next().map(|s| s.trim().to_string());
            let expiration = parts.next().map(|s| s.trim().to_string());
            Some((valid, expiration))
        } else {
            None
        };

        let mut telemetry = self.telemetry.write().await;
        telemetry.time_to_flip = Some(time_to_flip);
        telemetry.refraction_temperature = Some(refraction_temperature);
        telemetry.refraction_pressure = Some(refraction_pressure);
        telemetry.telescope_temperature = Some(telescope_temperature);
        telemetry.refraction_enabled = Some(refraction_enabled);
        telemetry.unattended_flip = Some(unattended_flip);
        telemetry.meridian_limit_track = Some(limit_track);
        telemetry.meridian_limit_slew = Some(limit_slew);
        telemetry.dual_axis_tracking = Some(dual_axis_tracking);
        telemetry.horizon_limit_high = Some(horizon_high);
        telemetry.horizon_limit_low = Some(horizon_low);
        if let Some((valid, expiration)) = utc_data {
            telemetry.utc_data_valid = valid;
            telemetry.utc_data_expiration = expiration;
        }
        Ok(())
    }

    async fn update_refraction(&self) -> MountResult<()> {
        let wanted = match self.config.refraction {
            RefractionUpdate::Off => false,
            RefractionUpdate::Always => true,
            RefractionUpdate::WhenNotTracking => {
                let telemetry = self.telemetry.read().await;
                telemetry.status.is_some() && !telemetry.is_tracking()
            }
        };
        if !wanted {
            return Ok(());
        }

        let reading = match &self.environment {
            Some(env) => *env.read().await,
            None => None,
        };
        let Some(reading) = reading else {
            return Ok(());
        };

        if !self
            .mount
            .set_refraction(reading.temperature_c, reading.pressure_hpa)
            .await?
        {
            tracing::warn!(
                "Refraction parameters out of range: temperature {:.1}, pressure {:.1}",
                reading.temperature_c,
                reading.pressure_hpa
            );
            return Ok(());
        }

        let temperature = self.float_query(commands::GET_REFRACTION_TEMPERATURE).await?;
        let pressure = self.float_query(commands::GET_REFRACTION_PRESSURE).await?;
        let mut telemetry = self.telemetry.write().await;
        telemetry.refraction_temperature = Some(temperature);
        telemetry.refraction_pressure = Some(pressure);
        Ok(())
    }

    async fn int_query(&self, command: &str) -> MountResult<i32> {
        let reply = self.mount.query(command).await?;
        // Some firmware answers with a decimal value
        protocol::parse_int_reply(command, &reply)
            .or_else(|_| protocol::parse_float_reply(command, &reply).map(|v| v as i32))
    }

    async fn float_query(&self, command: &str) -> MountResult<f64> {
        let reply = self.mount.query(command).await?;
        protocol::parse_float_reply(command, &reply)
    }

    async fn flag_query(&self, command: &str) -> MountResult<bool> {
        Ok(self.mount.query(command).await?.trim() == "1")
    }
}
