//! Mount command link
//!
//! This module provides the request/reply link to the mount controller:
//! - `MountLink` trait so pollers and the modeling pipeline can share one link
//! - `TcpMountLink` over a tokio `TcpStream`
//! - Connection and reply timeouts
//! - Exponential backoff with jitter for reconnection

use crate::error::{MountError, MountResult};
use crate::protocol::{self, ReplyKind, MOUNT_DEFAULT_PORT};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

/// Request/reply link to the mount
///
/// Implementations must serialize whole request/reply pairs so that
/// concurrent callers never interleave on the wire.
#[async_trait]
pub trait MountLink: Send + Sync {
    /// Send one command (without framing) and return its reply with the
    /// trailing `#` stripped. Commands without a reply return an empty string.
    async fn send_command(&self, command: &str) -> MountResult<String>;

    /// Whether the link currently holds an open connection
    fn is_connected(&self) -> bool;

    /// Re-establish a lost connection
    async fn reconnect(&self) -> MountResult<()> {
        Ok(())
    }
}

/// Shared mount link
pub type SharedMountLink = Arc<dyn MountLink>;

/// Timeout configuration for the mount link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountTimeoutConfig {
    /// Timeout for the initial TCP connection (default: 5 seconds)
    pub connection_timeout_secs: u64,
    /// Timeout waiting for a reply (default: 3000 ms)
    pub reply_timeout_ms: u64,
    /// Fast status poll cadence (default: 200 ms)
    pub fast_poll_ms: u64,
    /// Medium status poll cadence (default: 3000 ms)
    pub medium_poll_ms: u64,
    /// Slow status poll cadence (default: 10000 ms)
    pub slow_poll_ms: u64,
}

impl Default for MountTimeoutConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: 5,
            reply_timeout_ms: 3000,
            fast_poll_ms: 200,
            medium_poll_ms: 3000,
            slow_poll_ms: 10000,
        }
    }
}

impl MountTimeoutConfig {
    /// Get the connection timeout as a Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Get the reply timeout as a Duration
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

/// Reconnection configuration with jitter support
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectionConfig {
    /// Base delay for exponential backoff
    pub base_delay_secs: u64,
    /// Maximum delay cap
    pub max_delay_secs: u64,
    /// Maximum number of reconnection attempts
    pub max_attempts: u32,
    /// Whether to add jitter (randomness) to the delay
    pub use_jitter: bool,
    /// Jitter factor (0.0 to 1.0, default 0.3 = 30% variation)
    pub jitter_factor: f64,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 1,
            max_delay_secs: 30,
            max_attempts: 5,
            use_jitter: true,
            jitter_factor: 0.3,
        }
    }
}

impl ReconnectionConfig {
    /// Calculate delay for a given attempt number with optional jitter
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        // base * 2^(attempt-1), capped
        let base = Duration::from_secs(self.base_delay_secs);
        let max = Duration::from_secs(self.max_delay_secs);

        let exponential_delay = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| base.checked_mul(factor))
            .unwrap_or(max)
            .min(max);

        if self.use_jitter && self.jitter_factor > 0.0 {
            // Range [delay * (1 - jitter/2), delay * (1 + jitter/2)]
            let jitter_range = exponential_delay.as_secs_f64() * self.jitter_factor;
            let random_factor = rand::thread_rng().gen::<f64>() * jitter_range - (jitter_range / 2.0);
            let jittered_secs = (exponential_delay.as_secs_f64() + random_factor).max(0.1);
            Duration::from_secs_f64(jittered_secs.min(max.as_secs_f64()))
        } else {
            exponential_delay
        }
    }
}

/// Connection settings of a mount link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountLinkConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub timeouts: MountTimeoutConfig,
    #[serde(default)]
    pub reconnection: ReconnectionConfig,
}

impl Default for MountLinkConfig {
    fn default() -> Self {
        Self {
            host: "192.168.2.15".to_string(),
            port: MOUNT_DEFAULT_PORT,
            timeouts: MountTimeoutConfig::default(),
            reconnection: ReconnectionConfig::default(),
        }
    }
}

/// TCP link to the mount controller
pub struct TcpMountLink {
    config: MountLinkConfig,
    stream: Mutex<Option<BufReader<TcpStream>>>,
    connected: AtomicBool,
    reconnect_attempts: AtomicU32,
}

impl TcpMountLink {
    /// Create a new, not yet connected link
    pub fn new(host: &str, port: Option<u16>) -> Self {
        Self::with_config(MountLinkConfig {
            host: host.to_string(),
            port: port.unwrap_or(MOUNT_DEFAULT_PORT),
            ..MountLinkConfig::default()
        })
    }

    /// Create a new link with full configuration
    pub fn with_config(config: MountLinkConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            connected: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
        }
    }

    /// Get the link configuration
    pub fn config(&self) -> &MountLinkConfig {
        &self.config
    }

    /// Current reconnection attempt (0 when idle)
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Connect to the mount
    pub async fn connect(&self) -> MountResult<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let connection_timeout = self.config.timeouts.connection_timeout();

        let stream = match timeout(connection_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(MountError::ConnectionFailed(format!(
                    "Failed to connect to mount at {}: {}",
                    addr, e
                )));
            }
            Err(_) => {
                return Err(MountError::ConnectionTimeout {
                    host: self.config.host.clone(),
                    port: self.config.port,
                    duration: connection_timeout,
                });
            }
        };
        stream.set_nodelay(true)?;

        *self.stream.lock().await = Some(BufReader::new(stream));
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("Connected to mount at {}", addr);
        Ok(())
    }

    /// Close the connection
    pub async fn disconnect(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.get_mut().shutdown().await;
        }
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("Disconnected from mount");
    }

    /// Reconnect using exponential backoff with jitter
    pub async fn reconnect_with_backoff(&self) -> MountResult<()> {
        let max_attempts = self.config.reconnection.max_attempts;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            self.reconnect_attempts.store(attempt, Ordering::SeqCst);

            tracing::info!(
                "Reconnection attempt {}/{} to {}:{}",
                attempt,
                max_attempts,
                self.config.host,
                self.config.port
            );

            match self.connect().await {
                Ok(_) => {
                    tracing::info!(
                        "Successfully reconnected to {}:{}",
                        self.config.host,
                        self.config.port
                    );
                    self.reconnect_attempts.store(0, Ordering::SeqCst);
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!("Reconnection attempt {} failed: {}", attempt, last_error);

                    if attempt < max_attempts {
                        let delay = self.config.reconnection.calculate_delay(attempt);
                        tracing::info!("Waiting {:?} before next reconnection attempt", delay);
                        sleep(delay).await;
                    }
                }
            }
        }

        self.reconnect_attempts.store(0, Ordering::SeqCst);
        Err(MountError::ReconnectionFailed {
            attempts: max_attempts,
            last_error,
        })
    }

    async fn exchange(
        stream: &mut BufReader<TcpStream>,
        command: &str,
        reply_timeout: Duration,
    ) -> MountResult<String> {
        stream
            .get_mut()
            .write_all(protocol::frame_command(command).as_bytes())
            .await?;
        stream.get_mut().flush().await?;

        let read = async {
            match protocol::reply_kind(command) {
                ReplyKind::None => Ok::<String, MountError>(String::new()),
                ReplyKind::SingleChar => {
                    let mut byte = [0u8; 1];
                    stream.read_exact(&mut byte).await?;
                    Ok((byte[0] as char).to_string())
                }
                ReplyKind::Terminated => {
                    let mut buf = Vec::new();
                    let n = stream
                        .read_until(protocol::COMMAND_TERMINATOR as u8, &mut buf)
                        .await?;
                    if n == 0 {
                        return Err(MountError::Io("connection closed by mount".to_string()));
                    }
                    let text = String::from_utf8_lossy(&buf);
                    Ok(text
                        .trim_end_matches(protocol::COMMAND_TERMINATOR)
                        .to_string())
                }
            }
        };

        match timeout(reply_timeout, read).await {
            Ok(result) => result,
            Err(_) => Err(MountError::ReplyTimeout {
                command: command.to_string(),
                duration: reply_timeout,
            }),
        }
    }
}

#[async_trait]
impl MountLink for TcpMountLink {
    async fn send_command(&self, command: &str) -> MountResult<String> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(MountError::NotConnected)?;

        let result = Self::exchange(stream, command, self.config.timeouts.reply_timeout()).await;
        match &result {
            Ok(reply) => tracing::trace!("{} -> {}", command, reply),
            Err(e) if e.is_link_lost() => {
                // A half-read reply leaves the stream out of step; drop it
                tracing::warn!("Mount link lost on '{}': {}", command, e);
                *guard = None;
                self.connected.store(false, Ordering::SeqCst);
            }
            Err(e) => tracing::debug!("Command '{}' failed: {}", command, e),
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> MountResult<()> {
        self.reconnect_with_backoff().await
    }
}
