//! Mount link error types
//!
//! Provides structured error types for the mount command link.

use std::fmt;
use std::time::Duration;

/// Mount link errors
#[derive(Debug, Clone)]
pub enum MountError {
    /// Connection to the mount failed
    ConnectionFailed(String),
    /// Connection timeout with context
    ConnectionTimeout {
        host: String,
        port: u16,
        duration: Duration,
    },
    /// The mount did not answer a command in time
    ReplyTimeout { command: String, duration: Duration },
    /// Not connected to the mount
    NotConnected,
    /// Reply did not match the grammar of the command
    MalformedReply {
        command: String,
        reply: String,
        reason: String,
    },
    /// Socket read/write failure
    Io(String),
    /// Reconnection failed after max attempts
    ReconnectionFailed { attempts: u32, last_error: String },
}

impl std::error::Error for MountError {}

impl fmt::Display for MountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            MountError::ConnectionTimeout { host, port, duration } => {
                write!(
                    f,
                    "Connection timeout: failed to connect to {}:{} after {:?}",
                    host, port, duration
                )
            }
            MountError::ReplyTimeout { command, duration } => {
                write!(f, "No reply to command '{}' after {:?}", command, duration)
            }
            MountError::NotConnected => write!(f, "Not connected to mount"),
            MountError::MalformedReply {
                command,
                reply,
                reason,
            } => {
                write!(
                    f,
                    "Malformed reply to '{}': '{}' ({})",
                    command, reply, reason
                )
            }
            MountError::Io(msg) => write!(f, "I/O error: {}", msg),
            MountError::ReconnectionFailed {
                attempts,
                last_error,
            } => {
                write!(
                    f,
                    "Reconnection failed after {} attempts: {}",
                    attempts, last_error
                )
            }
        }
    }
}

impl From<std::io::Error> for MountError {
    fn from(err: std::io::Error) -> Self {
        MountError::Io(err.to_string())
    }
}

impl From<MountError> for String {
    fn from(err: MountError) -> String {
        err.to_string()
    }
}

/// Result type for mount operations
pub type MountResult<T> = Result<T, MountError>;

impl MountError {
    /// True for failures that mean the socket is gone and a reconnect is needed
    pub fn is_link_lost(&self) -> bool {
        matches!(
            self,
            MountError::NotConnected | MountError::Io(_) | MountError::ReplyTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MountError::ConnectionFailed("connection refused".to_string());
        assert_eq!(err.to_string(), "Connection failed: connection refused");

        let err = MountError::MalformedReply {
            command: "Ginfo".to_string(),
            reply: "1,2,3".to_string(),
            reason: "expected 8 fields, got 3".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Ginfo"));
        assert!(msg.contains("1,2,3"));
        assert!(msg.contains("expected 8 fields"));
    }

    #[test]
    fn test_error_to_string_conversion() {
        let err = MountError::NotConnected;
        let s: String = err.into();
        assert_eq!(s, "Not connected to mount");
    }

    #[test]
    fn test_connection_timeout_display() {
        let err = MountError::ConnectionTimeout {
            host: "192.168.2.15".to_string(),
            port: 3490,
            duration: Duration::from_secs(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("192.168.2.15"));
        assert!(msg.contains("3490"));
        assert!(msg.contains("5"));
    }

    #[test]
    fn test_reply_timeout_display() {
        let err = MountError::ReplyTimeout {
            command: "GS".to_string(),
            duration: Duration::from_secs(3),
        };
        let msg = err.to_string();
        assert!(msg.contains("GS"));
        assert!(msg.contains("3s"));
    }

    #[test]
    fn test_link_lost_classification() {
        assert!(MountError::NotConnected.is_link_lost());
        assert!(MountError::Io("broken pipe".to_string()).is_link_lost());
        assert!(!MountError::MalformedReply {
            command: "GS".to_string(),
            reply: String::new(),
            reason: "empty".to_string(),
        }
        .is_link_lost());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: MountError = io.into();
        assert!(matches!(err, MountError::Io(ref m) if m.contains("pipe closed")));
    }
}
