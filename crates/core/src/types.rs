use std::fmt;
use std::net::{IpAddr, SocketAddr};

use battsync_link::{BatteryLevel, FetchError, PeerAddress};
use chrono::{DateTime, Utc};
use serde::Serialize;

// ── Connection status ───────────────────────────────────────────

/// Why the last poll of the peer failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Peer answered with something other than 200.
    HttpStatus(u16),
    /// DNS, refused connection, reset, ...
    Transport(String),
}

/// Remote side of the sync, one value at a time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    TimedOut,
    Failed(FailureReason),
    InvalidResponse,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl From<&FetchError> for ConnectionStatus {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::Timeout(_) => Self::TimedOut,
            FetchError::HttpStatus(code) => Self::Failed(FailureReason::HttpStatus(*code)),
            FetchError::MalformedResponse(_) => Self::InvalidResponse,
            FetchError::Transport(msg) => Self::Failed(FailureReason::Transport(msg.clone())),
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Failed(FailureReason::HttpStatus(code)) => write!(f, "failed: HTTP {code}"),
            Self::Failed(FailureReason::Transport(msg)) => write!(f, "failed: {msg}"),
            Self::InvalidResponse => f.write_str("invalid response"),
        }
    }
}

// ── Server status ───────────────────────────────────────────────

/// Outcome of binding the local `/battery` server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ServerStatus {
    #[default]
    Starting,
    Listening(SocketAddr),
    Unavailable(String),
    Stopped,
}

impl ServerStatus {
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Listening(addr) => Some(*addr),
            _ => None,
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("starting"),
            Self::Listening(addr) => write!(f, "listening on port {}", addr.port()),
            Self::Unavailable(reason) => write!(f, "unavailable: {reason}"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

// ── Snapshot ────────────────────────────────────────────────────

/// Everything a presentation layer renders. Published on every change.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SyncSnapshot {
    pub local_level: BatteryLevel,
    pub remote_level: BatteryLevel,
    pub status: ConnectionStatus,
    /// Peer of the active session, `None` while idle.
    pub peer: Option<PeerAddress>,
    /// This device's LAN address, `None` when it could not be determined.
    pub local_address: Option<IpAddr>,
    pub server: ServerStatus,
    /// When `remote_level` was last confirmed by a successful poll.
    pub remote_updated_at: Option<DateTime<Utc>>,
}

impl SyncSnapshot {
    /// Local address for display.
    pub fn local_address_label(&self) -> String {
        self.local_address
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fetch_errors_map_to_status() {
        assert_eq!(
            ConnectionStatus::from(&FetchError::Timeout(Duration::from_secs(3))),
            ConnectionStatus::TimedOut
        );
        assert_eq!(
            ConnectionStatus::from(&FetchError::HttpStatus(404)),
            ConnectionStatus::Failed(FailureReason::HttpStatus(404))
        );
        assert_eq!(
            ConnectionStatus::from(&FetchError::MalformedResponse("x".into())),
            ConnectionStatus::InvalidResponse
        );
        assert!(matches!(
            ConnectionStatus::from(&FetchError::Transport("refused".into())),
            ConnectionStatus::Failed(FailureReason::Transport(_))
        ));
    }

    #[test]
    fn status_display_for_presentation() {
        assert_eq!(ConnectionStatus::Idle.to_string(), "idle");
        assert_eq!(
            ConnectionStatus::Failed(FailureReason::HttpStatus(503)).to_string(),
            "failed: HTTP 503"
        );
        let addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert_eq!(ServerStatus::Listening(addr).to_string(), "listening on port 8080");
    }

    #[test]
    fn default_snapshot_uses_sentinel() {
        let snap = SyncSnapshot::default();
        assert!(snap.local_level.is_unknown());
        assert!(snap.remote_level.is_unknown());
        assert_eq!(snap.status, ConnectionStatus::Idle);
        assert_eq!(snap.local_address_label(), "unknown");
    }
}
