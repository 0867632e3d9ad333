use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use battsync_link::{DEFAULT_FETCH_TIMEOUT, DEFAULT_PORT};

/// Battsync runtime parameters. Defaults are the protocol constants; only
/// tests and embedders change them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCfg {
    // sockets
    pub bind_host: IpAddr,
    pub server_port: u16,
    pub peer_port: u16,

    // schedules (ms)
    pub sample_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub fetch_timeout_ms: u64,

    // teardown
    pub shutdown_grace_ms: u64,

    // controller queue depth
    pub command_buffer: usize,
}

impl Default for SyncCfg {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            server_port: DEFAULT_PORT,
            peer_port: DEFAULT_PORT,
            sample_interval_ms: 5000,
            poll_interval_ms: 5000,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT.as_millis() as u64,
            shutdown_grace_ms: 500,
            command_buffer: 64,
        }
    }
}

impl SyncCfg {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.server_port)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
