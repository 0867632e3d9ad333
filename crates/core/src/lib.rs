//! Two-way battery level sync between devices on the same LAN.
//!
//! Each device samples its own battery, serves the value at `GET /battery`,
//! and polls one peer's endpoint on a fixed schedule. [`SyncController`] owns
//! all of it and publishes a [`SyncSnapshot`] whenever something changes.

pub mod config;
pub mod environment;
pub mod runtime;
pub mod server;
pub mod types;

pub use battsync_link::{BatteryLevel, PeerAddress};
pub use config::SyncCfg;
pub use runtime::{Collaborators, ShutdownGuard, SyncController, SyncError};
pub use types::{ConnectionStatus, FailureReason, ServerStatus, SyncSnapshot};
