//! Peer-facing pieces of battsync: the battery level wire type, peer
//! addresses, and clients that poll a peer's `/battery` endpoint.

use std::time::Duration;

pub mod http;
pub mod level;
pub mod peer;
pub mod provider;

pub use http::HttpStatusClient;
pub use level::{BatteryLevel, ParseLevelError};
pub use peer::{PeerAddress, PeerAddressError};
pub use provider::{FetchError, FetchFuture, MockSource, StatusSource};

/// Route served by every device and polled on its peer.
pub const BATTERY_PATH: &str = "/battery";
/// Port used for both serving and polling.
pub const DEFAULT_PORT: u16 = 8080;
/// Hard bound on one remote fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(3);
