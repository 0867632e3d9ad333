use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::level::BatteryLevel;
use crate::peer::PeerAddress;

/// Why a single poll of a peer produced no level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("peer answered HTTP {0}")]
    HttpStatus(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Boxed future returned by [`StatusSource::fetch`].
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<BatteryLevel, FetchError>> + Send + 'a>>;

/// Anything that can report a peer's battery level (HTTP, mock, ...).
pub trait StatusSource: Send + Sync {
    fn name(&self) -> &str;

    fn fetch<'a>(&'a self, peer: &'a PeerAddress) -> FetchFuture<'a>;
}

#[derive(Debug, Clone)]
struct Scripted {
    outcome: Result<BatteryLevel, FetchError>,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct MockState {
    scripts: HashMap<String, Scripted>,
    calls: HashMap<String, usize>,
}

/// Mock source for testing. Outcomes are scripted per peer host and every
/// fetch is counted. Unscripted peers fail with a transport error.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<MockState>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every fetch of `host` with `outcome`.
    pub fn respond(&self, host: &str, outcome: Result<BatteryLevel, FetchError>) {
        self.lock()
            .scripts
            .insert(host.to_owned(), Scripted { outcome, delay: None });
    }

    /// Like [`respond`](Self::respond) but each fetch first waits `delay`.
    pub fn respond_after(
        &self,
        host: &str,
        delay: Duration,
        outcome: Result<BatteryLevel, FetchError>,
    ) {
        self.lock().scripts.insert(
            host.to_owned(),
            Scripted { outcome, delay: Some(delay) },
        );
    }

    /// Number of fetches issued against `host` so far.
    pub fn calls(&self, host: &str) -> usize {
        self.lock().calls.get(host).copied().unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StatusSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch<'a>(&'a self, peer: &'a PeerAddress) -> FetchFuture<'a> {
        let scripted = {
            let mut state = self.lock();
            *state.calls.entry(peer.host().to_owned()).or_insert(0) += 1;
            state.scripts.get(peer.host()).cloned()
        };
        Box::pin(async move {
            let Some(scripted) = scripted else {
                return Err(FetchError::Transport(format!("no route to {peer}")));
            };
            if let Some(delay) = scripted.delay {
                tokio::time::sleep(delay).await;
            }
            scripted.outcome
        })
    }
}
