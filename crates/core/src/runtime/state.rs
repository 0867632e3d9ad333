use std::net::IpAddr;

use battsync_link::{BatteryLevel, FetchError, PeerAddress};
use chrono::{DateTime, Utc};

use crate::types::{ConnectionStatus, ServerStatus, SyncSnapshot};

/// Observable sync state plus the generation of the active session.
///
/// Every transition returns whether the snapshot changed so the owner only
/// republishes real changes.
#[derive(Debug, Default)]
pub struct SyncState {
    snapshot: SyncSnapshot,
    /// Bumped on every session start and stop. Results tagged with an older
    /// generation belong to a cancelled session and are discarded.
    generation: u64,
    active: bool,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &SyncSnapshot {
        &self.snapshot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_local_address(&mut self, addr: Option<IpAddr>) -> bool {
        replace(&mut self.snapshot.local_address, addr)
    }

    pub fn set_server(&mut self, server: ServerStatus) -> bool {
        replace(&mut self.snapshot.server, server)
    }

    pub fn record_local(&mut self, level: BatteryLevel) -> bool {
        replace(&mut self.snapshot.local_level, level)
    }

    /// Start a session against `peer`, superseding any previous one.
    /// Returns the new session's generation.
    pub fn begin_session(&mut self, peer: PeerAddress) -> u64 {
        self.generation += 1;
        self.active = true;
        self.snapshot.peer = Some(peer);
        self.snapshot.status = ConnectionStatus::Connecting;
        self.generation
    }

    /// Back to Idle. The last remote reading stays visible.
    pub fn end_session(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.generation += 1;
        self.active = false;
        self.snapshot.peer = None;
        self.snapshot.status = ConnectionStatus::Idle;
        true
    }

    /// Apply one fetch outcome. Returns `false` when the outcome is stale.
    pub fn apply_fetch(
        &mut self,
        generation: u64,
        outcome: &Result<BatteryLevel, FetchError>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.active || generation != self.generation {
            return false;
        }
        match outcome {
            Ok(level) => {
                self.snapshot.remote_level = *level;
                self.snapshot.remote_updated_at = Some(now);
                self.snapshot.status = ConnectionStatus::Connected;
            }
            Err(err) => {
                self.snapshot.status = ConnectionStatus::from(err);
            }
        }
        true
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureReason;
    use std::time::Duration;

    fn peer(host: &str) -> PeerAddress {
        PeerAddress::parse(host).unwrap()
    }

    fn level(pct: u8) -> BatteryLevel {
        BatteryLevel::new(pct).unwrap()
    }

    fn connected_at(pct: u8) -> (SyncState, u64) {
        let mut state = SyncState::new();
        let generation = state.begin_session(peer("10.0.0.2"));
        assert!(state.apply_fetch(generation, &Ok(level(pct)), Utc::now()));
        (state, generation)
    }

    #[test]
    fn starts_idle_with_sentinels() {
        let state = SyncState::new();
        assert_eq!(state.snapshot().status, ConnectionStatus::Idle);
        assert!(state.snapshot().remote_level.is_unknown());
        assert!(state.snapshot().peer.is_none());
    }

    #[test]
    fn begin_session_enters_connecting() {
        let mut state = SyncState::new();
        let generation = state.begin_session(peer("10.0.0.2"));
        assert_eq!(generation, 1);
        assert_eq!(state.snapshot().status, ConnectionStatus::Connecting);
        assert_eq!(state.snapshot().peer, Some(peer("10.0.0.2")));
    }

    #[test]
    fn success_sets_level_and_connected() {
        let (state, _) = connected_at(42);
        assert_eq!(state.snapshot().status, ConnectionStatus::Connected);
        assert_eq!(state.snapshot().remote_level, level(42));
        assert!(state.snapshot().remote_updated_at.is_some());
    }

    #[test]
    fn failures_keep_previous_remote_level() {
        let failures = [
            (FetchError::MalformedResponse("abc".into()), ConnectionStatus::InvalidResponse),
            (FetchError::Timeout(Duration::from_secs(3)), ConnectionStatus::TimedOut),
            (
                FetchError::HttpStatus(500),
                ConnectionStatus::Failed(FailureReason::HttpStatus(500)),
            ),
            (
                FetchError::Transport("refused".into()),
                ConnectionStatus::Failed(FailureReason::Transport("refused".into())),
            ),
        ];
        for (err, expected) in failures {
            let (mut state, generation) = connected_at(42);
            assert!(state.apply_fetch(generation, &Err(err), Utc::now()));
            assert_eq!(state.snapshot().status, expected);
            assert_eq!(state.snapshot().remote_level, level(42));
        }
    }

    #[test]
    fn repeated_success_is_stable() {
        let (mut state, generation) = connected_at(42);
        for _ in 0..5 {
            state.apply_fetch(generation, &Ok(level(42)), Utc::now());
            assert_eq!(state.snapshot().status, ConnectionStatus::Connected);
            assert_eq!(state.snapshot().remote_level, level(42));
        }
    }

    #[test]
    fn stale_generation_is_discarded() {
        let mut state = SyncState::new();
        let old = state.begin_session(peer("10.0.0.2"));
        let new = state.begin_session(peer("10.0.0.3"));
        assert_ne!(old, new);
        assert_eq!(state.generation(), new);

        assert!(state.apply_fetch(new, &Ok(level(20)), Utc::now()));
        // The superseded session's late answer lands afterwards.
        assert!(!state.apply_fetch(old, &Ok(level(90)), Utc::now()));
        assert_eq!(state.snapshot().remote_level, level(20));
        assert_eq!(state.snapshot().status, ConnectionStatus::Connected);
    }

    #[test]
    fn outcome_after_stop_is_discarded() {
        let (mut state, generation) = connected_at(42);
        assert!(state.end_session());
        assert!(state.generation() > generation, "stop retires the session");
        assert!(!state.apply_fetch(generation, &Err(FetchError::HttpStatus(500)), Utc::now()));
        assert_eq!(state.snapshot().status, ConnectionStatus::Idle);
        assert_eq!(state.snapshot().remote_level, level(42));
        assert!(!state.end_session(), "second stop is a no-op");
    }

    #[test]
    fn local_updates_report_changes_only() {
        let mut state = SyncState::new();
        assert!(state.record_local(level(37)));
        assert!(!state.record_local(level(37)));
        assert!(state.record_local(level(36)));
        assert_eq!(state.snapshot().local_level, level(36));
    }
}
