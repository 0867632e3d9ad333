use std::sync::Arc;

use battsync_link::{BatteryLevel, FetchError, PeerAddress, PeerAddressError, StatusSource};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::session::Session;
use super::state::SyncState;
use crate::config::SyncCfg;
use crate::environment::{AddressProvider, BatterySensor, LocalSampler, SensorError};
use crate::server::StatusServer;
use crate::types::{ServerStatus, SyncSnapshot};

/// Platform capabilities the controller is wired with.
pub struct Collaborators {
    pub sensor: Arc<dyn BatterySensor>,
    pub address: Arc<dyn AddressProvider>,
    pub source: Arc<dyn StatusSource>,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] PeerAddressError),
    #[error("sync controller has shut down")]
    Closed,
}

/// Messages into the single owner of sync state.
#[derive(Debug)]
pub(crate) enum Command {
    StartSync {
        peer: PeerAddress,
        reply: oneshot::Sender<()>,
    },
    StopSync {
        reply: oneshot::Sender<()>,
    },
    FetchCompleted {
        generation: u64,
        outcome: Result<BatteryLevel, FetchError>,
    },
    LocalSampled(Result<BatteryLevel, SensorError>),
}

/// Handle to a running battery sync.
///
/// All state lives in one background task. Timer ticks, poll results and
/// user commands reach it through a queue, and every change is published on
/// a watch channel (see [`subscribe`](Self::subscribe)). Dropping the handle
/// cancels everything; [`shutdown`](Self::shutdown) also waits for it.
pub struct SyncController {
    commands: mpsc::Sender<Command>,
    status_rx: watch::Receiver<SyncSnapshot>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SyncController {
    /// Sample once, bind the status server, and start the sampling loop.
    /// A failed bind is recorded in the snapshot and otherwise ignored.
    pub async fn start(
        cfg: Arc<SyncCfg>,
        deps: Collaborators,
        shutdown: CancellationToken,
    ) -> Self {
        let token = shutdown.child_token();
        let (commands_tx, commands_rx) = mpsc::channel(cfg.command_buffer);
        let sampler = LocalSampler::new(deps.sensor);
        let mut state = SyncState::new();

        match deps.address.local_address() {
            Ok(ip) => {
                state.set_local_address(Some(ip));
            }
            Err(e) => tracing::warn!(error = %e, "local address unavailable"),
        }

        let reading = read_blocking(sampler.clone()).await;
        if let Some(level) = accept_reading(&sampler, reading) {
            state.record_local(level);
        }
        let (level_tx, level_rx) = watch::channel(state.snapshot().local_level);

        let server =
            match StatusServer::bind(cfg.bind_addr(), level_rx, token.child_token()).await {
                Ok(server) => {
                    state.set_server(ServerStatus::Listening(server.local_addr()));
                    Some(server)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "status server unavailable, continuing as client only");
                    state.set_server(ServerStatus::Unavailable(e.to_string()));
                    None
                }
            };

        let (status_tx, status_rx) = watch::channel(state.snapshot().clone());
        let actor = SyncActor {
            cfg,
            state,
            sampler,
            source: deps.source,
            commands_rx,
            commands_tx: commands_tx.clone(),
            status_tx,
            level_tx,
            server,
            session: None,
            pending_sample: None,
            token: token.clone(),
        };
        let task = tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            status_rx,
            token,
            task: Some(task),
        }
    }

    /// Start polling `peer`, replacing any running session. Blank input is
    /// rejected here and leaves the current session untouched.
    pub async fn start_sync(&self, peer: &str) -> Result<(), SyncError> {
        let peer = PeerAddress::parse(peer)
            .inspect_err(|e| tracing::info!(error = %e, "sync start rejected"))?;
        self.request(|reply| Command::StartSync { peer, reply }).await
    }

    /// Cancel the running session, if any, and go Idle.
    pub async fn stop_sync(&self) -> Result<(), SyncError> {
        self.request(|reply| Command::StopSync { reply }).await
    }

    /// Resolves once the owner has applied the command and published the result.
    async fn request(
        &self,
        build: impl FnOnce(oneshot::Sender<()>) -> Command,
    ) -> Result<(), SyncError> {
        let (reply, done) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SyncError::Closed)?;
        done.await.map_err(|_| SyncError::Closed)
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.status_rx.clone()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.status_rx.borrow().clone()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel both loops, close the server socket and wait for the owner task.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "sync controller task ended abnormally");
            }
        }
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Sensor reads touch the filesystem, so they run on the blocking pool.
async fn read_blocking(sampler: LocalSampler) -> Result<BatteryLevel, SensorError> {
    tokio::task::spawn_blocking(move || sampler.current_level())
        .await
        .unwrap_or_else(|e| Err(SensorError::Unavailable(format!("sensor read aborted: {e}"))))
}

fn accept_reading(
    sampler: &LocalSampler,
    reading: Result<BatteryLevel, SensorError>,
) -> Option<BatteryLevel> {
    match reading {
        Ok(level) => Some(level),
        Err(e) => {
            tracing::debug!(sensor = sampler.sensor_name(), error = %e, "battery sample failed, keeping last level");
            None
        }
    }
}

struct SyncActor {
    cfg: Arc<SyncCfg>,
    state: SyncState,
    sampler: LocalSampler,
    source: Arc<dyn StatusSource>,
    commands_rx: mpsc::Receiver<Command>,
    /// Cloned into each session so poll results come back through the queue.
    commands_tx: mpsc::Sender<Command>,
    status_tx: watch::Sender<SyncSnapshot>,
    /// Feeds the status server; it never reads the sensor itself.
    level_tx: watch::Sender<BatteryLevel>,
    server: Option<StatusServer>,
    session: Option<Session>,
    /// At most one sensor read in flight; slow reads skip ticks.
    pending_sample: Option<JoinHandle<()>>,
    token: CancellationToken,
}

impl SyncActor {
    async fn run(mut self) {
        let period = self.cfg.sample_interval();
        // The startup sample already happened, so the first tick is one period out.
        let mut sample_tick = tokio::time::interval_at(Instant::now() + period, period);
        sample_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            server = %self.state.snapshot().server,
            local_level = %self.state.snapshot().local_level,
            "sync controller started"
        );

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = sample_tick.tick() => self.sample_local(),
                Some(command) = self.commands_rx.recv() => self.handle(command),
            }
        }

        self.teardown().await;
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::StartSync { peer, reply } => {
                if let Some(previous) = self.session.take() {
                    previous.cancel();
                }
                let generation = self.state.begin_session(peer.clone());
                self.session = Some(Session::spawn(
                    generation,
                    peer,
                    self.cfg.poll_interval(),
                    Arc::clone(&self.source),
                    self.commands_tx.clone(),
                    &self.token,
                ));
                self.publish();
                let _ = reply.send(());
            }
            Command::StopSync { reply } => {
                if let Some(session) = self.session.take() {
                    session.cancel();
                }
                if self.state.end_session() {
                    self.publish();
                }
                let _ = reply.send(());
            }
            Command::FetchCompleted { generation, outcome } => {
                if self.state.apply_fetch(generation, &outcome, Utc::now()) {
                    self.publish();
                } else {
                    tracing::debug!(generation, "discarded result of a superseded session");
                }
            }
            Command::LocalSampled(reading) => {
                self.pending_sample = None;
                if let Some(level) = accept_reading(&self.sampler, reading) {
                    if self.state.record_local(level) {
                        self.level_tx.send_replace(level);
                        self.publish();
                    }
                }
            }
        }
    }

    fn sample_local(&mut self) {
        if self
            .pending_sample
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            tracing::debug!("previous battery read still running, skipping tick");
            return;
        }
        let sampler = self.sampler.clone();
        let commands = self.commands_tx.clone();
        self.pending_sample = Some(tokio::spawn(async move {
            let reading = read_blocking(sampler).await;
            let _ = commands.send(Command::LocalSampled(reading)).await;
        }));
    }

    fn publish(&self) {
        // send_replace never fails, even with no subscribers left.
        self.status_tx.send_replace(self.state.snapshot().clone());
    }

    async fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
        }
        if let Some(task) = self.pending_sample.take() {
            task.abort();
        }
        if let Some(server) = self.server.take() {
            server.shutdown(self.cfg.shutdown_grace()).await;
            self.state.set_server(ServerStatus::Stopped);
        }
        self.state.end_session();
        self.publish();
        tracing::info!("sync controller stopped");
    }
}
