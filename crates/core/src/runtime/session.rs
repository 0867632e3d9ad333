use std::sync::Arc;
use std::time::Duration;

use battsync_link::{PeerAddress, StatusSource};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::controller::Command;

/// The recurring poll of one peer. At most one exists per controller.
#[derive(Debug)]
pub(crate) struct Session {
    generation: u64,
    peer: PeerAddress,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Session {
    pub(crate) fn spawn(
        generation: u64,
        peer: PeerAddress,
        period: Duration,
        source: Arc<dyn StatusSource>,
        commands: mpsc::Sender<Command>,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let task = tokio::spawn(poll_loop(
            generation,
            peer.clone(),
            period,
            source,
            commands,
            token.clone(),
        ));
        tracing::info!(%peer, generation, "sync session started");
        Self { generation, peer, token, task }
    }

    /// Stop polling now. Any fetch still in flight is dropped with the task.
    pub(crate) fn cancel(self) {
        self.token.cancel();
        self.task.abort();
        tracing::info!(peer = %self.peer, generation = self.generation, "sync session cancelled");
    }
}

/// First tick fires immediately, so the first fetch goes out without waiting
/// a full period. Fetches inside one session never overlap.
async fn poll_loop(
    generation: u64,
    peer: PeerAddress,
    period: Duration,
    source: Arc<dyn StatusSource>,
    commands: mpsc::Sender<Command>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            _ = token.cancelled() => break,
            outcome = source.fetch(&peer) => outcome,
        };
        if let Err(e) = &outcome {
            tracing::debug!(%peer, generation, error = %e, "peer poll failed");
        }

        if commands
            .send(Command::FetchCompleted { generation, outcome })
            .await
            .is_err()
        {
            break;
        }
    }
}
