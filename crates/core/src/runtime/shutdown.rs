use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Root of the cancellation tree. Cancelling it tears down the controller,
/// its poll session and the status server.
#[derive(Debug, Clone)]
pub struct ShutdownGuard {
    token: CancellationToken,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel on SIGTERM or Ctrl+C, whichever comes first.
    pub fn spawn_signal_listener(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to register SIGTERM handler");
                            let _ = signal::ctrl_c().await;
                            token.cancel();
                            return;
                        }
                    };
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                    _ = signal::ctrl_c() => tracing::info!("received Ctrl+C, shutting down"),
                    _ = token.cancelled() => return,
                }
            }
            #[cfg(not(unix))]
            {
                tokio::select! {
                    _ = signal::ctrl_c() => tracing::info!("received Ctrl+C, shutting down"),
                    _ = token.cancelled() => return,
                }
            }
            token.cancel();
        });
    }
}

impl Default for ShutdownGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_reaches_child_tokens() {
        let guard = ShutdownGuard::new();
        let child = guard.token().child_token();
        guard.cancel();
        child.cancelled().await;
        assert!(guard.token().is_cancelled());
    }
}
