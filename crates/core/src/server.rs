//! Local `/battery` endpoint.
//!
//! Serves the last sampled level as a plain-text integer. Handlers only read
//! the published value; they never touch the sensor.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::serve::Listener;
use axum::{Router, extract::State, routing::get};
use battsync_link::{BATTERY_PATH, BatteryLevel};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

struct AppState {
    level: watch::Receiver<BatteryLevel>,
}

async fn handle_battery(State(state): State<Arc<AppState>>) -> String {
    let level = *state.level.borrow();
    tracing::trace!(%level, "served battery level");
    level.to_string()
}

/// Build the axum router. Unknown paths fall through to axum's 404.
fn build_router(level: watch::Receiver<BatteryLevel>) -> Router {
    let state = Arc::new(AppState { level });
    Router::new()
        .route(BATTERY_PATH, get(handle_battery))
        .with_state(state)
}

// ── Connections ─────────────────────────────────────────────────

/// TCP listener whose accepted connections all fail once `hard_stop` fires.
/// axum runs every connection in its own task, so this is the only handle
/// teardown has on them.
struct StoppableListener {
    inner: TcpListener,
    hard_stop: CancellationToken,
}

impl Listener for StoppableListener {
    type Io = StoppableStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok((stream, addr)) => return (StoppableStream::new(stream, &self.hard_stop), addr),
                Err(e) if is_connection_error(&e) => {}
                Err(e) => {
                    // Usually fd exhaustion; back off instead of spinning.
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

struct StoppableStream {
    inner: TcpStream,
    token: CancellationToken,
    stopped: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl StoppableStream {
    fn new(inner: TcpStream, hard_stop: &CancellationToken) -> Self {
        Self {
            inner,
            token: hard_stop.clone(),
            stopped: Box::pin(hard_stop.clone().cancelled_owned()),
        }
    }

    /// Fails once stopped; otherwise registers the waker for the stop signal.
    fn poll_stopped(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        if self.token.is_cancelled() || self.stopped.as_mut().poll(cx).is_ready() {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "status server stopped",
            ));
        }
        Ok(())
    }
}

impl AsyncRead for StoppableStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_stopped(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for StoppableStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_stopped(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Err(e) = this.poll_stopped(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

// ── Server ──────────────────────────────────────────────────────

/// A bound, running status server. Dropping it without [`shutdown`](Self::shutdown)
/// still stops accepting once `token` is cancelled.
#[derive(Debug)]
pub struct StatusServer {
    local_addr: SocketAddr,
    token: CancellationToken,
    hard_stop: CancellationToken,
    task: JoinHandle<()>,
}

impl StatusServer {
    /// Bind `addr` and start serving in a background task.
    pub async fn bind(
        addr: SocketAddr,
        level: watch::Receiver<BatteryLevel>,
        token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = inner
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let hard_stop = CancellationToken::new();
        let listener = StoppableListener {
            inner,
            hard_stop: hard_stop.clone(),
        };
        let app = build_router(level);
        let stop = token.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(stop.cancelled_owned())
                .await
            {
                tracing::warn!(error = %e, "status server exited with error");
            }
        });

        tracing::info!(%local_addr, "status server listening");
        Ok(Self {
            local_addr,
            token,
            hard_stop,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and give in-flight requests `grace` to finish. After
    /// that every remaining connection is failed and dropped. The listening
    /// socket is released either way.
    pub async fn shutdown(mut self, grace: Duration) {
        self.token.cancel();
        if tokio::time::timeout(grace, &mut self.task).await.is_ok() {
            tracing::debug!(addr = %self.local_addr, "status server stopped");
            return;
        }

        self.hard_stop.cancel();
        // Graceful shutdown finishes as soon as the failed connections are gone.
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            self.task.abort();
        }
        tracing::warn!(addr = %self.local_addr, "status server force-closed pending connections");
    }
}
