mod repl;

use std::sync::Arc;

use battsync_core::environment::{SysfsBattery, UdpRouteProbe};
use battsync_core::{Collaborators, ShutdownGuard, SyncCfg, SyncController};
use battsync_link::HttpStatusClient;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing: write to a file when RUST_LOG is set so it does not tear the prompt
    if std::env::var("RUST_LOG").is_ok() {
        let path = std::env::temp_dir().join("battsync.log");
        let file = std::fs::File::create(&path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().json().with_target(true).with_writer(file))
            .init();
    }

    let cfg = Arc::new(SyncCfg::default());
    let deps = Collaborators {
        sensor: Arc::new(SysfsBattery::new()),
        address: Arc::new(UdpRouteProbe),
        source: Arc::new(HttpStatusClient::new(cfg.peer_port, cfg.fetch_timeout())),
    };

    let guard = ShutdownGuard::new();
    guard.spawn_signal_listener();

    let controller = SyncController::start(cfg, deps, guard.token()).await;
    let result = repl::run(&controller).await;
    controller.shutdown().await;
    result
}
