use std::sync::Arc;

use clap::Parser;
use tw_registry::Registry;
use tw_server::args::Args;
use tw_server::args::StoreMode;
use tw_server::config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tw_core::init_logging(args.log_file.as_deref());
    tw_core::install_shutdown_signal();

    let backend = config::resolve(&args).await?;
    let coordinator = Arc::new(tw_coordinator::Coordinator::new());
    // Mode 2 (shared-store primary) write-throughs every mutation; mode 1
    // (memory or local-durable) defers to a periodic batch flush instead.
    let write_through = args.mode == StoreMode::Shared;
    let registry = Registry::new(coordinator, backend.store, backend.pubsub.clone(), write_through);
    let restored = registry.hydrate().await?;
    log::info!("[server] hydrated {restored} session(s) from storage");

    registry.spawn_reaper();
    registry.spawn_persister();
    if let Some(heartbeat) = backend.heartbeat {
        registry.spawn_heartbeat(heartbeat, args.instance_id.clone());
    }

    tw_server::run(&args.bind, args.port, registry, backend.pubsub).await?;
    Ok(())
}
