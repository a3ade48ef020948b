use std::sync::Arc;

use anyhow::Context;
use tw_store::Heartbeat;
use tw_store::LocalPubsub;
use tw_store::LocalStore;
use tw_store::Memory;
use tw_store::Pubsub;
use tw_store::SharedStore;
use tw_store::Store;

use crate::args::Args;
use crate::args::StoreMode;

/// Resolved persistence/pubsub backend plus, for the shared tier, a
/// heartbeat sink — built once at startup from `Args`.
pub struct Backend {
    pub store: Arc<dyn Store>,
    pub pubsub: Arc<dyn Pubsub>,
    pub heartbeat: Option<Arc<dyn Heartbeat>>,
}

pub async fn resolve(args: &Args) -> anyhow::Result<Backend> {
    match args.mode {
        StoreMode::Memory => {
            let memory = Memory::new();
            Ok(Backend {
                store: memory.store,
                pubsub: memory.pubsub,
                heartbeat: None,
            })
        }
        StoreMode::Local => {
            let path = args
                .sled_path
                .as_ref()
                .context("--sled-path is required when --mode local")?;
            let store = LocalStore::open(path).context("opening sled store")?;
            let pubsub = Arc::new(LocalPubsub::new());
            Ok(Backend {
                store,
                pubsub,
                heartbeat: None,
            })
        }
        StoreMode::Shared => {
            let url = args
                .redis_url
                .as_ref()
                .context("--redis-url is required when --mode shared")?;
            let shared = Arc::new(
                SharedStore::connect(url)
                    .await
                    .context("connecting to redis")?,
            );
            Ok(Backend {
                store: shared.clone(),
                pubsub: shared.clone(),
                heartbeat: Some(shared),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[tokio::test]
    async fn memory_mode_resolves_without_any_flags() {
        let args = Args::parse_from(["tw-server"]);
        let backend = resolve(&args).await.unwrap();
        assert!(backend.heartbeat.is_none());
    }

    #[tokio::test]
    async fn local_mode_without_sled_path_is_rejected() {
        let args = Args::parse_from(["tw-server", "--mode", "local"]);
        assert!(resolve(&args).await.is_err());
    }

    #[tokio::test]
    async fn shared_mode_without_redis_url_is_rejected() {
        let args = Args::parse_from(["tw-server", "--mode", "shared"]);
        assert!(resolve(&args).await.is_err());
    }
}
