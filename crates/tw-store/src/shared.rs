use std::time::Instant;

use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tw_core::HEARTBEAT_TTL;
use tw_core::STORE_DEFAULT_TTL;
use tw_core::STORE_SLOW_SAVE_WARNING;
use tw_core::SessionId;
use tw_engine::Session;

use crate::error::StoreResult;
use crate::traits::Heartbeat;
use crate::traits::Pubsub;
use crate::traits::Store;

/// Networked store shared across server instances. Keys carry
/// [`STORE_DEFAULT_TTL`] so an abandoned session eventually expires even if
/// the reaper never runs.
pub struct SharedStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl SharedStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn })
    }

    fn key(id: &str) -> String {
        format!("session:{id}")
    }
}

#[async_trait::async_trait]
impl Heartbeat for SharedStore {
    /// Refresh this instance's liveness entry; called every
    /// [`tw_core::HEARTBEAT_INTERVAL`] by the lifecycle task.
    async fn heartbeat(&self, instance_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(
                format!("heartbeat:{instance_id}"),
                1,
                HEARTBEAT_TTL.as_secs(),
            )
            .await?;
        Ok(())
    }

    /// Instance ids with a live heartbeat entry.
    async fn live_instances(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys("heartbeat:*").await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix("heartbeat:").map(str::to_string))
            .collect())
    }
}

#[async_trait::async_trait]
impl Store for SharedStore {
    async fn save(&self, id: &SessionId, session: &Session) -> StoreResult<()> {
        let start = Instant::now();
        let bytes = serde_json::to_vec(session)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::key(id), bytes, STORE_DEFAULT_TTL.as_secs())
            .await?;
        let elapsed = start.elapsed();
        if elapsed > STORE_SLOW_SAVE_WARNING {
            log::warn!("[store] save for {id} took {elapsed:?}, exceeding the slow-save threshold");
        }
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        let mut conn = self.conn.clone();
        let bytes: Option<Vec<u8>> = conn.get(Self::key(id)).await?;
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &SessionId) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(id)).await?;
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<SessionId>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys("session:*").await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix("session:").map(str::to_string))
            .collect())
    }
}

#[async_trait::async_trait]
impl Pubsub for SharedStore {
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> StoreResult<tokio::sync::mpsc::UnboundedReceiver<String>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                if tx.send(payload).is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
