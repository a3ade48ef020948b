use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tw_core::SessionId;
use tw_engine::Session;

use crate::error::StoreResult;
use crate::traits::Pubsub;
use crate::traits::Store;

/// Deep-clone, process-local store. No serialization: `Session` derives
/// `Clone`, so a save is just a clone into the map.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn save(&self, id: &SessionId, session: &Session) -> StoreResult<()> {
        self.sessions.write().await.insert(id.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &SessionId) -> StoreResult<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<SessionId>> {
        Ok(self.sessions.read().await.keys().cloned().collect())
    }
}

/// In-process pub/sub over `tokio::sync::broadcast`, one sender per channel
/// name, lazily created on first publish or subscribe.
#[derive(Default)]
pub struct MemoryPubsub {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryPubsub {
    pub fn new() -> Self {
        Self::default()
    }

    async fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(1024).0)
            .clone()
    }
}

#[async_trait::async_trait]
impl Pubsub for MemoryPubsub {
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()> {
        let _ = self.sender(channel).await.send(payload.to_string());
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> StoreResult<tokio::sync::mpsc::UnboundedReceiver<String>> {
        let mut rx = self.sender(channel).await.subscribe();
        let (tx, out) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok(msg) = rx.recv().await {
                if tx.send(msg).is_err() {
                    break;
                }
            }
        });
        Ok(out)
    }
}

/// Convenience bundle implementing both traits, used when the in-memory tier
/// is selected wholesale (no separate store/pubsub wiring needed).
#[derive(Default)]
pub struct Memory {
    pub store: Arc<MemoryStore>,
    pub pubsub: Arc<MemoryPubsub>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            pubsub: Arc::new(MemoryPubsub::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = MemoryStore::new();
        let session = Session::new("ABCDEF".into(), Default::default(), None, 0, None).unwrap();
        store.save(&"ABCDEF".to_string(), &session).await.unwrap();
        let loaded = store.load(&"ABCDEF".to_string()).await.unwrap().unwrap();
        assert_eq!(loaded.id, "ABCDEF");
    }

    #[tokio::test]
    async fn delete_removes_the_entry() {
        let store = MemoryStore::new();
        let session = Session::new("ABCDEF".into(), Default::default(), None, 0, None).unwrap();
        store.save(&"ABCDEF".to_string(), &session).await.unwrap();
        store.delete(&"ABCDEF".to_string()).await.unwrap();
        assert!(store.load(&"ABCDEF".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let pubsub = MemoryPubsub::new();
        let mut rx = pubsub.subscribe("broadcast:ABCDEF").await.unwrap();
        pubsub.publish("broadcast:ABCDEF", "hello").await.unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg, "hello");
    }
}
