use std::sync::Arc;
use std::time::Instant;

use tw_core::STORE_FLUSH_INTERVAL;
use tw_core::STORE_SLOW_SAVE_WARNING;
use tw_core::SessionId;
use tw_engine::Session;

use crate::error::StoreResult;
use crate::memory::MemoryPubsub;
use crate::traits::Pubsub;
use crate::traits::Store;

/// Single-instance durable store. Writes land in sled's own write-ahead log
/// immediately and are batch-flushed to disk every [`STORE_FLUSH_INTERVAL`]
/// by a background task, with an explicit [`LocalStore::flush`] available for
/// the one path that needs a durability guarantee sooner: session creation.
pub struct LocalStore {
    db: sled::Db,
}

impl LocalStore {
    pub fn open(path: &std::path::Path) -> StoreResult<Arc<Self>> {
        let db = sled::open(path)?;
        let store = Arc::new(Self { db });
        store.clone().spawn_flusher();
        Ok(store)
    }

    fn spawn_flusher(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STORE_FLUSH_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(e) = self.db.flush_async().await {
                    log::warn!("[store] periodic flush failed: {e}");
                }
            }
        });
    }

    pub async fn flush(&self) -> StoreResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for LocalStore {
    async fn save(&self, id: &SessionId, session: &Session) -> StoreResult<()> {
        let start = Instant::now();
        let bytes = serde_json::to_vec(session)?;
        self.db.insert(id.as_bytes(), bytes)?;
        let elapsed = start.elapsed();
        if elapsed > STORE_SLOW_SAVE_WARNING {
            log::warn!("[store] save for {id} took {elapsed:?}, exceeding the slow-save threshold");
        }
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        match self.db.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &SessionId) -> StoreResult<()> {
        self.db.remove(id.as_bytes())?;
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<SessionId>> {
        let mut ids = Vec::new();
        for key in self.db.iter().keys() {
            ids.push(String::from_utf8_lossy(&key?).into_owned());
        }
        Ok(ids)
    }

    /// Apply the whole batch as a single atomic sled write; if that fails
    /// (e.g. one session failed to serialize), fall back to saving every
    /// session individually so one bad entry doesn't lose the rest.
    async fn save_all(&self, sessions: &[(SessionId, Session)]) -> StoreResult<()> {
        let mut batch = sled::Batch::default();
        let mut encoded = Vec::with_capacity(sessions.len());
        for (id, session) in sessions {
            encoded.push((id, serde_json::to_vec(session)?));
        }
        for (id, bytes) in &encoded {
            batch.insert(id.as_bytes(), bytes.clone());
        }
        if let Err(e) = self.db.apply_batch(batch) {
            log::warn!("[store] atomic batch flush failed, retrying sessions individually: {e}");
            for (id, session) in sessions {
                if let Err(e) = self.save(id, session).await {
                    log::warn!("[store] individual flush for {id} failed: {e}");
                }
            }
        }
        Ok(())
    }
}

/// Local tier has no cross-process fan-out, so pub/sub is just the in-memory
/// broadcast implementation reused as-is.
pub type LocalPubsub = MemoryPubsub;
