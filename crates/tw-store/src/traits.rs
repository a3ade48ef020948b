use tw_core::SessionId;
use tw_engine::Session;

use crate::error::StoreResult;

/// Session persistence, backed by one of three tiers (§5): in-memory,
/// local-durable, or shared/networked. Every method is keyed by the
/// 6-character session id.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn save(&self, id: &SessionId, session: &Session) -> StoreResult<()>;
    async fn load(&self, id: &SessionId) -> StoreResult<Option<Session>>;
    async fn delete(&self, id: &SessionId) -> StoreResult<()>;
    /// Every id currently persisted, used by the registry to hydrate on boot.
    async fn list_ids(&self) -> StoreResult<Vec<SessionId>>;

    /// Flush a whole batch of sessions at once, for the periodic local-durable
    /// flush. The default is all-or-nothing only in the sense that every
    /// entry is attempted; a backend that can make the write atomic (e.g. a
    /// single disk batch) should override this and retry entries
    /// individually if the atomic attempt fails.
    async fn save_all(&self, sessions: &[(SessionId, Session)]) -> StoreResult<()> {
        for (id, session) in sessions {
            if let Err(e) = self.save(id, session).await {
                log::warn!("[store] batch flush for {id} failed: {e}");
            }
        }
        Ok(())
    }
}

/// Cross-instance broadcast, backed by the same tier as its paired [`Store`].
/// `broadcast:<sessionId>` carries per-session events; `global:events`
/// carries cross-session lifecycle notices (e.g. shutdown warnings).
#[async_trait::async_trait]
pub trait Pubsub: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> StoreResult<()>;
    async fn subscribe(&self, channel: &str) -> StoreResult<tokio::sync::mpsc::UnboundedReceiver<String>>;
}

/// Instance liveness registry, meaningful only for the shared/networked tier
/// (a single process has no other instance to discover).
#[async_trait::async_trait]
pub trait Heartbeat: Send + Sync {
    async fn heartbeat(&self, instance_id: &str) -> StoreResult<()>;
    async fn live_instances(&self) -> StoreResult<Vec<String>>;
}

pub fn session_channel(id: &str) -> String {
    format!("broadcast:{id}")
}

pub const GLOBAL_CHANNEL: &str = "global:events";
