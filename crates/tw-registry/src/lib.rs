//! The session registry: allocates ids, hydrates persisted sessions on boot,
//! runs every mutation through the coordinator's per-session lock, and owns
//! the idle-reaper / heartbeat / drain lifecycle tasks.

pub mod error;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tw_coordinator::Coordinator;
use tw_core::ClientId;
use tw_core::EMPTY_THRESHOLD;
use tw_core::Epoch;
use tw_core::HEARTBEAT_INTERVAL;
use tw_core::INACTIVE_THRESHOLD;
use tw_core::REAPER_INTERVAL;
use tw_core::STORE_FLUSH_INTERVAL;
use tw_core::SessionId;
use tw_core::now_ms;
use tw_engine::CampaignPreset;
use tw_engine::EngineEvent;
use tw_engine::EngineResult;
use tw_engine::PublicState;
use tw_engine::Session;
use tw_engine::SessionStatus;
use tw_engine::Settings;
use tw_store::GLOBAL_CHANNEL;
use tw_store::Pubsub;
use tw_store::Store;

pub use error::RegistryError;
pub use error::RegistryResult;

pub struct Registry {
    coordinator: Arc<Coordinator>,
    store: Arc<dyn Store>,
    pubsub: Arc<dyn Pubsub>,
    sessions: tokio::sync::RwLock<HashMap<SessionId, Session>>,
    connections: tokio::sync::RwLock<HashMap<SessionId, usize>>,
    /// Mode 2 (shared-store primary): every mutating op write-throughs
    /// immediately. Mode 1 (single-node, local durable or in-memory) instead
    /// relies on [`Registry::spawn_persister`] for a periodic batch flush,
    /// with an immediate save only on session create.
    write_through: bool,
}

impl Registry {
    pub fn new(
        coordinator: Arc<Coordinator>,
        store: Arc<dyn Store>,
        pubsub: Arc<dyn Pubsub>,
        write_through: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            store,
            pubsub,
            sessions: tokio::sync::RwLock::new(HashMap::new()),
            connections: tokio::sync::RwLock::new(HashMap::new()),
            write_through,
        })
    }

    /// Load every persisted session at boot. Any session caught `running` is
    /// coerced to `paused` — restart never resumes a live clock unannounced,
    /// and no grace time is refunded for the gap.
    pub async fn hydrate(&self) -> RegistryResult<usize> {
        let ids = self.store.list_ids().await?;
        let mut count = 0;
        for id in ids {
            if let Some(mut session) = self.store.load(&id).await? {
                if session.status == SessionStatus::Running {
                    session.status = SessionStatus::Paused;
                }
                self.sessions.write().await.insert(id, session);
                count += 1;
            }
        }
        Ok(count)
    }

    pub async fn create_session(
        &self,
        settings: Settings,
        owner: Option<ClientId>,
        campaign_preset: Option<CampaignPreset>,
    ) -> RegistryResult<SessionId> {
        let sessions = &self.sessions;
        let id = self
            .coordinator
            .allocate_session_id(|candidate| {
                sessions
                    .try_read()
                    .map(|guard| guard.contains_key(candidate))
                    .unwrap_or(true)
            })
            .await?;
        let session = Session::new(id.clone(), settings, owner, now_ms(), campaign_preset)?;
        self.sessions.write().await.insert(id.clone(), session.clone());
        self.store.save(&id, &session).await?;
        Ok(id)
    }

    pub async fn public_state(&self, id: &str) -> RegistryResult<PublicState> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(Session::to_public)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Run `f` against the session under the coordinator's exclusive lock,
    /// persist the result, and bump `lastActivity`.
    pub async fn mutate_with<F, R>(&self, id: &str, f: F) -> RegistryResult<R>
    where
        F: FnOnce(&mut Session) -> EngineResult<R>,
    {
        let outcome: RegistryResult<R> = self
            .coordinator
            .run_exclusive(id, move || async move {
                let mut sessions = self.sessions.write().await;
                let session = match sessions.get_mut(id) {
                    Some(s) => s,
                    None => return Err(RegistryError::NotFound(id.to_string())),
                };
                let value = f(session)?;
                session.last_activity = now_ms();
                if self.write_through {
                    self.store.save(&id.to_string(), session).await?;
                }
                Ok(value)
            })
            .await?;
        outcome
    }

    /// Tick every live session and return the non-empty event batches.
    pub async fn tick_all(&self, now: Epoch) -> Vec<(SessionId, Vec<EngineEvent>)> {
        let ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        let mut out = Vec::new();
        for id in ids {
            if let Ok(events) = self.mutate_with(&id, |s| Ok(s.tick(now))).await {
                if !events.is_empty() {
                    out.push((id, events));
                }
            }
        }
        out
    }

    pub async fn client_connected(&self, id: &str) {
        *self.connections.write().await.entry(id.to_string()).or_insert(0) += 1;
    }

    pub async fn client_disconnected(&self, id: &str) {
        if let Some(count) = self.connections.write().await.get_mut(id) {
            *count = count.saturating_sub(1);
        }
    }

    /// Sweep sessions idle past the empty/inactive thresholds.
    pub async fn reap_idle(&self, now: Epoch) -> Vec<SessionId> {
        let ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        let mut reaped = Vec::new();
        for id in ids {
            let idle = self
                .sessions
                .read()
                .await
                .get(&id)
                .map(|s| now - s.last_activity);
            let Some(idle) = idle else { continue };
            let connected = self.connections.read().await.get(&id).copied().unwrap_or(0);
            let should_reap = (connected == 0 && idle > EMPTY_THRESHOLD.as_millis() as Epoch)
                || idle > INACTIVE_THRESHOLD.as_millis() as Epoch;
            if should_reap {
                self.sessions.write().await.remove(&id);
                self.connections.write().await.remove(&id);
                let _ = self.store.delete(&id).await;
                self.coordinator.forget(&id).await;
                log::info!("[registry] reaped idle session {id}");
                reaped.push(id);
            }
        }
        reaped
    }

    /// Batch-save every in-memory session in one call, for the periodic
    /// local-durable flush and the final drain save.
    pub async fn flush_all(&self) -> RegistryResult<()> {
        let sessions: Vec<(SessionId, Session)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect();
        self.store.save_all(&sessions).await?;
        Ok(())
    }

    /// Mode 1's periodic batch flush. A no-op when `write_through` is set,
    /// since every mutation already persists immediately in that mode.
    pub fn spawn_persister(self: &Arc<Self>) {
        if self.write_through {
            return;
        }
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STORE_FLUSH_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(e) = registry.flush_all().await {
                    log::warn!("[registry] periodic flush failed: {e}");
                }
            }
        });
    }

    pub fn spawn_reaper(self: &Arc<Self>) {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAPER_INTERVAL);
            loop {
                ticker.tick().await;
                registry.reap_idle(now_ms()).await;
            }
        });
    }

    pub fn spawn_heartbeat(self: &Arc<Self>, sink: Arc<dyn tw_store::Heartbeat>, instance_id: String) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(e) = sink.heartbeat(&instance_id).await {
                    log::warn!("[registry] heartbeat failed: {e}");
                }
            }
        });
    }

    /// Warn connected clients, wait out the drain window for them to leave,
    /// then force a final save of every remaining session.
    pub async fn drain(&self, timeout: std::time::Duration, poll: std::time::Duration) -> RegistryResult<()> {
        let _ = self.pubsub.publish(GLOBAL_CHANNEL, "shutdown_warning").await;
        let deadline = Instant::now() + timeout;
        loop {
            let total: usize = self.connections.read().await.values().sum();
            if total == 0 || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(poll).await;
        }
        let _ = self.flush_all().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_store::Memory;

    fn setup() -> Arc<Registry> {
        let memory = Memory::new();
        Registry::new(Arc::new(Coordinator::new()), memory.store, memory.pubsub, true)
    }

    #[tokio::test]
    async fn create_then_public_state_round_trips() {
        let registry = setup();
        let id = registry
            .create_session(Settings::default(), None, None)
            .await
            .unwrap();
        let state = registry.public_state(&id).await.unwrap();
        assert_eq!(state.id, id);
        assert_eq!(state.players.len(), Settings::default().player_count as usize);
    }

    #[tokio::test]
    async fn hydrate_coerces_running_to_paused() {
        let memory = Memory::new();
        let mut session = Session::new("ABCDEF".into(), Settings::default(), None, 0, None).unwrap();
        session.status = SessionStatus::Running;
        memory.store.save(&"ABCDEF".to_string(), &session).await.unwrap();
        let registry = Registry::new(Arc::new(Coordinator::new()), memory.store.clone(), memory.pubsub.clone(), true);
        registry.hydrate().await.unwrap();
        let state = registry.public_state("ABCDEF").await.unwrap();
        assert_eq!(state.status, SessionStatus::Paused);
    }

    #[tokio::test]
    async fn mutate_persists_through_the_store() {
        let memory = Memory::new();
        let registry = Registry::new(Arc::new(Coordinator::new()), memory.store.clone(), memory.pubsub, true);
        let id = registry
            .create_session(Settings::default(), None, None)
            .await
            .unwrap();
        registry.mutate_with(&id, |s| s.start(0)).await.unwrap();
        let reloaded = memory.store.load(&id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn batched_mode_defers_mutation_saves_to_flush_all() {
        let memory = Memory::new();
        let registry = Registry::new(Arc::new(Coordinator::new()), memory.store.clone(), memory.pubsub, false);
        let id = registry
            .create_session(Settings::default(), None, None)
            .await
            .unwrap();
        registry.mutate_with(&id, |s| s.start(0)).await.unwrap();
        let reloaded = memory.store.load(&id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Waiting, "create saves immediately, but the later mutation must not");
        registry.flush_all().await.unwrap();
        let reloaded = memory.store.load(&id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Running, "flush_all catches up the deferred mutation");
    }

    #[tokio::test]
    async fn reap_idle_removes_empty_stale_sessions() {
        let registry = setup();
        let id = registry
            .create_session(Settings::default(), None, None)
            .await
            .unwrap();
        let far_future = EMPTY_THRESHOLD.as_millis() as Epoch + 1;
        let reaped = registry.reap_idle(far_future).await;
        assert_eq!(reaped, vec![id]);
    }
}
