//! Per-session mutual exclusion.
//!
//! Every command that mutates a session runs through [`Coordinator::run_exclusive`],
//! which serializes operations on the same session id while letting unrelated
//! sessions run fully in parallel — one `tokio::sync::Mutex` per session id,
//! acquired around each op rather than a dedicated actor task per session.

pub mod error;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tw_core::COORDINATOR_LOCK_TIMEOUT;
use tw_core::COORDINATOR_PENDING_CAP;
use tw_core::SESSION_ID_ALPHABET;
use tw_core::SESSION_ID_LEN;
use tw_core::SESSION_ID_MAX_ATTEMPTS;
use tw_core::SessionId;

pub use error::CoordinatorError;
pub use error::CoordinatorResult;

struct SessionSlot {
    mutex: Mutex<()>,
    pending: AtomicUsize,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            pending: AtomicUsize::new(0),
        }
    }
}

/// Holds one lock per session id plus a singleton creation lock used only
/// while allocating a fresh id, so two concurrent `createSession` calls can
/// never race each other onto the same code.
pub struct Coordinator {
    sessions: RwLock<HashMap<SessionId, Arc<SessionSlot>>>,
    create_lock: Mutex<()>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            create_lock: Mutex::new(()),
        }
    }

    async fn slot(&self, id: &str) -> Arc<SessionSlot> {
        if let Some(existing) = self.sessions.read().await.get(id) {
            return existing.clone();
        }
        self.sessions
            .write()
            .await
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(SessionSlot::new()))
            .clone()
    }

    /// Drop the slot for a closed session so the registry doesn't grow unbounded.
    pub async fn forget(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    /// Run `op` with exclusive access to session `id`.
    ///
    /// Fails fast with [`CoordinatorError::Busy`] when 100 operations are
    /// already queued for this session, and with [`CoordinatorError::Timeout`]
    /// if the lock isn't acquired within 5 seconds.
    pub async fn run_exclusive<F, Fut, R>(&self, id: &str, op: F) -> CoordinatorResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let slot = self.slot(id).await;
        let queued = slot.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if queued > COORDINATOR_PENDING_CAP {
            slot.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(CoordinatorError::Busy);
        }
        let acquired = timeout(COORDINATOR_LOCK_TIMEOUT, slot.mutex.lock()).await;
        slot.pending.fetch_sub(1, Ordering::SeqCst);
        match acquired {
            Ok(guard) => {
                let result = op().await;
                drop(guard);
                Ok(result)
            }
            Err(_) => Err(CoordinatorError::Timeout),
        }
    }

    /// Allocate a fresh, unused 6-character session id under the singleton
    /// creation lock, so concurrent creations never collide.
    pub async fn allocate_session_id(
        &self,
        exists: impl Fn(&str) -> bool,
    ) -> CoordinatorResult<SessionId> {
        let _guard = self.create_lock.lock().await;
        for _ in 0..SESSION_ID_MAX_ATTEMPTS {
            let candidate = random_session_id();
            if !exists(&candidate) {
                return Ok(candidate);
            }
        }
        Err(CoordinatorError::IdExhausted)
    }
}

fn random_session_id() -> SessionId {
    let alphabet: Vec<char> = SESSION_ID_ALPHABET.chars().collect();
    let mut rng = rand::thread_rng();
    (0..SESSION_ID_LEN)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn exclusive_ops_on_the_same_session_serialize() {
        let coordinator = Arc::new(Coordinator::new());
        let order = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let coordinator = coordinator.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .run_exclusive("ABCDEF", || async {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        order.lock().await.push(i);
                    })
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(order.lock().await.len(), 5);
    }

    #[tokio::test]
    async fn different_sessions_run_concurrently() {
        let coordinator = Coordinator::new();
        let a = coordinator.run_exclusive("AAAAAA", || async { 1 });
        let b = coordinator.run_exclusive("BBBBBB", || async { 2 });
        let (ra, rb) = tokio::join!(a, b);
        assert_eq!(ra.unwrap(), 1);
        assert_eq!(rb.unwrap(), 2);
    }

    #[tokio::test]
    async fn busy_cap_rejects_excess_pending_ops() {
        let coordinator = Arc::new(Coordinator::new());
        let slot = coordinator.slot("ABCDEF").await;
        slot.pending.store(COORDINATOR_PENDING_CAP, Ordering::SeqCst);
        let result = coordinator.run_exclusive("ABCDEF", || async { 0 }).await;
        assert_eq!(result.unwrap_err(), CoordinatorError::Busy);
    }

    #[test]
    fn allocated_ids_use_the_unambiguous_alphabet_and_right_length() {
        let id = random_session_id();
        assert_eq!(id.len(), SESSION_ID_LEN);
        assert!(id.chars().all(|c| SESSION_ID_ALPHABET.contains(c)));
    }
}
