//! Core type aliases, identifiers, and shared constants for turnwarden.
//!
//! This crate provides the foundational types and configuration parameters
//! used throughout the turnwarden workspace.
#![allow(dead_code)]

// ============================================================================
// TYPE ALIASES
// ============================================================================
/// Integer slot `1..N` identifying a player within a session.
pub type PlayerId = u32;
/// Six-character session code drawn from the unambiguous alphabet.
pub type SessionId = String;
/// Ephemeral id of one transport connection.
pub type ClientId = String;
/// Milliseconds, used for remaining time, deadlines, and durations.
pub type Millis = i64;
/// Epoch milliseconds (wall clock), used for timestamps and deadlines.
pub type Epoch = i64;
/// Campaign round counter, `1..=maxRounds` (may transiently be `maxRounds + 1`).
pub type Round = u32;

// ============================================================================
// TRAITS
// ============================================================================
/// Unique identifier trait for domain entities.
pub trait Unique<T = Self> {
    fn id(&self) -> ID<T>;
}

// ============================================================================
// IDENTITY TYPE
// ============================================================================
use std::cmp::Ordering;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::hash::Hash;
use std::hash::Hasher;
use std::marker::PhantomData;

/// Generic ID wrapper providing compile-time type safety over `uuid::Uuid`.
///
/// Used for entities that need a process-wide opaque handle distinct from the
/// human-facing 6-character session code (see [`SESSION_ID_ALPHABET`]).
pub struct ID<T> {
    inner: uuid::Uuid,
    marker: PhantomData<T>,
}

impl<T> ID<T> {
    pub fn inner(&self) -> uuid::Uuid {
        self.inner
    }
    /// Cast `ID<T>` to `ID<U>` while preserving the underlying UUID.
    pub fn cast<U>(self) -> ID<U> {
        ID {
            inner: self.inner,
            marker: PhantomData,
        }
    }
}

impl<T> From<ID<T>> for uuid::Uuid {
    fn from(id: ID<T>) -> Self {
        id.inner()
    }
}
impl<T> From<uuid::Uuid> for ID<T> {
    fn from(inner: uuid::Uuid) -> Self {
        Self {
            inner,
            marker: PhantomData,
        }
    }
}

impl<T> Default for ID<T> {
    fn default() -> Self {
        Self {
            inner: uuid::Uuid::new_v4(),
            marker: PhantomData,
        }
    }
}

impl<T> Copy for ID<T> {}
impl<T> Clone for ID<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Eq for ID<T> {}
impl<T> PartialEq for ID<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T> Ord for ID<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.cmp(&other.inner)
    }
}
impl<T> PartialOrd for ID<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Hash for ID<T> {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        self.inner.hash(state);
    }
}

impl<T> Debug for ID<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ID").field(&self.inner).finish()
    }
}
impl<T> Display for ID<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

// ============================================================================
// DOMAIN CONSTANTS
// ============================================================================
/// Alphabet for 6-character session codes: unambiguous, no `0 1 I O`.
pub const SESSION_ID_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Length of an allocated session id.
pub const SESSION_ID_LEN: usize = 6;
/// Attempts before ID allocation fails with `IdExhausted`.
pub const SESSION_ID_MAX_ATTEMPTS: usize = 10;

/// Tick cadence for a running session's timer loop.
pub const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

/// Minimum allowed player count.
pub const MIN_PLAYERS: u32 = 2;
/// Maximum allowed player count.
pub const MAX_PLAYERS: u32 = 8;

/// Maximum time value accepted anywhere (ms): 24 hours.
pub const MAX_TIME_MS: Millis = 24 * 60 * 60 * 1000;

/// Default starting life total.
pub const DEFAULT_LIFE: i32 = 20;
/// Minimum clamp for `life`.
pub const MIN_LIFE: i32 = -999;
/// Maximum clamp for `life`.
pub const MAX_LIFE: i32 = 999;
/// Minimum clamp for counters (`drunkCounter`, `genericCounter`).
pub const MIN_COUNTER: i32 = 0;
/// Maximum clamp for counters.
pub const MAX_COUNTER: i32 = 999;

/// Maximum length, in chars, of any sanitized display name.
pub const MAX_NAME_LEN: usize = 50;
/// Maximum number of warning thresholds a session may register.
pub const MAX_WARNING_THRESHOLDS: usize = 10;

/// Reconnect/claim token length in raw bytes (encoded as 64 hex chars).
pub const TOKEN_BYTES: usize = 32;
/// Claim/reconnect token time-to-live.
pub const TOKEN_TTL: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// Coordinator per-session lock-acquire timeout.
pub const COORDINATOR_LOCK_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(5000);
/// Coordinator per-session pending-operation cap.
pub const COORDINATOR_PENDING_CAP: usize = 100;

/// Default shared-store key TTL.
pub const STORE_DEFAULT_TTL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);
/// Local-durable batch flush interval.
pub const STORE_FLUSH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);
/// Save-latency threshold above which a warning is logged.
pub const STORE_SLOW_SAVE_WARNING: std::time::Duration = std::time::Duration::from_millis(100);

/// Reaper sweep interval.
pub const REAPER_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5 * 60);
/// A session with zero connected clients idle past this is reaped.
pub const EMPTY_THRESHOLD: std::time::Duration = std::time::Duration::from_secs(5 * 60);
/// A session idle past this is reaped regardless of connections.
pub const INACTIVE_THRESHOLD: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

/// Instance heartbeat refresh interval (shared-store mode).
pub const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
/// Instance heartbeat entry TTL (shared-store mode).
pub const HEARTBEAT_TTL: std::time::Duration = std::time::Duration::from_secs(60);

/// Maximum time to wait for clients to disconnect during graceful drain.
pub const DRAIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
/// Polling interval while waiting out the drain timeout.
pub const DRAIN_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

/// Per-client outbound buffer hard ceiling; the connection is closed past this.
pub const CLIENT_BUFFER_HARD_CEILING: usize = 1024 * 1024;
/// Per-client outbound buffer warn threshold.
pub const CLIENT_BUFFER_WARN_THRESHOLD: usize = 512 * 1024;

/// Per-connection rate-limit window.
pub const RATE_LIMIT_WINDOW: std::time::Duration = std::time::Duration::from_secs(1);
/// Per-connection message cap within `RATE_LIMIT_WINDOW`.
pub const RATE_LIMIT_MAX_MESSAGES: u32 = 20;
/// Per-source-address message cap per second.
pub const ADDRESS_RATE_LIMIT_MAX_MESSAGES: u32 = 30;
/// Per-source-address new-connection cap per minute.
pub const ADDRESS_RATE_LIMIT_MAX_CONNECTIONS: u32 = 20;
/// How often stale per-address rate-limit windows are swept from memory.
pub const ADDRESS_RATE_LIMIT_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

// ============================================================================
// RUNTIME UTILITIES
// ============================================================================
/// Current epoch time in milliseconds.
pub fn now_ms() -> Epoch {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves forward")
        .as_millis() as Epoch
}

/// Initialize logging for the server binary.
///
/// Prefers `env_logger` (driven by `RUST_LOG`); when `log_file` is given,
/// falls back to a combined terminal+file `simplelog` logger so operators
/// get a durable record without losing the terminal stream.
#[cfg(feature = "server")]
pub fn init_logging(log_file: Option<&std::path::Path>) {
    match log_file {
        None => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
                .init();
        }
        Some(path) => {
            let config = simplelog::ConfigBuilder::new()
                .set_location_level(log::LevelFilter::Off)
                .set_target_level(log::LevelFilter::Off)
                .set_thread_level(log::LevelFilter::Off)
                .build();
            let file = simplelog::WriteLogger::new(
                log::LevelFilter::Debug,
                config.clone(),
                std::fs::File::create(path).expect("create log file"),
            );
            let term = simplelog::TermLogger::new(
                log::LevelFilter::Info,
                config,
                simplelog::TerminalMode::Mixed,
                simplelog::ColorChoice::Auto,
            );
            simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
        }
    }
}

/// Global interrupt flag for graceful-shutdown coordination.
#[cfg(feature = "server")]
static INTERRUPTED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Register a Ctrl+C handler that flips the graceful-shutdown flag.
///
/// Unlike a hard `process::exit`, this lets `tw-server` run its drain
/// sequence (stop timers, warn clients, flush, close the store) before
/// exiting.
#[cfg(feature = "server")]
pub fn install_shutdown_signal() {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("[lifecycle] shutdown signal received, draining");
            INTERRUPTED.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });
}

/// Whether a graceful shutdown has been requested.
#[cfg(feature = "server")]
pub fn shutdown_requested() -> bool {
    INTERRUPTED.load(std::sync::atomic::Ordering::Relaxed)
}
#[cfg(not(feature = "server"))]
pub fn shutdown_requested() -> bool {
    false
}

// ============================================================================
// CLAMP HELPERS
// ============================================================================
/// Clamp a millisecond duration to `[0, MAX_TIME_MS]`.
pub fn clamp_time(ms: Millis) -> Millis {
    ms.clamp(0, MAX_TIME_MS)
}

/// Clamp a life total to `[MIN_LIFE, MAX_LIFE]`.
pub fn clamp_life(life: i32) -> i32 {
    life.clamp(MIN_LIFE, MAX_LIFE)
}

/// Clamp a counter to `[MIN_COUNTER, MAX_COUNTER]`.
pub fn clamp_counter(value: i32) -> i32 {
    value.clamp(MIN_COUNTER, MAX_COUNTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrips_through_uuid() {
        struct Marker;
        let id: ID<Marker> = ID::default();
        let raw: uuid::Uuid = id.into();
        let back: ID<Marker> = ID::from(raw);
        assert_eq!(id, back);
    }

    #[test]
    fn clamp_time_floors_at_zero_and_caps_at_24h() {
        assert_eq!(clamp_time(-5), 0);
        assert_eq!(clamp_time(MAX_TIME_MS + 1000), MAX_TIME_MS);
        assert_eq!(clamp_time(500), 500);
    }

    #[test]
    fn clamp_life_and_counter_respect_bounds() {
        assert_eq!(clamp_life(MIN_LIFE - 10), MIN_LIFE);
        assert_eq!(clamp_counter(-1), MIN_COUNTER);
        assert_eq!(clamp_counter(MAX_COUNTER + 1), MAX_COUNTER);
    }

    #[test]
    fn session_id_alphabet_is_unambiguous() {
        for ch in ['0', '1', 'I', 'O'] {
            assert!(!SESSION_ID_ALPHABET.contains(ch));
        }
        assert_eq!(SESSION_ID_ALPHABET.len(), 32);
    }
}
