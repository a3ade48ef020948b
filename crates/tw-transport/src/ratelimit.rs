//! Sliding-window rate limiting, per §6: 20 messages/s per connection, plus
//! 30 messages/s and 20 new connections/min per source address.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use tw_core::ADDRESS_RATE_LIMIT_MAX_CONNECTIONS;
use tw_core::ADDRESS_RATE_LIMIT_MAX_MESSAGES;
use tw_core::RATE_LIMIT_MAX_MESSAGES;
use tw_core::RATE_LIMIT_WINDOW;

/// A single sliding window: timestamps of admitted events within the window,
/// oldest first.
struct Window {
    timestamps: VecDeque<Instant>,
    limit: u32,
    span: Duration,
}

impl Window {
    fn new(limit: u32, span: Duration) -> Self {
        Self {
            timestamps: VecDeque::new(),
            limit,
            span,
        }
    }

    fn admit(&mut self, now: Instant) -> bool {
        while let Some(&front) = self.timestamps.front() {
            if now.duration_since(front) > self.span {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        if self.timestamps.len() as u32 >= self.limit {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }
}

/// Per-connection message window. One instance per live transport connection.
pub struct ConnectionLimiter {
    messages: Window,
}

impl ConnectionLimiter {
    pub fn new() -> Self {
        Self {
            messages: Window::new(RATE_LIMIT_MAX_MESSAGES, RATE_LIMIT_WINDOW),
        }
    }

    pub fn admit_message(&mut self) -> bool {
        self.messages.admit(Instant::now())
    }
}

impl Default for ConnectionLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-source-address windows, shared across all connections from that
/// address. Kept by the transport layer (one entry per remote IP) rather
/// than per-session, since an address can touch many sessions.
pub struct AddressLimiter {
    messages: HashMap<String, Window>,
    connections: HashMap<String, Window>,
}

impl AddressLimiter {
    pub fn new() -> Self {
        Self {
            messages: HashMap::new(),
            connections: HashMap::new(),
        }
    }

    pub fn admit_message(&mut self, address: &str) -> bool {
        self.messages
            .entry(address.to_string())
            .or_insert_with(|| Window::new(ADDRESS_RATE_LIMIT_MAX_MESSAGES, Duration::from_secs(1)))
            .admit(Instant::now())
    }

    pub fn admit_connection(&mut self, address: &str) -> bool {
        self.connections
            .entry(address.to_string())
            .or_insert_with(|| {
                Window::new(ADDRESS_RATE_LIMIT_MAX_CONNECTIONS, Duration::from_secs(60))
            })
            .admit(Instant::now())
    }

    /// Drop windows for addresses that have been quiet past their own span,
    /// so the map doesn't grow unbounded over the life of the process.
    pub fn sweep(&mut self) {
        let now = Instant::now();
        self.messages
            .retain(|_, w| w.timestamps.back().is_some_and(|t| now.duration_since(*t) < w.span));
        self.connections
            .retain(|_, w| w.timestamps.back().is_some_and(|t| now.duration_since(*t) < w.span));
    }
}

impl Default for AddressLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_limiter_admits_up_to_the_cap_then_rejects() {
        let mut limiter = ConnectionLimiter::new();
        for _ in 0..RATE_LIMIT_MAX_MESSAGES {
            assert!(limiter.admit_message());
        }
        assert!(!limiter.admit_message());
    }

    #[test]
    fn address_limiter_tracks_messages_and_connections_independently() {
        let mut limiter = AddressLimiter::new();
        for _ in 0..ADDRESS_RATE_LIMIT_MAX_CONNECTIONS {
            assert!(limiter.admit_connection("1.2.3.4"));
        }
        assert!(!limiter.admit_connection("1.2.3.4"));
        assert!(limiter.admit_message("1.2.3.4"));
    }

    #[test]
    fn distinct_addresses_have_independent_windows() {
        let mut limiter = AddressLimiter::new();
        for _ in 0..ADDRESS_RATE_LIMIT_MAX_MESSAGES {
            assert!(limiter.admit_message("a"));
        }
        assert!(!limiter.admit_message("a"));
        assert!(limiter.admit_message("b"));
    }
}
