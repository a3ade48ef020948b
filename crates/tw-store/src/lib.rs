//! Pluggable session persistence and broadcast, per §5: an in-memory tier for
//! tests and single-process deployments, a local-durable tier (`sled`) for a
//! single long-lived instance, and a shared/networked tier (`redis`) for
//! multi-instance deployments that need cross-process fan-out and an
//! instance heartbeat registry.

pub mod error;
pub mod local;
pub mod memory;
pub mod shared;
pub mod traits;

pub use error::StoreError;
pub use error::StoreResult;
pub use local::LocalPubsub;
pub use local::LocalStore;
pub use memory::Memory;
pub use memory::MemoryPubsub;
pub use memory::MemoryStore;
pub use shared::SharedStore;
pub use traits::GLOBAL_CHANNEL;
pub use traits::Heartbeat;
pub use traits::Pubsub;
pub use traits::Store;
pub use traits::session_channel;
