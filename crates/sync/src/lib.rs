//! Offline-first synchronization core: connectivity signal, cached reads,
//! the reconciliation engine and its background scheduler.

pub mod cache;
pub mod connectivity;
pub mod context;
pub mod engine;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheService, CacheStatus};
pub use connectivity::{ConnectivityMonitor, Operation};
pub use context::SyncContext;
pub use engine::{SyncEngine, SyncEngineConfig};
pub use scheduler::{SchedulerConfig, SyncScheduler};
