//! Session persistence and lifecycle

pub mod controller;
pub mod file_store;
pub mod memory_store;
pub mod observer;
pub mod store;

pub use controller::{SessionController, StreamHandle, StreamOutcome, run_to_completion};
pub use file_store::{FileSessionStore, resolve_sessions_dir};
pub use memory_store::MemorySessionStore;
pub use observer::{NoopObserver, SessionState, StreamObserver, StreamProgress, StreamStatus};
pub use store::{ExpiryPolicy, SessionStore, StreamingSession};

use crate::config::{StorageBackend, StorageConfig};
use crate::utils::Clock;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Build the store selected by `config`
pub fn open_store(config: &StorageConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn SessionStore>> {
    let expiry = ExpiryPolicy::new(Duration::from_secs(config.ttl_secs), clock);
    Ok(match config.backend {
        StorageBackend::File => Arc::new(FileSessionStore::from_config(config, expiry)?),
        StorageBackend::Memory => Arc::new(MemorySessionStore::new(expiry)),
    })
}
