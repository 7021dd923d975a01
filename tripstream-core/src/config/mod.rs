//! Configuration for tripstream
//!
//! Settings are read from `tripstream.toml` (see [`loader::ConfigManager`] for the
//! search order). Every field has a default, so an empty or missing file yields a
//! working configuration pointed at a local backend.

pub mod constants;
pub mod core;
pub mod loader;

pub use crate::client::ClientConfig;
pub use core::{RetrySettings, StorageBackend, StorageConfig, StreamConfig};
pub use loader::{ConfigManager, TripstreamConfig};
