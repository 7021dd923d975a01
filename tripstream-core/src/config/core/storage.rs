use crate::config::constants::defaults;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where streaming sessions are persisted
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
}

/// Durable session storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Session directory; `~/.tripstream/sessions` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Age after which a stored session is treated as absent
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            directory: None,
            ttl_secs: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    defaults::SESSION_TIMEOUT_SECS
}
