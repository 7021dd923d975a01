pub mod retry;
pub mod storage;
pub mod stream;

pub use retry::RetrySettings;
pub use storage::{StorageBackend, StorageConfig};
pub use stream::StreamConfig;
