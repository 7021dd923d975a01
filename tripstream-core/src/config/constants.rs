/// Server-sent event framing
pub mod sse {
    pub const DATA_PREFIX: &str = "data:";
    pub const EVENT_PREFIX: &str = "event:";
    pub const ID_PREFIX: &str = "id:";
    pub const RETRY_PREFIX: &str = "retry:";
    pub const COMMENT_PREFIX: char = ':';
    pub const DONE_MARKER: &str = "[DONE]";
    pub const CONTENT_TYPE: &str = "text/event-stream";
}

/// Event type tags as they appear on the wire
pub mod events {
    pub const START: &str = "start";
    pub const PROGRESS: &str = "progress";
    pub const CITY_DATA: &str = "city_data";
    pub const GENERAL_POIS: &str = "general_pois";
    pub const ITINERARY: &str = "itinerary";
    pub const HOTELS: &str = "hotels";
    pub const RESTAURANTS: &str = "restaurants";
    pub const ACTIVITIES: &str = "activities";
    pub const COMPLETE: &str = "complete";
    pub const ERROR: &str = "error";
    pub const CHUNK: &str = "chunk";
}

/// Default values shared by config structs and their `Default` impls
pub mod defaults {
    pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/api/v1/llm/prompt-response/chat/stream";
    pub const DEFAULT_DOMAIN: &str = "general";
    pub const CHUNK_TIMEOUT_SECS: u64 = 30;
    pub const FIRST_CHUNK_TIMEOUT_SECS: u64 = 60;
    /// Sessions that have not completed within this window are expired
    pub const SESSION_TIMEOUT_SECS: u64 = 5 * 60;
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BASE_DELAY_MS: u64 = 1_000;
    pub const MAX_DELAY_MS: u64 = 30_000;
    pub const JITTER_RATIO: f64 = 0.2;
    pub const RATE_LIMIT_RETRY_AFTER_SECS: u64 = 60;
}

/// Durable session storage layout
pub mod storage {
    pub const SESSION_FILE_PREFIX: &str = "session";
    pub const SESSION_FILE_EXTENSION: &str = "json";
    pub const SESSION_DIR_ENV: &str = "TRIPSTREAM_SESSION_DIR";
    pub const DOT_DIR: &str = ".tripstream";
    pub const SESSIONS_SUBDIR: &str = "sessions";
}

/// Config file discovery
pub mod config_files {
    pub const CONFIG_FILE_NAME: &str = "tripstream.toml";
    pub const CONFIG_DIR_NAME: &str = ".tripstream";
}
