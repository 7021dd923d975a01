//! # tripstream-core - streaming travel sessions
//!
//! `tripstream-core` consumes the server-sent event stream of a travel-discovery
//! backend, reconciles every event into one accumulated [`AiCityResponse`] and
//! persists that model per session id so a later process can resume without
//! asking the backend again.
//!
//! ## Highlights
//!
//! - **Incremental decoding**: [`streaming::SseDecoder`] splits `data:` lines
//!   across arbitrary chunk boundaries and skips malformed events without
//!   stopping the stream.
//! - **Central merge rules**: every mutation goes through
//!   [`reconciler::apply_event`], a pure function that is easy to test.
//! - **Durable sessions**: [`session::SessionStore`] keeps one JSON record per
//!   session id and treats records older than the configured TTL as absent.
//! - **Explicit lifecycle**: [`session::SessionController::start`] returns a
//!   [`session::StreamHandle`] that can be aborted, watched and awaited.
//! - **Configuration-first**: everything is driven by `tripstream.toml`, with
//!   defaults and wire constants centralized in `config::constants`.
//!
//! ## Architecture Overview
//!
//! - `config/`: configuration loader and defaults.
//! - `client/`: HTTP transport, request shape and retry backoff.
//! - `streaming/`: SSE decoding, typed events and stream errors.
//! - `reconciler/`: merge rules and the per-session writer.
//! - `session/`: stored records, stores, observers and the lifecycle controller.
//! - `error_classifier`: raw error text to user-facing errors.
//!
//! ## Quickstart
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tripstream_core::{
//!     ConfigManager, HttpTransport, NoopObserver, SessionController, StreamRequest, SystemClock,
//!     open_store,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigManager::load()?.into_config();
//!     let transport = HttpTransport::with_config(&config.stream.endpoint, config.client.clone())?;
//!     let store = open_store(&config.storage, Arc::new(SystemClock))?;
//!
//!     let controller = SessionController::new(Arc::new(transport), store, config.stream);
//!     let request = StreamRequest::new("Three days in Paris", "itinerary").with_city("Paris");
//!     let outcome = controller.start(request, Arc::new(NoopObserver)).wait().await?;
//!
//!     println!("{}", serde_json::to_string_pretty(&outcome.data)?);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error_classifier;
pub mod model;
pub mod reconciler;
pub mod session;
pub mod streaming;
pub mod utils;

// Re-exports for convenience
pub use client::{
    Backoff, BodyReader, ClientConfig, EventTransport, HttpTransport, RetryConfig, StreamRequest,
    backoff_delay,
};
pub use config::{ConfigManager, StorageBackend, StorageConfig, StreamConfig, TripstreamConfig};
pub use error_classifier::{ErrorKind, ParsedError, classify};
pub use model::{
    AccommodationResponse, AiCityResponse, DiningResponse, GeneralCityData, ItineraryResponse, Poi,
};
pub use reconciler::{Effect, Reconciled, RedirectIntent, SessionRecorder, apply_event};
pub use session::{
    ExpiryPolicy, FileSessionStore, MemorySessionStore, NoopObserver, SessionController,
    SessionState, SessionStore, StreamHandle, StreamObserver, StreamOutcome, StreamProgress,
    StreamStatus, StreamingSession, open_store,
};
pub use streaming::{EventReader, SseDecoder, StreamEvent, StreamingError, StreamingMetrics};
pub use utils::{Clock, ManualClock, SystemClock};
