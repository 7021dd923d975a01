use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tripstream_core::{
    AiCityResponse, Backoff, BodyReader, ErrorKind, EventTransport, ExpiryPolicy,
    FileSessionStore, HttpTransport, ManualClock, MemorySessionStore, ParsedError, RedirectIntent,
    RetryConfig, SessionController, SessionState, SessionStore, StreamConfig, StreamObserver,
    StreamProgress, StreamRequest, StreamingError, StreamingSession,
};
use tokio::sync::Notify;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingObserver {
    progress: Mutex<Vec<StreamProgress>>,
    activities: Mutex<Vec<Value>>,
    completed: Mutex<Vec<AiCityResponse>>,
    errors: Mutex<Vec<ParsedError>>,
    redirects: Mutex<Vec<RedirectIntent>>,
}

impl StreamObserver for RecordingObserver {
    fn on_progress(&self, progress: &StreamProgress) {
        self.progress.lock().push(progress.clone());
    }

    fn on_activities(&self, activities: &Value) {
        self.activities.lock().push(activities.clone());
    }

    fn on_complete(&self, data: &AiCityResponse) {
        self.completed.lock().push(data.clone());
    }

    fn on_error(&self, error: &ParsedError) {
        self.errors.lock().push(error.clone());
    }

    fn on_redirect(&self, intent: &RedirectIntent) {
        self.redirects.lock().push(intent.clone());
    }
}

/// Sends a fixed prelude and then never ends; counts cancel hook runs.
struct HangingTransport {
    prelude: &'static str,
    cancels: Arc<AtomicUsize>,
    opens: AtomicUsize,
}

impl HangingTransport {
    fn new(prelude: &'static str) -> Self {
        Self {
            prelude,
            cancels: Arc::new(AtomicUsize::new(0)),
            opens: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EventTransport for HangingTransport {
    async fn open(&self, _request: &StreamRequest) -> Result<BodyReader, StreamingError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let prelude: Vec<Result<Bytes, StreamingError>> =
            vec![Ok(Bytes::from_static(self.prelude.as_bytes()))];
        let body = futures::stream::iter(prelude).chain(futures::stream::pending());
        let cancels = Arc::clone(&self.cancels);
        Ok(BodyReader::new(body).with_cancel_hook(move || {
            cancels.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

/// Serves one scripted body per `open`, each left hanging after its prelude.
struct ScriptedTransport {
    bodies: Mutex<VecDeque<&'static str>>,
}

impl ScriptedTransport {
    fn new(bodies: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            bodies: Mutex::new(bodies.into_iter().collect()),
        }
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn open(&self, _request: &StreamRequest) -> Result<BodyReader, StreamingError> {
        let prelude = self.bodies.lock().pop_front().unwrap_or_default();
        let prelude: Vec<Result<Bytes, StreamingError>> =
            vec![Ok(Bytes::from_static(prelude.as_bytes()))];
        Ok(BodyReader::new(
            futures::stream::iter(prelude).chain(futures::stream::pending()),
        ))
    }
}

/// Memory store that blocks the saving thread whenever the record names `slow_city`
struct SlowStore {
    inner: Arc<MemorySessionStore>,
    slow_city: &'static str,
    delay: Duration,
    slow_save_started: Notify,
}

impl SessionStore for SlowStore {
    fn load(&self, session_id: &str) -> Result<Option<StreamingSession>> {
        self.inner.load(session_id)
    }

    fn save(&self, session: &StreamingSession) -> Result<()> {
        if session.data.city_name() == Some(self.slow_city) {
            self.slow_save_started.notify_one();
            std::thread::sleep(self.delay);
        }
        self.inner.save(session)
    }

    fn remove(&self, session_id: &str) -> Result<bool> {
        self.inner.remove(session_id)
    }

    fn clear(&self) -> Result<usize> {
        self.inner.clear()
    }

    fn list(&self) -> Result<Vec<StreamingSession>> {
        self.inner.list()
    }
}

fn memory_store(clock: Arc<ManualClock>) -> Arc<MemorySessionStore> {
    Arc::new(MemorySessionStore::new(ExpiryPolicy::new(
        Duration::from_secs(300),
        clock,
    )))
}

fn fast_backoff() -> Backoff {
    Backoff::with_seed(
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            jitter_ratio: 0.2,
        },
        7,
    )
}

async fn sse_server(body: &'static str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(body, "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn http_controller(
    server: &MockServer,
    store: Arc<dyn SessionStore>,
    clock: Arc<ManualClock>,
) -> Result<SessionController> {
    let endpoint = format!("{}/stream", server.uri());
    let transport = HttpTransport::new(endpoint.clone())?;
    let config = StreamConfig {
        endpoint,
        ..StreamConfig::default()
    };
    Ok(SessionController::new(Arc::new(transport), store, config)
        .with_clock(clock)
        .with_backoff(fast_backoff()))
}

#[tokio::test]
async fn paris_day_one_is_reconciled_persisted_and_resumable() -> Result<()> {
    let body = concat!(
        "data: {\"type\":\"start\",\"data\":{\"session_id\":\"srv-1\"}}\n\n",
        "data: {\"type\":\"progress\",\"data\":{\"progress\":40,\"message\":\"Researching Paris\"}}\n\n",
        "data: {\"type\":\"city_data\",\"data\":{\"city\":\"Paris\",\"country\":\"France\"}}\n\n",
        "data: {\"type\":\"itinerary\",\"data\":{\"itinerary_name\":\"Day 1\"}}\n\n",
        "data: {\"type\":\"activities\",\"data\":[{\"name\":\"Seine cruise\"}]}\n\n",
        "data: {\"type\":\"complete\",\"data\":{\"domain\":\"itinerary\",\"session_id\":\"trip-paris\",\"city\":\"Paris\"}}\n\n",
    );
    let server = sse_server(body).await;
    let temp_dir = TempDir::new().context("failed to create temp dir")?;
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(FileSessionStore::new(
        temp_dir.path(),
        ExpiryPolicy::new(Duration::from_secs(300), clock.clone()),
    ));
    let controller = http_controller(&server, store.clone(), clock.clone())?;
    let observer = Arc::new(RecordingObserver::default());

    let request = StreamRequest::new("Plan a day in Paris", "itinerary")
        .with_city("Paris")
        .with_session_id("trip-paris");
    let outcome = controller.start(request, observer.clone()).wait().await?;

    assert_eq!(outcome.state, SessionState::Complete);
    assert_eq!(outcome.data.city_name(), Some("Paris"));
    assert_eq!(outcome.data.session_id.as_deref(), Some("srv-1"));
    assert_eq!(
        outcome.redirect,
        Some(RedirectIntent {
            domain: "itinerary".into(),
            session_id: "trip-paris".into(),
            city: "Paris".into(),
        })
    );

    assert_eq!(observer.completed.lock().len(), 1);
    assert_eq!(observer.redirects.lock().len(), 1);
    assert_eq!(observer.activities.lock().len(), 1);
    assert!(observer.errors.lock().is_empty());
    assert!(
        observer
            .progress
            .lock()
            .iter()
            .any(|p| p.fraction == Some(0.4) && p.message.as_deref() == Some("Researching Paris"))
    );

    let resumed = controller
        .resume("trip-paris")?
        .context("completed session should be resumable")?;
    assert!(resumed.is_complete);
    assert!(resumed.completed_at.is_some());
    assert_eq!(resumed.city.as_deref(), Some("Paris"));
    assert_eq!(
        resumed
            .data
            .itinerary_response
            .and_then(|itinerary| itinerary.itinerary_name)
            .as_deref(),
        Some("Day 1")
    );

    clock.advance(chrono::Duration::seconds(301));
    assert!(controller.resume("trip-paris")?.is_none());
    assert!(!store.path_for("trip-paris").exists());
    Ok(())
}

#[tokio::test]
async fn malformed_line_is_skipped_and_complete_still_processed() -> Result<()> {
    let body = concat!(
        "data: {not valid json\n",
        "data: {\"type\":\"complete\",\"data\":{}}\n",
    );
    let server = sse_server(body).await;
    let clock = Arc::new(ManualClock::default());
    let controller = http_controller(&server, memory_store(clock.clone()), clock)?;
    let observer = Arc::new(RecordingObserver::default());

    let outcome = controller
        .start(StreamRequest::new("Lisbon", "general"), observer.clone())
        .wait()
        .await?;

    assert_eq!(outcome.state, SessionState::Complete);
    assert_eq!(outcome.metrics.malformed_events, 1);
    assert_eq!(outcome.metrics.total_events, 1);
    assert!(outcome.metrics.first_chunk_latency().is_some());
    assert_eq!(observer.completed.lock().len(), 1);
    assert!(observer.redirects.lock().is_empty());
    assert!(observer.errors.lock().is_empty());
    Ok(())
}

#[tokio::test]
async fn error_event_is_surfaced_without_ending_the_stream() -> Result<()> {
    let body = concat!(
        "data: {\"type\":\"error\",\"error\":\"HTTP 500: Internal Server Error\"}\n\n",
        "data: {\"type\":\"restaurants\",\"data\":[{\"name\":\"Le Comptoir\"}]}\n\n",
    );
    let server = sse_server(body).await;
    let clock = Arc::new(ManualClock::default());
    let controller = http_controller(&server, memory_store(clock.clone()), clock)?;
    let observer = Arc::new(RecordingObserver::default());

    let handle = controller.start(
        StreamRequest::new("Where to eat", "dining").with_session_id("dining-1"),
        observer.clone(),
    );
    let status = handle.subscribe();
    let outcome = handle.wait().await?;

    let errors = observer.errors.lock().clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Server);
    assert!(errors[0].user_message.contains("Server error"));
    assert!(errors[0].can_retry);

    // A body that ends without `complete` still completes the session.
    assert_eq!(outcome.state, SessionState::Complete);
    assert_eq!(
        outcome.data.dining_response.map(|dining| dining.restaurants.len()),
        Some(1)
    );
    assert_eq!(observer.completed.lock().len(), 1);
    assert_eq!(status.borrow().state, SessionState::Complete);
    assert!(status.borrow().error.is_some());
    Ok(())
}

#[tokio::test]
async fn transient_open_failure_is_retried_before_any_event() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("data: {\"type\":\"complete\",\"data\":{}}\n", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::default());
    let controller = http_controller(&server, memory_store(clock.clone()), clock)?;
    let observer = Arc::new(RecordingObserver::default());

    let outcome = controller
        .start(StreamRequest::new("Rome", "general"), observer.clone())
        .wait()
        .await?;

    assert_eq!(outcome.state, SessionState::Complete);
    assert_eq!(outcome.metrics.retry_count, 1);
    assert!(observer.errors.lock().is_empty());
    Ok(())
}

#[tokio::test]
async fn client_error_status_fails_without_retry() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::default());
    let controller = http_controller(&server, memory_store(clock.clone()), clock)?;
    let observer = Arc::new(RecordingObserver::default());

    let outcome = controller
        .start(StreamRequest::new("Oslo", "general"), observer.clone())
        .wait()
        .await?;

    assert_eq!(outcome.state, SessionState::Errored);
    let error = outcome.error.context("errored outcome carries its error")?;
    assert_eq!(error.error_code.as_deref(), Some("404"));
    assert_eq!(error.technical_message, "HTTP 404: Not Found");
    assert_ne!(error.user_message, error.technical_message);
    assert_eq!(observer.errors.lock().len(), 1);
    assert!(observer.completed.lock().is_empty());
    Ok(())
}

#[tokio::test]
async fn abort_mid_stream_is_silent_and_cancels_reader_once() -> Result<()> {
    let transport = Arc::new(HangingTransport::new(concat!(
        "data: {\"type\":\"start\"}\n\n",
        "data: {\"type\":\"city_data\",\"data\":{\"city\":\"Paris\"}}\n\n",
    )));
    let clock = Arc::new(ManualClock::default());
    let store = memory_store(clock.clone());
    let controller =
        SessionController::new(transport.clone(), store.clone(), StreamConfig::default())
            .with_clock(clock);
    let observer = Arc::new(RecordingObserver::default());

    let handle = controller.start(
        StreamRequest::new("Paris", "general").with_session_id("to-abort"),
        observer.clone(),
    );
    let mut status = handle.subscribe();
    status
        .wait_for(|status| status.progress.events_received >= 2)
        .await?;

    handle.abort();
    handle.abort();
    let outcome = handle.wait().await?;

    assert_eq!(outcome.state, SessionState::Aborted);
    assert_eq!(outcome.data.city_name(), Some("Paris"));
    assert!(observer.completed.lock().is_empty());
    assert!(observer.errors.lock().is_empty());
    assert_eq!(transport.cancels.load(Ordering::SeqCst), 1);

    // Work reconciled before the abort stays resumable.
    let stored = store.load("to-abort")?.context("session should be stored")?;
    assert!(!stored.is_complete);
    assert_eq!(stored.data.city_name(), Some("Paris"));
    assert!(controller.active_sessions().is_empty());
    Ok(())
}

#[tokio::test]
async fn second_start_for_same_session_cancels_the_first() -> Result<()> {
    let transport = Arc::new(HangingTransport::new("data: {\"type\":\"start\"}\n\n"));
    let clock = Arc::new(ManualClock::default());
    let controller =
        SessionController::new(transport.clone(), memory_store(clock.clone()), StreamConfig::default())
            .with_clock(clock);
    let first_observer = Arc::new(RecordingObserver::default());

    let first = controller.start(
        StreamRequest::new("Paris", "general").with_session_id("shared"),
        first_observer.clone(),
    );
    let second = controller.start(
        StreamRequest::new("Paris again", "general").with_session_id("shared"),
        Arc::new(RecordingObserver::default()),
    );

    let first_outcome = first.wait().await?;
    assert_eq!(first_outcome.state, SessionState::Aborted);
    assert!(first_observer.completed.lock().is_empty());
    assert!(first_observer.errors.lock().is_empty());
    assert_eq!(controller.active_sessions(), vec!["shared".to_string()]);

    assert!(controller.abort("shared"));
    assert_eq!(second.wait().await?.state, SessionState::Aborted);
    assert!(controller.active_sessions().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn silent_stream_errors_after_chunk_timeout() -> Result<()> {
    let transport = Arc::new(HangingTransport::new("data: {\"type\":\"start\"}\n\n"));
    let clock = Arc::new(ManualClock::default());
    let config = StreamConfig {
        chunk_timeout_secs: 2,
        ..StreamConfig::default()
    };
    let controller = SessionController::new(transport.clone(), memory_store(clock.clone()), config)
        .with_clock(clock);
    let observer = Arc::new(RecordingObserver::default());

    let outcome = controller
        .start(StreamRequest::new("Kyoto", "general"), observer.clone())
        .wait()
        .await?;

    assert_eq!(outcome.state, SessionState::Errored);
    let errors = observer.errors.lock().clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::Network);
    assert!(errors[0].technical_message.contains("chunk"));
    // Read timeouts happen after the stream opened, so there is no retry.
    assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replacement_stream_waits_for_the_previous_writer() -> Result<()> {
    let transport = Arc::new(ScriptedTransport::new([
        concat!(
            "data: {\"type\":\"start\"}\n\n",
            "data: {\"type\":\"city_data\",\"data\":{\"city\":\"Old\"}}\n\n",
        ),
        concat!(
            "data: {\"type\":\"city_data\",\"data\":{\"city\":\"New\"}}\n\n",
            "data: {\"type\":\"complete\",\"data\":{}}\n\n",
        ),
    ]));
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(SlowStore {
        inner: memory_store(clock.clone()),
        slow_city: "Old",
        delay: Duration::from_millis(400),
        slow_save_started: Notify::new(),
    });
    let controller = SessionController::new(transport, store.clone(), StreamConfig::default())
        .with_clock(clock);

    let first = controller.start(
        StreamRequest::new("Somewhere", "general").with_session_id("shared"),
        Arc::new(RecordingObserver::default()),
    );
    store.slow_save_started.notified().await;

    // The first stream is mid-save when it gets replaced.
    let second = controller.start(
        StreamRequest::new("Somewhere new", "general").with_session_id("shared"),
        Arc::new(RecordingObserver::default()),
    );
    let second_outcome = second.wait().await?;
    assert_eq!(second_outcome.state, SessionState::Complete);
    assert_eq!(first.wait().await?.state, SessionState::Aborted);

    let stored = store.load("shared")?.context("session should be stored")?;
    assert_eq!(stored.data.city_name(), Some("New"));
    assert!(stored.is_complete);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stream_outliving_the_session_deadline_errors() -> Result<()> {
    let transport = Arc::new(HangingTransport::new(concat!(
        "data: {\"type\":\"start\"}\n\n",
        "data: {\"type\":\"city_data\",\"data\":{\"city\":\"Rome\"}}\n\n",
    )));
    let clock = Arc::new(ManualClock::default());
    let store = memory_store(clock.clone());
    let config = StreamConfig {
        chunk_timeout_secs: 600,
        first_chunk_timeout_secs: 600,
        session_timeout_secs: 5,
        ..StreamConfig::default()
    };
    let controller =
        SessionController::new(transport.clone(), store.clone(), config).with_clock(clock);
    let observer = Arc::new(RecordingObserver::default());

    let handle = controller.start(
        StreamRequest::new("Rome", "general").with_session_id("slow-rome"),
        observer.clone(),
    );
    let status = handle.subscribe();
    let outcome = handle.wait().await?;

    assert_eq!(outcome.state, SessionState::Errored);
    assert_eq!(outcome.data.city_name(), Some("Rome"));
    let error = outcome.error.context("deadline should report an error")?;
    assert_eq!(error.kind, ErrorKind::Network);
    assert!(error.technical_message.contains("session"));
    assert_eq!(observer.errors.lock().len(), 1);
    assert!(observer.completed.lock().is_empty());
    assert_eq!(status.borrow().state, SessionState::Errored);
    assert_eq!(transport.cancels.load(Ordering::SeqCst), 1);

    let stored = store.load("slow-rome")?.context("session should be stored")?;
    assert!(!stored.is_complete);
    Ok(())
}

#[tokio::test]
async fn rate_limit_event_carries_retry_after() -> Result<()> {
    let body = concat!(
        "data: {\"type\":\"error\",\"error\":\"HTTP 429: Too Many Requests, retry after 12 seconds\"}\n\n",
        "data: {\"type\":\"complete\",\"data\":{}}\n\n",
    );
    let server = sse_server(body).await;
    let clock = Arc::new(ManualClock::default());
    let controller = http_controller(&server, memory_store(clock.clone()), clock)?;
    let observer = Arc::new(RecordingObserver::default());

    let handle = controller.start(
        StreamRequest::new("Barcelona", "general").with_session_id("busy"),
        observer.clone(),
    );
    let status = handle.subscribe();
    let outcome = handle.wait().await?;

    assert_eq!(outcome.state, SessionState::Complete);
    let errors = observer.errors.lock().clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::RateLimit);
    assert_eq!(errors[0].retry_after, Some(12));
    assert_eq!(errors[0].error_code.as_deref(), Some("429"));
    assert!(errors[0].can_retry);
    assert_eq!(
        status.borrow().error.as_ref().and_then(|error| error.retry_after),
        Some(12)
    );
    Ok(())
}
