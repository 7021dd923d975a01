//! Session lifecycle: open, stream, reconcile, finish.
//!
//! Each call to [`SessionController::start`] spawns one tokio task that owns
//! the stream, the [`EventReader`] and the [`SessionRecorder`] for that
//! session. The caller gets a [`StreamHandle`] to abort the task, watch its
//! status and await the final [`StreamOutcome`].

use super::observer::{SessionState, StreamObserver, StreamProgress, StreamStatus};
use super::store::{SessionStore, StreamingSession};
use crate::client::{Backoff, EventTransport, StreamRequest};
use crate::config::StreamConfig;
use crate::error_classifier::{ParsedError, classify};
use crate::model::AiCityResponse;
use crate::reconciler::{Effect, RedirectIntent, SessionRecorder};
use crate::streaming::{EventReader, ReaderItem, StreamEvent, StreamingError, StreamingMetrics};
use crate::utils::{Clock, SystemClock, generate_session_id};
use anyhow::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Final result of one stream
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub session_id: String,
    pub state: SessionState,
    pub data: AiCityResponse,
    /// The error that ended the stream, if it errored
    pub error: Option<ParsedError>,
    pub redirect: Option<RedirectIntent>,
    pub metrics: StreamingMetrics,
}

/// Handle to a running stream
#[derive(Debug)]
pub struct StreamHandle {
    session_id: String,
    token: CancellationToken,
    status: watch::Receiver<StreamStatus>,
    task: JoinHandle<StreamOutcome>,
}

impl StreamHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stop the stream. No observer callback fires afterwards.
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Latest status snapshot
    pub fn status(&self) -> StreamStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamStatus> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> Result<StreamOutcome, StreamingError> {
        self.task.await.map_err(|error| StreamingError::Stream {
            message: format!("stream task failed: {error}"),
        })
    }
}

struct ActiveStream {
    generation: u64,
    token: CancellationToken,
    /// Cancelled once the task can no longer write to the store
    finished: CancellationToken,
}

/// Starts streams and enforces one in-flight stream per session id
pub struct SessionController {
    transport: Arc<dyn EventTransport>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    backoff: Arc<Backoff>,
    config: StreamConfig,
    active: Arc<Mutex<HashMap<String, ActiveStream>>>,
    generation: AtomicU64,
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn EventTransport>,
        store: Arc<dyn SessionStore>,
        config: StreamConfig,
    ) -> Self {
        Self {
            transport,
            store,
            clock: Arc::new(SystemClock),
            backoff: Arc::new(Backoff::default()),
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Stored session for `session_id`, if it exists and has not expired
    pub fn resume(&self, session_id: &str) -> Result<Option<StreamingSession>> {
        self.store.load(session_id)
    }

    /// Cancel the in-flight stream for `session_id`; returns whether a live one existed.
    ///
    /// The entry stays registered until the task exits so that a later
    /// `start` for the same id still waits for it.
    pub fn abort(&self, session_id: &str) -> bool {
        match self.active.lock().get(session_id) {
            Some(active) if !active.token.is_cancelled() => {
                active.token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn active_sessions(&self) -> Vec<String> {
        self.active.lock().keys().cloned().collect()
    }

    /// Start streaming `request`. A missing session id is generated locally.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, mut request: StreamRequest, observer: Arc<dyn StreamObserver>) -> StreamHandle {
        let session_id = request
            .session_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_session_id);
        request.session_id = Some(session_id.clone());

        let token = CancellationToken::new();
        let finished = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let predecessor = self
            .active
            .lock()
            .insert(
                session_id.clone(),
                ActiveStream {
                    generation,
                    token: token.clone(),
                    finished: finished.clone(),
                },
            )
            .map(|previous| {
                info!(%session_id, "cancelling in-flight stream for the same session");
                previous.token.cancel();
                previous.finished
            });

        let (status_tx, status_rx) = watch::channel(StreamStatus::new(&session_id));
        let run = StreamRun {
            transport: Arc::clone(&self.transport),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            backoff: Arc::clone(&self.backoff),
            config: self.config.clone(),
            observer,
            token: token.clone(),
            predecessor,
            status: status_tx,
            session_id: session_id.clone(),
        };

        let active = Arc::clone(&self.active);
        let registry_key = session_id.clone();
        let task = tokio::spawn(async move {
            let _finished = finished.drop_guard();
            let outcome = run.execute(request).await;
            let mut active = active.lock();
            if active
                .get(&registry_key)
                .is_some_and(|entry| entry.generation == generation)
            {
                active.remove(&registry_key);
            }
            outcome
        });

        StreamHandle {
            session_id,
            token,
            status: status_rx,
            task,
        }
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("config", &self.config)
            .field("active", &self.active_sessions())
            .finish()
    }
}

/// Why a stream stopped before reaching its natural end
enum Halt {
    Aborted,
    Failed(StreamingError),
}

/// State owned by one spawned stream task
struct StreamRun {
    transport: Arc<dyn EventTransport>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    backoff: Arc<Backoff>,
    config: StreamConfig,
    observer: Arc<dyn StreamObserver>,
    token: CancellationToken,
    /// Stream this one replaced; it must stop writing before this one begins
    predecessor: Option<CancellationToken>,
    status: watch::Sender<StreamStatus>,
    session_id: String,
}

impl StreamRun {
    async fn execute(self, request: StreamRequest) -> StreamOutcome {
        let deadline = Instant::now() + self.config.session_timeout();
        self.transition(SessionState::Connecting);
        info!(session_id = %self.session_id, domain = %request.domain, "starting stream");

        if let Some(previous) = &self.predecessor {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    return self.finish_aborted(AiCityResponse::default(), StreamingMetrics::default());
                }
                _ = previous.cancelled() => {
                    debug!(session_id = %self.session_id, "replaced stream has stopped");
                }
            }
        }

        let recorder = SessionRecorder::begin(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.session_id.clone(),
            request.domain.clone(),
            request.city.clone(),
        );
        let mut recorder = match recorder {
            Ok(recorder) => recorder,
            Err(err) => {
                let failure = StreamingError::Storage {
                    message: format!("{err:#}"),
                };
                return self.finish_failed(failure, AiCityResponse::default(), StreamingMetrics::default());
            }
        };

        let mut retries = 0usize;
        let body = loop {
            let opened = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    return self.finish_aborted(recorder.data().clone(), StreamingMetrics::default());
                }
                opened = timeout_at(deadline, self.transport.open(&request)) => opened,
            };

            match opened {
                Ok(Ok(body)) => break body,
                Ok(Err(failure)) => {
                    let attempts_made = retries as u32 + 1;
                    if !self.backoff.should_retry(attempts_made, &failure) {
                        let metrics = StreamingMetrics {
                            retry_count: retries,
                            ..StreamingMetrics::default()
                        };
                        return self.finish_failed(failure, recorder.data().clone(), metrics);
                    }

                    let delay = self.backoff.delay(retries as u32);
                    warn!(
                        session_id = %self.session_id,
                        attempt = attempts_made,
                        error = %failure,
                        ?delay,
                        "opening stream failed, retrying"
                    );
                    retries += 1;

                    tokio::select! {
                        biased;
                        _ = self.token.cancelled() => {
                            return self.finish_aborted(recorder.data().clone(), StreamingMetrics::default());
                        }
                        _ = sleep(delay) => {}
                    }
                }
                Err(_) => {
                    let failure = self.session_timeout_error();
                    return self.finish_failed(failure, recorder.data().clone(), StreamingMetrics::default());
                }
            }
        };

        self.transition(SessionState::Streaming);
        let mut reader = EventReader::new(
            body,
            self.config.first_chunk_timeout(),
            self.config.chunk_timeout(),
        );

        let result = self.pump(&mut reader, &mut recorder, deadline).await;
        let mut metrics = reader.metrics().clone();
        metrics.retry_count = retries;

        match result {
            Ok(redirect) => {
                reader.cancel();
                self.finish_complete(&mut recorder, redirect, metrics)
            }
            Err(Halt::Aborted) => {
                reader.cancel();
                self.finish_aborted(recorder.data().clone(), metrics)
            }
            Err(Halt::Failed(failure)) => {
                reader.cancel();
                self.finish_failed(failure, recorder.data().clone(), metrics)
            }
        }
    }

    /// Read and reconcile events until completion or a halt.
    /// Returns the redirect carried by the `complete` event, if any.
    async fn pump(
        &self,
        reader: &mut EventReader,
        recorder: &mut SessionRecorder,
        deadline: Instant,
    ) -> Result<Option<RedirectIntent>, Halt> {
        let mut events_received = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(Halt::Aborted),
                next = timeout_at(deadline, reader.next()) => next,
            };

            let event = match next {
                Err(_) => return Err(Halt::Failed(self.session_timeout_error())),
                Ok(Err(failure)) => return Err(Halt::Failed(failure)),
                Ok(Ok(ReaderItem::Done)) => return Ok(None),
                Ok(Ok(ReaderItem::Event(event))) => event,
            };

            if self.token.is_cancelled() {
                return Err(Halt::Aborted);
            }

            events_received += 1;
            let (effect, persisted) = recorder.apply(&event);
            if let Err(err) = persisted {
                error!(session_id = %self.session_id, error = %format!("{err:#}"), "failed to persist session");
            }

            match effect {
                Effect::Complete { redirect } => return Ok(redirect),
                Effect::Error(parsed) => {
                    warn!(
                        session_id = %self.session_id,
                        kind = %parsed.kind,
                        message = %parsed.technical_message,
                        "server reported an error"
                    );
                    self.status.send_modify(|status| status.error = Some(parsed.clone()));
                    self.notify(|observer| observer.on_error(&parsed));
                }
                Effect::Activities(activities) => {
                    self.notify(|observer| observer.on_activities(&activities));
                }
                Effect::Started { session_id } => {
                    info!(session_id = %self.session_id, server_session_id = ?session_id, "stream started");
                    self.publish_progress(&event, events_received, recorder, None);
                }
                Effect::Progress(progress) => {
                    let update = ProgressUpdate {
                        fraction: progress.progress,
                        message: progress.message,
                    };
                    self.publish_progress(&event, events_received, recorder, Some(update));
                }
                Effect::None => {
                    self.publish_progress(&event, events_received, recorder, None);
                }
            }
        }
    }

    fn publish_progress(
        &self,
        event: &StreamEvent,
        events_received: usize,
        recorder: &SessionRecorder,
        update: Option<ProgressUpdate>,
    ) {
        let mut snapshot = StreamProgress::default();
        self.status.send_modify(|status| {
            status.data = recorder.data().clone();
            status.progress.events_received = events_received;
            status.progress.last_event = Some(event.kind().to_string());
            if let Some(update) = &update {
                if let Some(fraction) = update.fraction {
                    status.progress.set_fraction(fraction);
                }
                if update.message.is_some() {
                    status.progress.message = update.message.clone();
                }
            }
            snapshot = status.progress.clone();
        });
        self.notify(|observer| observer.on_progress(&snapshot));
    }

    fn finish_complete(
        &self,
        recorder: &mut SessionRecorder,
        redirect: Option<RedirectIntent>,
        metrics: StreamingMetrics,
    ) -> StreamOutcome {
        if let Err(err) = recorder.complete() {
            error!(session_id = %self.session_id, error = %format!("{err:#}"), "failed to persist completion");
        }
        info!(
            session_id = %self.session_id,
            events = metrics.total_events,
            malformed = metrics.malformed_events,
            first_chunk_ms = metrics.first_chunk_latency().map(|latency| latency.as_millis() as u64),
            "stream complete"
        );

        let data = recorder.data().clone();
        self.status.send_modify(|status| status.data = data.clone());
        self.transition(SessionState::Complete);
        self.notify(|observer| observer.on_complete(&data));
        if let Some(intent) = &redirect {
            self.notify(|observer| observer.on_redirect(intent));
        }

        StreamOutcome {
            session_id: self.session_id.clone(),
            state: SessionState::Complete,
            data,
            error: None,
            redirect,
            metrics,
        }
    }

    fn finish_failed(
        &self,
        failure: StreamingError,
        data: AiCityResponse,
        metrics: StreamingMetrics,
    ) -> StreamOutcome {
        error!(session_id = %self.session_id, error = %failure, "stream failed");
        let parsed = classify(&failure.to_string());

        self.status.send_modify(|status| status.error = Some(parsed.clone()));
        self.transition(SessionState::Errored);
        self.notify(|observer| observer.on_error(&parsed));

        StreamOutcome {
            session_id: self.session_id.clone(),
            state: SessionState::Errored,
            data,
            error: Some(parsed),
            redirect: None,
            metrics,
        }
    }

    fn finish_aborted(&self, data: AiCityResponse, metrics: StreamingMetrics) -> StreamOutcome {
        info!(session_id = %self.session_id, "stream aborted");
        self.transition(SessionState::Aborted);

        StreamOutcome {
            session_id: self.session_id.clone(),
            state: SessionState::Aborted,
            data,
            error: None,
            redirect: None,
            metrics,
        }
    }

    fn transition(&self, state: SessionState) {
        debug!(session_id = %self.session_id, %state, "state transition");
        self.status.send_modify(|status| {
            if state == SessionState::Connecting {
                *status = StreamStatus::new(&self.session_id);
            }
            status.set_state(state);
        });
    }

    /// Run an observer callback unless the stream has been aborted
    fn notify<F>(&self, callback: F)
    where
        F: FnOnce(&dyn StreamObserver),
    {
        if self.token.is_cancelled() {
            return;
        }
        callback(self.observer.as_ref());
    }

    fn session_timeout_error(&self) -> StreamingError {
        StreamingError::Timeout {
            operation: "session".to_string(),
            duration: self.config.session_timeout(),
        }
    }
}

#[derive(Debug)]
struct ProgressUpdate {
    fraction: Option<f64>,
    message: Option<String>,
}

/// Convenience for callers that only want the end state
pub async fn run_to_completion(
    controller: &SessionController,
    request: StreamRequest,
    observer: Arc<dyn StreamObserver>,
) -> Result<StreamOutcome, StreamingError> {
    controller.start(request, observer).wait().await
}
