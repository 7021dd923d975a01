use crate::error_classifier::ParsedError;
use crate::model::AiCityResponse;
use crate::reconciler::RedirectIntent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Complete,
    Errored,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Errored | Self::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Errored => "errored",
            Self::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamProgress {
    pub session_id: String,
    pub state: SessionState,
    pub events_received: usize,
    /// Completion estimate in `0.0..=1.0` when the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fraction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event: Option<String>,
}

impl StreamProgress {
    /// Accepts fractions and percentages
    pub fn set_fraction(&mut self, reported: f64) {
        if !reported.is_finite() {
            return;
        }
        let fraction = if reported > 1.0 { reported / 100.0 } else { reported };
        self.fraction = Some(fraction.clamp(0.0, 1.0));
    }
}

/// Snapshot published on the status channel after every transition and event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStatus {
    pub session_id: String,
    pub state: SessionState,
    pub progress: StreamProgress,
    pub data: AiCityResponse,
    /// Most recent surfaced error
    pub error: Option<ParsedError>,
}

impl StreamStatus {
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            progress: StreamProgress {
                session_id: session_id.clone(),
                ..StreamProgress::default()
            },
            session_id,
            ..Self::default()
        }
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.progress.state = state;
    }
}

/// Callbacks for a running stream; every method defaults to a no-op.
///
/// None of these are invoked after the stream has been aborted.
pub trait StreamObserver: Send + Sync {
    fn on_progress(&self, _progress: &StreamProgress) {}

    fn on_activities(&self, _activities: &Value) {}

    fn on_complete(&self, _data: &AiCityResponse) {}

    fn on_error(&self, _error: &ParsedError) {}

    fn on_redirect(&self, _intent: &RedirectIntent) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StreamObserver for NoopObserver {}
