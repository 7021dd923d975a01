use super::{Effect, apply_event};
use crate::model::AiCityResponse;
use crate::session::{SessionStore, StreamingSession};
use crate::streaming::StreamEvent;
use crate::utils::Clock;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// Sole writer of one session record while its stream runs.
///
/// Every event that changes the data, and the first completion, rewrites the
/// whole record in the store.
pub struct SessionRecorder {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    session: StreamingSession,
}

impl SessionRecorder {
    /// Create a fresh record and persist it
    pub fn begin(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        session_id: impl Into<String>,
        domain: impl Into<String>,
        city: Option<String>,
    ) -> Result<Self> {
        let session = StreamingSession::new(session_id, domain, city, clock.now());
        let recorder = Self {
            store,
            clock,
            session,
        };
        recorder.persist()?;
        Ok(recorder)
    }

    /// Reconcile one event. The in-memory record is updated even when
    /// persisting fails; the error is returned so the caller can report it.
    pub fn apply(&mut self, event: &StreamEvent) -> (Effect, Result<()>) {
        let reconciled = apply_event(Some(&self.session.data), event);
        let mut dirty = reconciled.changed;
        if reconciled.changed {
            self.session.data = reconciled.data;
        }
        if matches!(reconciled.effect, Effect::Complete { .. }) {
            dirty |= self.session.mark_complete(self.clock.now());
        }

        debug!(
            session_id = %self.session.session_id,
            event = %event.kind(),
            changed = dirty,
            "reconciled event"
        );

        let persisted = if dirty { self.persist() } else { Ok(()) };
        (reconciled.effect, persisted)
    }

    /// Mark complete without a `complete` event; returns false if already complete
    pub fn complete(&mut self) -> Result<bool> {
        if !self.session.mark_complete(self.clock.now()) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn session(&self) -> &StreamingSession {
        &self.session
    }

    pub fn data(&self) -> &AiCityResponse {
        &self.session.data
    }

    fn persist(&self) -> Result<()> {
        self.store.save(&self.session).with_context(|| {
            format!("failed to persist session {}", self.session.session_id)
        })
    }
}

impl std::fmt::Debug for SessionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecorder")
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ExpiryPolicy, MemorySessionStore};
    use crate::utils::ManualClock;
    use chrono::{Duration, Utc};

    fn setup() -> (Arc<MemorySessionStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemorySessionStore::new(ExpiryPolicy::new(
            std::time::Duration::from_secs(300),
            clock.clone(),
        )));
        (store, clock)
    }

    fn event(json: &str) -> StreamEvent {
        match StreamEvent::from_json(json) {
            Ok(event) => event,
            Err(error) => panic!("bad fixture {json}: {error}"),
        }
    }

    #[test]
    fn paris_day_one_scenario_is_persisted() -> Result<()> {
        let (store, clock) = setup();
        let mut recorder =
            SessionRecorder::begin(store.clone(), clock.clone(), "trip", "general", None)?;

        for json in [
            r#"{"type":"start"}"#,
            r#"{"type":"city_data","data":{"city":"Paris"}}"#,
            r#"{"type":"itinerary","data":{"itinerary_name":"Day 1"}}"#,
            r#"{"type":"complete","data":{}}"#,
        ] {
            let (_, persisted) = recorder.apply(&event(json));
            persisted?;
        }

        let stored = store.load("trip")?.context("session should be stored")?;
        assert_eq!(stored.data.city_name(), Some("Paris"));
        assert_eq!(
            stored
                .data
                .itinerary_response
                .and_then(|itinerary| itinerary.itinerary_name)
                .as_deref(),
            Some("Day 1")
        );
        assert!(stored.is_complete);
        Ok(())
    }

    #[test]
    fn repeated_complete_is_a_no_op() -> Result<()> {
        let (store, clock) = setup();
        let mut recorder =
            SessionRecorder::begin(store.clone(), clock.clone(), "trip", "general", None)?;

        let complete = event(r#"{"type":"complete","data":{}}"#);
        recorder.apply(&complete).1?;
        let first = recorder.session().completed_at;

        clock.advance(Duration::seconds(30));
        recorder.apply(&complete).1?;
        assert!(!recorder.complete()?);

        assert!(recorder.session().is_complete);
        assert_eq!(recorder.session().completed_at, first);
        assert_eq!(store.load("trip")?.and_then(|s| s.completed_at), first);
        Ok(())
    }

    #[test]
    fn every_merge_is_visible_in_the_store() -> Result<()> {
        let (store, clock) = setup();
        let mut recorder = SessionRecorder::begin(
            store.clone(),
            clock.clone(),
            "trip",
            "accommodation",
            Some("Paris".into()),
        )?;

        recorder
            .apply(&event(r#"{"type":"hotels","data":[{"name":"Le Bristol"}]}"#))
            .1?;
        let stored = store.load("trip")?.context("session should be stored")?;
        assert_eq!(stored.data.accommodation_response.map(|h| h.hotels.len()), Some(1));
        assert!(!stored.is_complete);
        Ok(())
    }
}
