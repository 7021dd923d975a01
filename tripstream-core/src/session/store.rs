use crate::model::AiCityResponse;
use crate::utils::Clock;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Durable record of one streaming session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingSession {
    pub session_id: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub data: AiCityResponse,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StreamingSession {
    pub fn new(
        session_id: impl Into<String>,
        domain: impl Into<String>,
        city: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            domain: domain.into(),
            city,
            is_complete: false,
            data: AiCityResponse::default(),
            started_at,
            completed_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.started_at > ttl
    }

    /// Mark the session complete; returns false when it already was.
    pub fn mark_complete(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_complete {
            return false;
        }
        self.is_complete = true;
        self.completed_at = Some(now);
        true
    }
}

/// Age limit applied on every read
#[derive(Clone)]
pub struct ExpiryPolicy {
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ExpiryPolicy {
    pub fn new(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(365 * 100)),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_expired(&self, session: &StreamingSession) -> bool {
        session.is_expired(self.clock.now(), self.ttl)
    }
}

impl std::fmt::Debug for ExpiryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryPolicy").field("ttl", &self.ttl).finish()
    }
}

/// Keyed storage for [`StreamingSession`] records.
///
/// Implementations treat expired sessions as absent and purge them when they
/// are encountered. Writers always replace the whole record.
pub trait SessionStore: Send + Sync {
    fn load(&self, session_id: &str) -> Result<Option<StreamingSession>>;

    fn save(&self, session: &StreamingSession) -> Result<()>;

    /// Returns whether a record existed
    fn remove(&self, session_id: &str) -> Result<bool>;

    /// Returns the number of records removed
    fn clear(&self) -> Result<usize>;

    /// Live sessions, most recently started first
    fn list(&self) -> Result<Vec<StreamingSession>>;

    fn latest(&self) -> Result<Option<StreamingSession>> {
        Ok(self.list()?.into_iter().next())
    }
}
