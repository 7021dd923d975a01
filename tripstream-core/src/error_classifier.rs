//! Turns raw error text from the stream or the transport into a user-facing error.
//!
//! Classification is a case-insensitive substring match, checked in priority
//! order: rate limit, network, validation, server, then unknown. Every class is
//! marked retryable so the caller can always offer a retry.

use crate::config::constants::defaults;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    Network,
    Validation,
    Server,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Server => "server",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified error as shown to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub user_message: String,
    pub technical_message: String,
    /// Suggested wait before retrying, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    pub can_retry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl std::fmt::Display for ParsedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.user_message)
    }
}

const RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "quota",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "resource_exhausted",
];

const NETWORK_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "network",
    "connection",
    "fetch",
    "econnrefused",
    "econnreset",
    "dns",
    "unreachable",
];

const VALIDATION_MARKERS: &[&str] = &[
    "validation",
    "invalid",
    "parse",
    "json",
    "bad request",
    "400",
    "422",
];

const SERVER_MARKERS: &[&str] = &[
    "500",
    "502",
    "503",
    "504",
    "internal server error",
    "server error",
    "bad gateway",
    "service unavailable",
];

static RETRY_AFTER: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)retry\s+(?:in|after)\s+(\d+(?:\.\d+)?)\s*(?:s\b|sec|second)").ok()
});

static HTTP_STATUS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\b([45]\d{2})\b").ok());

/// Classify raw error text
pub fn classify(raw: &str) -> ParsedError {
    let lowered = raw.to_lowercase();
    let error_code = HTTP_STATUS
        .as_ref()
        .and_then(|pattern| pattern.captures(raw))
        .and_then(|captures| captures.get(1))
        .map(|code| code.as_str().to_string());

    let contains_any = |markers: &[&str]| markers.iter().any(|marker| lowered.contains(marker));

    let (kind, retry_after, user_message) = if contains_any(RATE_LIMIT_MARKERS) {
        let wait = retry_after_secs(raw).unwrap_or(defaults::RATE_LIMIT_RETRY_AFTER_SECS);
        (
            ErrorKind::RateLimit,
            Some(wait),
            format!("Too many requests. Please wait {wait} seconds before trying again."),
        )
    } else if contains_any(NETWORK_MARKERS) {
        (
            ErrorKind::Network,
            None,
            "Network error. Please check your connection and try again.".to_string(),
        )
    } else if contains_any(VALIDATION_MARKERS) {
        (
            ErrorKind::Validation,
            None,
            "The request could not be processed. Please adjust your input and try again."
                .to_string(),
        )
    } else if contains_any(SERVER_MARKERS) {
        (
            ErrorKind::Server,
            None,
            "Server error. Please try again in a moment.".to_string(),
        )
    } else {
        (
            ErrorKind::Unknown,
            None,
            "Something went wrong. Please try again.".to_string(),
        )
    };

    ParsedError {
        kind,
        user_message,
        technical_message: raw.to_string(),
        retry_after,
        can_retry: true,
        error_code,
    }
}

fn retry_after_secs(raw: &str) -> Option<u64> {
    let seconds: f64 = RETRY_AFTER
        .as_ref()?
        .captures(raw)?
        .get(1)?
        .as_str()
        .parse()
        .ok()?;
    Some(seconds.ceil().max(1.0) as u64)
}
