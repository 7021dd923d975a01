//! Small shared helpers

pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

/// Turn an arbitrary session id into a safe file-name component
pub fn sanitize_component(value: &str) -> String {
    let mut normalized = String::new();
    let mut last_was_separator = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            normalized.push(ch.to_ascii_lowercase());
            last_was_separator = false;
        } else if matches!(ch, '-' | '_') {
            if !last_was_separator {
                normalized.push(ch);
                last_was_separator = true;
            }
        } else if !last_was_separator {
            normalized.push('-');
            last_was_separator = true;
        }
    }

    let trimmed = normalized.trim_matches(|c| c == '-' || c == '_');
    if trimmed.is_empty() {
        "session".to_string()
    } else {
        trimmed.to_string()
    }
}

/// File stem for a session id. Sanitizing alone folds case and punctuation,
/// so a digest of the raw id keeps distinct ids in distinct files.
pub fn session_file_key(session_id: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}", sanitize_component(session_id), &digest[..12])
}

/// Locally generated session id: UTC timestamp plus a random suffix
pub fn generate_session_id() -> String {
    use rand::Rng;

    let suffix: u32 = rand::thread_rng().gen_range(0..0x10_0000);
    format!("{}-{suffix:05x}", chrono::Utc::now().format("%Y%m%dT%H%M%S"))
}
