use super::store::{ExpiryPolicy, SessionStore, StreamingSession};
use crate::config::StorageConfig;
use crate::config::constants::storage;
use crate::utils::session_file_key;
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One pretty-printed JSON document per session id
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
    expiry: ExpiryPolicy,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>, expiry: ExpiryPolicy) -> Self {
        Self {
            dir: dir.into(),
            expiry,
        }
    }

    pub fn from_config(config: &StorageConfig, expiry: ExpiryPolicy) -> Result<Self> {
        Ok(Self::new(resolve_sessions_dir(config)?, expiry))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!(
            "{}-{}.{}",
            storage::SESSION_FILE_PREFIX,
            session_file_key(session_id),
            storage::SESSION_FILE_EXTENSION
        ))
    }

    fn read(&self, path: &Path) -> Result<Option<StreamingSession>> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read session file: {}", path.display()));
            }
        };

        match serde_json::from_str::<StreamingSession>(&data) {
            Ok(session) => Ok(Some(session)),
            Err(error) => {
                warn!(path = %path.display(), %error, "ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    /// Remove the file when the session has expired; returns whether it is still live
    fn purge_if_expired(&self, path: &Path, session: &StreamingSession) -> Result<bool> {
        if !self.expiry.is_expired(session) {
            return Ok(true);
        }
        warn!(session_id = %session.session_id, "purging expired session");
        remove_file_if_exists(path)?;
        Ok(false)
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, session_id: &str) -> Result<Option<StreamingSession>> {
        let path = self.path_for(session_id);
        let Some(session) = self.read(&path)? else {
            return Ok(None);
        };
        if session.session_id != session_id {
            warn!(path = %path.display(), %session_id, "session file belongs to another id");
            return Ok(None);
        }
        if !self.purge_if_expired(&path, &session)? {
            return Ok(None);
        }
        Ok(Some(session))
    }

    fn save(&self, session: &StreamingSession) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("failed to create session directory: {}", self.dir.display())
        })?;

        let path = self.path_for(&session.session_id);
        let payload =
            serde_json::to_string_pretty(session).context("failed to serialize session")?;

        // Write to a sibling file first so readers never observe a torn document.
        let staging = path.with_extension(format!("{}.tmp", storage::SESSION_FILE_EXTENSION));
        fs::write(&staging, payload)
            .with_context(|| format!("failed to write session file: {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("failed to replace session file: {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, session_id: &str) -> Result<bool> {
        let path = self.path_for(session_id);
        if self
            .read(&path)?
            .is_some_and(|session| session.session_id != session_id)
        {
            return Ok(false);
        }
        remove_file_if_exists(&path)
    }

    fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.session_files()? {
            if remove_file_if_exists(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<StreamingSession>> {
        let mut sessions = Vec::new();
        for path in self.session_files()? {
            let Some(session) = self.read(&path)? else {
                continue;
            };
            if self.purge_if_expired(&path, &session)? {
                sessions.push(session);
            }
        }

        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(sessions)
    }
}

impl FileSessionStore {
    fn session_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir).with_context(|| {
            format!("failed to read session directory: {}", self.dir.display())
        })? {
            let entry = entry.with_context(|| {
                format!("failed to read session entry in {}", self.dir.display())
            })?;
            let path = entry.path();
            if is_session_file(&path) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

/// Session directory: `TRIPSTREAM_SESSION_DIR`, then the configured directory,
/// then `~/.tripstream/sessions`.
pub fn resolve_sessions_dir(config: &StorageConfig) -> Result<PathBuf> {
    if let Some(custom) = env::var_os(storage::SESSION_DIR_ENV) {
        return Ok(PathBuf::from(custom));
    }
    if let Some(dir) = &config.directory {
        return Ok(dir.clone());
    }

    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(storage::DOT_DIR).join(storage::SESSIONS_SUBDIR))
}

fn is_session_file(path: &Path) -> bool {
    let has_prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(storage::SESSION_FILE_PREFIX))
        .unwrap_or(false);
    let has_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(storage::SESSION_FILE_EXTENSION))
        .unwrap_or(false);
    has_prefix && has_extension
}

fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error)
            .with_context(|| format!("failed to remove session file: {}", path.display())),
    }
}
