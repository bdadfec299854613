//! Session token persistence.
//!
//! # Design
//! The client never touches ambient global state; it receives a
//! `SessionStore` and reads/writes the three well-known keys through it.
//! Writes are per key and last-writer-wins, so a login stores its three
//! values as three independent operations.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

/// Keys the client persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Username,
    /// The access token.
    Token,
    Refresh,
}

impl SessionKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKey::Username => "username",
            SessionKey::Token => "token",
            SessionKey::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("session store encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("session store lock poisoned")]
    Poisoned,
}

impl<T> From<PoisonError<T>> for StoreError {
    fn from(_: PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

/// Key-value store for session state, the local-storage of a native host.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: SessionKey) -> Result<Option<String>, StoreError>;

    fn set(&self, key: SessionKey, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: SessionKey) -> Result<(), StoreError>;

    /// Drop both tokens. The username is kept for display.
    fn clear_tokens(&self) -> Result<(), StoreError> {
        self.remove(SessionKey::Token)?;
        self.remove(SessionKey::Refresh)
    }
}

impl<S: SessionStore + ?Sized> SessionStore for std::sync::Arc<S> {
    fn get(&self, key: SessionKey) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: SessionKey, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: SessionKey) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<SessionKey, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: SessionKey) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read()?.get(&key).cloned())
    }

    fn set(&self, key: SessionKey, value: &str) -> Result<(), StoreError> {
        self.entries.write()?.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: SessionKey) -> Result<(), StoreError> {
        self.entries.write()?.remove(&key);
        Ok(())
    }
}

/// Store backed by a JSON object on disk.
///
/// Each write reads the current file, applies one change and replaces the
/// whole file through a temp file and rename, so readers see either the old
/// or the new contents. A missing file is an empty session; so is one that
/// does not parse, which the next write then overwrites.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "session file unreadable, starting empty");
                HashMap::new()
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let raw = serde_json::to_string_pretty(entries)?;
        // Same directory as the target so the rename never crosses filesystems.
        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        staged.write_all(raw.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, String>)) -> Result<(), StoreError> {
        let _guard = self.lock.write()?;
        let mut entries = self.load()?;
        apply(&mut entries);
        self.save(&entries)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: SessionKey) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.read()?;
        Ok(self.load()?.remove(key.as_str()))
    }

    fn set(&self, key: SessionKey, value: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.insert(key.as_str().to_string(), value.to_string());
        })
    }

    fn remove(&self, key: SessionKey) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.remove(key.as_str());
        })
    }
}
