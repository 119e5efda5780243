//! Durable persistence for the two session tokens.
//!
//! Pure storage, no policy: the coordinator and the session context decide
//! when entries are written or cleared.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Error;
use crate::types::StoreKey;

/// Key/value persistence for session tokens.
///
/// Operations are synchronous. A missing entry is `None`, never an error.
///
/// # Example
///
/// ```rust,ignore
/// struct KeychainStore { service: String }
///
/// impl SessionStore for KeychainStore {
///     fn get(&self, key: StoreKey) -> Option<String> {
///         keyring::Entry::new(&self.service, key.as_str()).ok()?.get_password().ok()
///     }
///     fn set(&self, key: StoreKey, value: &str) -> Result<(), Error> { /* ... */ }
///     fn clear(&self, key: StoreKey) -> Result<(), Error> { /* ... */ }
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Read an entry.
    fn get(&self, key: StoreKey) -> Option<String>;

    /// Write an entry, replacing any previous value.
    fn set(&self, key: StoreKey, value: &str) -> Result<(), Error>;

    /// Remove an entry. Removing a missing entry succeeds.
    fn clear(&self, key: StoreKey) -> Result<(), Error>;
}

/// Remove both tokens. Failures are logged; the caller is already tearing the session down.
pub(crate) fn clear_tokens(store: &dyn SessionStore) {
    for key in StoreKey::ALL {
        if let Err(e) = store.clear(key) {
            tracing::warn!(error = %e, key = %key, "Failed to clear session entry");
        }
    }
}

/// Process-local store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        self.entries.lock().get(&key).cloned()
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), Error> {
        self.entries.lock().insert(key, value.to_owned());
        Ok(())
    }

    fn clear(&self, key: StoreKey) -> Result<(), Error> {
        self.entries.lock().remove(&key);
        Ok(())
    }
}

/// JSON-file store that survives restarts.
///
/// The file holds `{"access_token": "...", "refresh_token": "..."}`. It is
/// read once at [`open`](FileStore::open) and rewritten (temp file + rename)
/// on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the file exists but cannot be read or is not a JSON object.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => HashMap::new(),
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::Store(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(Error::Store(format!("{}: {e}", path.display()))),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temp file in the same directory, then rename. The file is owner-only (0600 on Unix).
    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), Error> {
        let store_err = |e: std::io::Error| Error::Store(format!("{}: {e}", self.path.display()));

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(store_err)?;

        let json = serde_json::to_vec_pretty(entries)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(store_err)?;
        tmp.write_all(&json).map_err(store_err)?;
        tmp.as_file().sync_all().map_err(store_err)?;
        tmp.persist(&self.path).map_err(|e| store_err(e.error))?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: StoreKey) -> Option<String> {
        self.entries.lock().get(key.as_str()).cloned()
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), Error> {
        let mut entries = self.entries.lock();
        entries.insert(key.as_str().to_owned(), value.to_owned());
        self.persist(&entries)
    }

    fn clear(&self, key: StoreKey) -> Result<(), Error> {
        let mut entries = self.entries.lock();
        if entries.remove(key.as_str()).is_none() {
            return Ok(());
        }
        self.persist(&entries)
    }
}
