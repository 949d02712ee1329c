//! Raw key-value backends
//!
//! A backend stores opaque strings under string keys, the same contract as a
//! browser's `localStorage`/`sessionStorage`. Expiry and JSON envelopes live
//! one layer up in [`StorageManager`](crate::StorageManager).
//!
//! Two implementations:
//! - [`MemoryBackend`]: process-local map, optionally with a byte quota.
//! - [`FileBackend`]: a JSON object file that survives restarts. Writes use
//!   temp-file + rename so a crash never leaves a half-written file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::error::{Result, StorageError};

/// Sentinel key written and removed by availability probes.
pub const PROBE_KEY: &str = "__storage_test__";

/// String-to-string store underneath [`StorageManager`](crate::StorageManager).
pub trait StorageBackend: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&self, key: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;

    fn keys(&self) -> Result<Vec<String>>;

    /// Check the backend accepts writes by storing and deleting [`PROBE_KEY`].
    fn probe(&self) -> Result<()> {
        self.set_item(PROBE_KEY, PROBE_KEY)?;
        self.remove_item(PROBE_KEY)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::Backend("storage lock poisoned".into()))
}

/// In-memory backend. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    items: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would push total key + value bytes over `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            items: Mutex::default(),
            quota_bytes: Some(bytes),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.items).map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.items)?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = lock(&self.items)?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded(format!(
                    "writing {key} would exceed {quota} bytes"
                )));
            }
        }
        items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        lock(&self.items)?.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        lock(&self.items)?.clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(lock(&self.items)?.keys().cloned().collect())
    }
}

/// File-backed store holding a single JSON object of string values.
///
/// The mutex serializes writers; every mutation persists the whole map.
pub struct FileBackend {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileBackend {
    /// Open the store at `path`, creating `{}` there if the file is missing.
    pub fn open(path: PathBuf) -> Result<Self> {
        let items = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| StorageError::Io(format!("reading storage file: {e}")))?;
            let items: BTreeMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| StorageError::Serialization(format!("parsing storage file: {e}")))?;
            info!(path = %path.display(), entries = items.len(), "opened storage file");
            items
        } else {
            info!(path = %path.display(), "storage file not found, starting empty");
            let items = BTreeMap::new();
            write_atomic(&path, &items)?;
            items
        };

        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let mut items = lock(&self.items)?;
        if f(&mut items) {
            write_atomic(&self.path, &items)?;
        }
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.items)?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.mutate(|items| {
            items.insert(key.to_owned(), value.to_owned());
            true
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.mutate(|items| items.remove(key).is_some())
    }

    fn clear(&self) -> Result<()> {
        self.mutate(|items| {
            let changed = !items.is_empty();
            items.clear();
            changed
        })
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(lock(&self.items)?.keys().cloned().collect())
    }

    /// Probes the lock and the parent directory instead of rewriting the
    /// file twice per operation.
    fn probe(&self) -> Result<()> {
        let _items = lock(&self.items)?;
        let dir = parent_dir(&self.path)?;
        let metadata = std::fs::metadata(dir)
            .map_err(|e| StorageError::Io(format!("storage directory unavailable: {e}")))?;
        if metadata.permissions().readonly() {
            return Err(StorageError::Io("storage directory is read-only".into()));
        }
        Ok(())
    }
}

/// Directory holding `path`; `.` for bare file names.
fn parent_dir(path: &Path) -> Result<&Path> {
    match path.parent() {
        Some(dir) if dir.as_os_str().is_empty() => Ok(Path::new(".")),
        Some(dir) => Ok(dir),
        None => Err(StorageError::Io("storage path has no parent directory".into())),
    }
}

/// Write the map to `path` via a sibling temp file and rename.
///
/// Permissions are 0600 on unix since the file holds session tokens.
fn write_atomic(path: &Path, items: &BTreeMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(items)
        .map_err(|e| StorageError::Serialization(format!("serializing storage file: {e}")))?;

    let dir = parent_dir(path)?;
    let tmp_path = dir.join(format!(".storage.tmp.{}", std::process::id()));

    std::fs::write(&tmp_path, json.as_bytes())
        .map_err(|e| StorageError::Io(format!("writing temp storage file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| StorageError::Io(format!("setting storage file permissions: {e}")))?;
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| StorageError::Io(format!("renaming temp storage file: {e}")))?;

    debug!(path = %path.display(), entries = items.len(), "persisted storage file");
    Ok(())
}
