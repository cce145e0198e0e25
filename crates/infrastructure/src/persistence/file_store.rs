//! File-based key/value store.
//!
//! Values are kept in a single JSON document, by default in the
//! platform-specific config directory:
//! - Linux: ~/.config/sessionkit/session.json
//! - macOS: ~/Library/Application Support/sessionkit/session.json
//! - Windows: %APPDATA%/sessionkit/session.json

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sessionkit_application::ports::{KeyValueStore, StorageError};

use crate::serialization::{from_json_bytes, to_json_stable_bytes};

const SCHEMA_VERSION: u32 = 1;

/// On-disk layout:
/// ```json
/// {
///   "schema_version": 1,
///   "values": {
///     "access_token": "eyJhbGciOi...",
///     "refresh_token": "d1f0c2..."
///   }
/// }
/// ```
#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    schema_version: u32,
    #[serde(default)]
    values: BTreeMap<String, String>,
}

/// Key/value store persisted to one JSON file.
///
/// The document is read once on open and rewritten in full on every change,
/// through a temporary file renamed over the original.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Opens the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(content) => {
                let document: SessionDocument = from_json_bytes(&content)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                document.values
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), entries = values.len(), "opened session file");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Opens the store at [`FileKeyValueStore::default_path`].
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if there is no config directory on this
    /// platform, or any error from [`FileKeyValueStore::open`].
    pub fn open_default() -> Result<Self, StorageError> {
        let path = Self::default_path().ok_or_else(|| {
            StorageError::Unavailable("could not determine config directory".to_string())
        })?;
        Self::open(path)
    }

    /// `<config dir>/sessionkit/session.json`, if the platform has one.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("sessionkit").join("session.json"))
    }

    /// The file this store writes to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = to_json_stable_bytes(&SessionDocument {
            schema_version: SCHEMA_VERSION,
            values: values.clone(),
        })
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let staging = self.path.with_extension("json.tmp");
        let mut file = private_file(&staging)?;
        file.write_all(&content)?;
        file.sync_all()?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn private_file(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn private_file(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        if values.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        self.save(&next)?;
        *values = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.save(&next)?;
        *values = next;
        Ok(())
    }

    /// One document rewrite for the whole batch.
    fn write_batch(&self, entries: &[(&str, Option<&str>)]) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        let mut next = values.clone();
        for &(key, value) in entries {
            match value {
                Some(value) => next.insert(key.to_string(), value.to_string()),
                None => next.remove(key),
            };
        }
        if next == *values {
            return Ok(());
        }
        self.save(&next)?;
        *values = next;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::open(dir.path().join("session.json")).unwrap();

        assert_eq!(store.get("access_token").unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileKeyValueStore::open(&path).unwrap();
        store.set("access_token", "a1").unwrap();
        store.set("refresh_token", "r1").unwrap();
        drop(store);

        let reopened = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(reopened.get("access_token").unwrap().as_deref(), Some("a1"));
        assert_eq!(reopened.get("refresh_token").unwrap().as_deref(), Some("r1"));
    }

    #[test]
    fn test_document_is_stable_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileKeyValueStore::open(&path).unwrap();

        store.set("refresh_token", "r1").unwrap();
        store.set("access_token", "a1").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "{\n  \"schema_version\": 1,\n  \"values\": {\n    \"access_token\": \"a1\",\n    \"refresh_token\": \"r1\"\n  }\n}\n"
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileKeyValueStore::open(&path).unwrap();

        store.remove("refresh_token").unwrap();
        store.set("access_token", "a1").unwrap();
        store.remove("access_token").unwrap();

        let reopened = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(reopened.get("access_token").unwrap(), None);
    }

    #[test]
    fn test_batch_sets_and_removes_together() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileKeyValueStore::open(&path).unwrap();
        store.set("refresh_token", "r1").unwrap();

        store
            .write_batch(&[("access_token", Some("a2")), ("refresh_token", None)])
            .unwrap();

        let reopened = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(reopened.get("access_token").unwrap().as_deref(), Some("a2"));
        assert_eq!(reopened.get("refresh_token").unwrap(), None);
    }

    #[test]
    fn test_failed_batch_leaves_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileKeyValueStore::open(&path).unwrap();
        store
            .write_batch(&[("access_token", Some("a1")), ("refresh_token", Some("r1"))])
            .unwrap();

        // The staging file cannot be created over a directory.
        fs::create_dir(path.with_extension("json.tmp")).unwrap();
        let result =
            store.write_batch(&[("access_token", Some("a2")), ("refresh_token", Some("r2"))]);

        assert!(matches!(result, Err(StorageError::Io(_))));
        assert_eq!(store.get("access_token").unwrap().as_deref(), Some("a1"));
        let reopened = FileKeyValueStore::open(&path).unwrap();
        assert_eq!(reopened.get("access_token").unwrap().as_deref(), Some("a1"));
        assert_eq!(reopened.get("refresh_token").unwrap().as_deref(), Some("r1"));
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{ nope").unwrap();

        let result = FileKeyValueStore::open(&path);
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileKeyValueStore::open(&path).unwrap();
        store.set("access_token", "a1").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_default_path_is_under_sessionkit() {
        if let Some(path) = FileKeyValueStore::default_path() {
            assert!(path.ends_with("sessionkit/session.json"));
        }
    }
}
