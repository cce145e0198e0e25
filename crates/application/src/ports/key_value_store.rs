//! Durable key/value storage port
//!
//! The narrow capability the token store persists through. Browser
//! persistent storage, a desktop keychain or a JSON file all fit behind it.

/// Errors raised by a key/value store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backing store is not available on this target.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Origin-scoped string key/value store.
///
/// Calls are synchronous so that a token pair can be replaced without an
/// await point in the middle of the update.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a value, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Applies several writes as one unit: `Some` sets a key, `None` removes it.
    ///
    /// The default applies them in order and, when one fails, puts back the
    /// values the earlier ones replaced. Stores that can commit everything in
    /// a single write should override it.
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    fn write_batch(&self, entries: &[(&str, Option<&str>)]) -> Result<(), StorageError> {
        let mut applied: Vec<(&str, Option<String>)> = Vec::with_capacity(entries.len());
        for &(key, value) in entries {
            let before = self.get(key)?;
            let result = match value {
                Some(value) => self.set(key, value),
                None => self.remove(key),
            };
            if let Err(e) = result {
                for (key, before) in applied.into_iter().rev() {
                    let undo = match before {
                        Some(value) => self.set(key, &value),
                        None => self.remove(key),
                    };
                    if let Err(undo_err) = undo {
                        tracing::warn!(key, error = %undo_err, "failed to roll back write");
                    }
                }
                return Err(e);
            }
            applied.push((key, before));
        }
        Ok(())
    }
}
