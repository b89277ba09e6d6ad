//! Persisted consent flag.

use std::sync::Arc;

use tally_core::error::Result;

use crate::storage::Storage;

/// Reads and writes the boolean consent flag under a fixed storage key.
pub struct ConsentStore {
    storage: Arc<dyn Storage>,
    key: String,
}

impl ConsentStore {
    pub fn new(storage: Arc<dyn Storage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Whether the user has granted consent.
    ///
    /// Fails closed: a missing value, an unexpected value, or a storage error
    /// all read as `false`.
    pub fn check(&self) -> bool {
        match self.storage.get(&self.key) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(err) => {
                tracing::warn!(error = %err, key = %self.key, "could not read analytics consent");
                false
            }
        }
    }

    /// Persist the consent flag.
    pub fn store(&self, granted: bool) -> Result<()> {
        self.storage
            .set(&self.key, if granted { "true" } else { "false" })
    }
}
