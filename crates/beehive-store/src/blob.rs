//! Blob store abstraction and the in-memory implementation.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use beehive_core::{Error, Result};

/// Key of the bounded history list inside a namespace.
pub const HISTORY_KEY: &str = "history";
/// Key of the single "current" document inside a namespace.
pub const CURRENT_KEY: &str = "current";

/// Namespaced key-value store of JSON documents.
pub trait BlobStore: Send + Sync {
    /// Read a document. `Ok(None)` when the key was never written.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<serde_json::Value>>;

    /// Overwrite a document.
    fn set(&self, namespace: &str, key: &str, value: &serde_json::Value) -> Result<()>;
}

/// Read and decode a typed document.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn BlobStore,
    namespace: &str,
    key: &str,
) -> Result<Option<T>> {
    match store.get(namespace, key)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encode and write a typed document.
pub fn write_json<T: Serialize>(
    store: &dyn BlobStore,
    namespace: &str,
    key: &str,
    value: &T,
) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.set(namespace, key, &value)
}

/// Process-local store, used by tests and when no data directory is available.
#[derive(Default)]
pub struct MemoryBlobStore {
    docs: RwLock<HashMap<(String, String), serde_json::Value>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .docs
            .read()
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    fn set(&self, namespace: &str, key: &str, value: &serde_json::Value) -> Result<()> {
        if namespace.is_empty() || key.is_empty() {
            return Err(Error::InvalidInput("namespace and key must be non-empty".into()));
        }
        self.docs
            .write()
            .insert((namespace.to_string(), key.to_string()), value.clone());
        Ok(())
    }
}
