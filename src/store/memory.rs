use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{AppError, Result};
use super::{Collection, DocumentStore, Versioned};

/// Process-local backend with the same optimistic semantics as SQLite.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<(Collection, String), Versioned>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn docs(&self) -> Result<std::sync::MutexGuard<'_, HashMap<(Collection, String), Versioned>>> {
        self.docs
            .lock()
            .map_err(|_| AppError::Internal("Memory store lock poisoned".into()))
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<Versioned>> {
        Ok(self.docs()?.get(&(collection, key.to_string())).cloned())
    }

    fn create(&self, collection: Collection, key: &str, body: &[u8]) -> Result<bool> {
        let mut docs = self.docs()?;
        let slot = (collection, key.to_string());
        if docs.contains_key(&slot) {
            return Ok(false);
        }
        docs.insert(
            slot,
            Versioned {
                version: 1,
                body: body.to_vec(),
            },
        );
        Ok(true)
    }

    fn update(&self, collection: Collection, key: &str, expected_version: i64, body: &[u8]) -> Result<bool> {
        let mut docs = self.docs()?;
        match docs.get_mut(&(collection, key.to_string())) {
            Some(stored) if stored.version == expected_version => {
                stored.version += 1;
                stored.body = body.to_vec();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
