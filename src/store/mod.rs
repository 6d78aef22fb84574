//! Document store with optimistic read-modify-write transactions.
//!
//! Backends only provide versioned get / create-if-absent / compare-and-swap
//! update. [`LicenseStore::with_document`] builds the transaction on top:
//! it loads a document, hands an owned copy to a pure body, and commits the
//! body's decision only if nobody else wrote in between. A lost race reruns
//! the whole body against the fresh state.
//!
//! Because a body may run several times before one attempt commits, bodies
//! must not do I/O, draw random numbers, or read the clock. Compute those
//! beforehand and capture the values.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{DbPool, SqliteStore};

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{AppError, Result};
use crate::identity::{MachineId, UserId};
use crate::models::{DBLicenses, DBTrial};

/// Logical collections held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// `DBLicenses` keyed by user id.
    Licenses,
    /// `DBTrial` keyed by machine id.
    Trials,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Licenses => "licenses",
            Collection::Trials => "trials",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw document bytes and the version they were read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    pub version: i64,
    pub body: Vec<u8>,
}

/// Storage backend.
pub trait DocumentStore: Send + Sync {
    fn get(&self, collection: Collection, key: &str) -> Result<Option<Versioned>>;

    /// Insert a new document at version 1. Returns `false` if one already exists.
    fn create(&self, collection: Collection, key: &str, body: &[u8]) -> Result<bool>;

    /// Replace a document if it is still at `expected_version`.
    /// Returns `false` if it moved (or vanished) since it was read.
    fn update(&self, collection: Collection, key: &str, expected_version: i64, body: &[u8])
        -> Result<bool>;
}

/// What a transaction body wants done with the document.
#[derive(Debug)]
pub enum Mutation<D> {
    /// Persist this document.
    Put(D),
    /// Leave the stored state untouched.
    Keep,
}

/// Typed access to the two licensing collections.
#[derive(Clone)]
pub struct LicenseStore {
    backend: Arc<dyn DocumentStore>,
    max_attempts: u32,
}

impl LicenseStore {
    pub fn new(backend: Arc<dyn DocumentStore>, max_attempts: u32) -> Self {
        Self {
            backend,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `body` as an optimistic transaction on one document.
    ///
    /// `body` receives the current document (`None` if absent) and returns a
    /// [`Mutation`] plus a result. The result of the attempt that commits is
    /// returned. Errors from `body` abort without writing.
    pub fn with_document<D, T, E, F>(
        &self,
        collection: Collection,
        key: &str,
        mut body: F,
    ) -> std::result::Result<T, E>
    where
        D: Serialize + DeserializeOwned,
        E: From<AppError>,
        F: FnMut(Option<D>) -> std::result::Result<(Mutation<D>, T), E>,
    {
        for attempt in 1..=self.max_attempts {
            let current = self.backend.get(collection, key)?;

            let (version, doc) = match current {
                Some(stored) => {
                    let doc: D = serde_json::from_slice(&stored.body).map_err(AppError::from)?;
                    (Some(stored.version), Some(doc))
                }
                None => (None, None),
            };

            let (mutation, output) = body(doc)?;

            let Mutation::Put(next) = mutation else {
                return Ok(output);
            };

            let bytes = serde_json::to_vec(&next).map_err(AppError::from)?;
            let committed = match version {
                Some(version) => self.backend.update(collection, key, version, &bytes)?,
                None => self.backend.create(collection, key, &bytes)?,
            };

            if committed {
                return Ok(output);
            }

            tracing::debug!(%collection, key, attempt, "Write conflict, retrying transaction");
        }

        tracing::warn!(%collection, key, attempts = self.max_attempts, "Transaction gave up");
        Err(AppError::Contention {
            collection,
            key: key.to_string(),
        }
        .into())
    }

    pub fn with_licenses<T, E, F>(&self, user_id: &UserId, body: F) -> std::result::Result<T, E>
    where
        E: From<AppError>,
        F: FnMut(Option<DBLicenses>) -> std::result::Result<(Mutation<DBLicenses>, T), E>,
    {
        self.with_document(Collection::Licenses, user_id.as_str(), body)
    }

    pub fn with_trial<T, E, F>(&self, machine_id: &MachineId, body: F) -> std::result::Result<T, E>
    where
        E: From<AppError>,
        F: FnMut(Option<DBTrial>) -> std::result::Result<(Mutation<DBTrial>, T), E>,
    {
        self.with_document(Collection::Trials, machine_id.as_str(), body)
    }

    /// Non-transactional read.
    pub fn get<D: DeserializeOwned>(&self, collection: Collection, key: &str) -> Result<Option<D>> {
        self.backend
            .get(collection, key)?
            .map(|stored| serde_json::from_slice(&stored.body).map_err(AppError::from))
            .transpose()
    }

    pub fn get_licenses(&self, user_id: &UserId) -> Result<Option<DBLicenses>> {
        self.get(Collection::Licenses, user_id.as_str())
    }

    pub fn get_trial(&self, machine_id: &MachineId) -> Result<Option<DBTrial>> {
        self.get(Collection::Trials, machine_id.as_str())
    }
}
