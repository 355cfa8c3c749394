//! Integration tests for the Coco Brown cart engine.
//!
//! Each test builds a [`TestContext`]: a temporary data directory with
//! file-backed storage and a manual clock. Calling
//! [`TestContext::start_session`] repeats what a page load does, so tests
//! can span several sessions and move time between them.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cocobrown-integration-tests
//! ```

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use cocobrown_storefront::{
    CART_STORAGE_KEY, CART_TIMESTAMP_KEY, CartLoader, CartStore, Clock, FileStorage,
    KeyValueStorage, ManualClock, PersistencePolicy, PersistenceStore, ProductCatalog, Recovery, StorageError,
};
use tempfile::TempDir;

/// Shared fixture for cross-session cart tests.
#[derive(Debug)]
pub struct TestContext {
    dir: TempDir,
    catalog: Arc<ProductCatalog>,
    clock: ManualClock,
    policy: PersistencePolicy,
}

impl TestContext {
    /// Fixture using the built-in catalog and default policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created or the
    /// built-in catalog is invalid.
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_catalog(ProductCatalog::builtin()?)
    }

    /// Fixture using the given catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn with_catalog(catalog: ProductCatalog) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            catalog: Arc::new(catalog),
            clock: ManualClock::new(Self::epoch()),
            policy: PersistencePolicy::default(),
        })
    }

    /// Replace the persistence policy for later sessions.
    #[must_use]
    pub fn with_policy(mut self, policy: PersistencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fixed starting instant for every fixture.
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .unwrap_or_default()
    }

    /// Run the startup sequence against the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be opened.
    pub fn start_session(&self) -> Result<(CartStore<FileStorage>, Recovery), StorageError> {
        let loader = CartLoader::new(Arc::clone(&self.catalog), self.persistence()?);
        Ok(loader.load())
    }

    /// A persistence store over the same directory and clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be opened.
    pub fn persistence(&self) -> Result<PersistenceStore<FileStorage>, StorageError> {
        Ok(PersistenceStore::with_clock(
            self.storage()?,
            self.policy,
            self.clock.clone(),
        ))
    }

    /// Direct handle on the backing files.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be opened.
    pub fn storage(&self) -> Result<FileStorage, StorageError> {
        FileStorage::new(self.dir.path())
    }

    /// Overwrite the stored cart with a raw payload stamped at the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn write_raw_cart(&self, payload: &str) -> Result<(), StorageError> {
        let stamp = self.clock.now().timestamp_millis().to_string();
        self.storage()?
            .commit(&[(CART_STORAGE_KEY, payload), (CART_TIMESTAMP_KEY, &stamp)])
    }

    /// The stored cart payload, parsed.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read or the payload is not JSON.
    pub fn read_raw_cart(&self) -> Result<Option<serde_json::Value>, Box<dyn std::error::Error>> {
        match self.storage()?.get(CART_STORAGE_KEY)? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Whether either cart key is present in storage.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read.
    pub fn has_stored_cart(&self) -> Result<bool, StorageError> {
        let storage = self.storage()?;
        Ok(storage.get(CART_STORAGE_KEY)?.is_some() || storage.get(CART_TIMESTAMP_KEY)?.is_some())
    }

    /// Move the shared clock forward.
    pub fn advance(&self, delta: TimeDelta) {
        self.clock.advance(delta);
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }
}
