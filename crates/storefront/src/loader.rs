//! Startup sequence that rebuilds the cart from storage.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cart::CartStore;
use crate::catalog::ProductCatalog;
use crate::config::CartConfig;
use crate::error::Result;
use crate::integrity::IntegrityValidator;
use crate::persistence::PersistenceStore;
use crate::storage::{FileStorage, KeyValueStorage};

/// One-time signal telling the UI whether a previous cart came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// A stored cart survived validation.
    Recovered {
        /// Distinct products recovered.
        line_items: usize,
        /// Sum of recovered quantities.
        item_count: u32,
    },
    /// The session starts with an empty cart.
    NotRecovered,
}

impl Recovery {
    #[must_use]
    pub const fn is_recovered(&self) -> bool {
        matches!(self, Self::Recovered { .. })
    }
}

/// Reconciles stored cart data with the catalog and TTL policy.
#[derive(Debug)]
pub struct CartLoader<S> {
    catalog: Arc<ProductCatalog>,
    persistence: PersistenceStore<S>,
}

impl<S: KeyValueStorage> CartLoader<S> {
    pub const fn new(catalog: Arc<ProductCatalog>, persistence: PersistenceStore<S>) -> Self {
        Self {
            catalog,
            persistence,
        }
    }

    /// Build the session's cart.
    ///
    /// An expired cart is purged and the session starts empty. Otherwise the
    /// stored entries are validated; if any survive they become the initial
    /// cart and are written back, so corrected prices reach storage.
    pub fn load(mut self) -> (CartStore<S>, Recovery) {
        if self.persistence.is_expired() {
            debug!("Stored cart expired; starting empty");
            return (
                CartStore::new(self.catalog, self.persistence),
                Recovery::NotRecovered,
            );
        }

        let raw = self.persistence.load();
        let report = IntegrityValidator::new(&self.catalog).validate_with_report(&raw);

        if report.items.is_empty() {
            if !raw.is_empty() {
                debug!(dropped = report.dropped, "No stored cart entries survived validation");
            }
            return (
                CartStore::new(self.catalog, self.persistence),
                Recovery::NotRecovered,
            );
        }

        let line_items = report.items.len();
        let last_persisted_at = self.persistence.last_persisted_at();
        let mut store = CartStore::restore(
            self.catalog,
            self.persistence,
            report.items,
            last_persisted_at,
        );
        store.resave();

        let recovery = Recovery::Recovered {
            line_items,
            item_count: store.item_count(),
        };
        info!(
            line_items,
            item_count = store.item_count(),
            dropped = report.dropped,
            corrected = report.corrected,
            truncated = report.truncated,
            "Cart recovered"
        );

        (store, recovery)
    }
}

impl CartLoader<FileStorage> {
    /// Wire a loader from configuration: catalog, data directory and policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded or the data directory
    /// cannot be created.
    pub fn from_config(config: &CartConfig) -> Result<Self> {
        let catalog = Arc::new(config.load_catalog()?);
        let storage = config.open_storage()?;
        Ok(Self::new(
            catalog,
            PersistenceStore::new(storage, config.policy()),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};
    use cocobrown_core::ProductId;
    use rust_decimal::Decimal;

    use super::*;
    use crate::persistence::{
        CART_STORAGE_KEY, CART_TIMESTAMP_KEY, Clock, ManualClock, PersistencePolicy,
    };
    use crate::storage::MemoryStorage;

    fn catalog() -> Arc<ProductCatalog> {
        Arc::new(ProductCatalog::builtin().unwrap())
    }

    fn persistence(storage: &MemoryStorage, clock: &ManualClock) -> PersistenceStore<MemoryStorage> {
        PersistenceStore::with_clock(storage.clone(), PersistencePolicy::default(), clock.clone())
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap())
    }

    fn seed(storage: &mut MemoryStorage, payload: &str, stamp: i64) {
        storage
            .commit(&[(CART_STORAGE_KEY, payload), (CART_TIMESTAMP_KEY, &stamp.to_string())])
            .unwrap();
    }

    #[test]
    fn test_empty_storage_starts_empty() {
        let storage = MemoryStorage::new();
        let clock = clock();

        let (cart, recovery) = CartLoader::new(catalog(), persistence(&storage, &clock)).load();
        assert!(cart.is_empty());
        assert_eq!(recovery, Recovery::NotRecovered);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_tampered_price_is_recovered_at_catalog_price() {
        let mut storage = MemoryStorage::new();
        let clock = clock();
        seed(
            &mut storage,
            r#"[{"id":1,"name":"Brownie Prestígio","price":5,"imageRef":"x.jpg","quantity":3}]"#,
            clock.now().timestamp_millis(),
        );

        let (cart, recovery) = CartLoader::new(catalog(), persistence(&storage, &clock)).load();

        assert_eq!(
            recovery,
            Recovery::Recovered {
                line_items: 1,
                item_count: 3
            }
        );
        let item = cart.get(ProductId::new(1)).unwrap();
        assert_eq!(item.price().amount(), Decimal::from(18));
        assert_eq!(item.quantity().get(), 3);

        // Corrected price is written back.
        let stored = storage.get(CART_STORAGE_KEY).unwrap().unwrap();
        assert!(stored.contains(r#""price":18"#));
    }

    #[test]
    fn test_expired_cart_is_not_recovered() {
        let mut storage = MemoryStorage::new();
        let clock = clock();
        let eight_days_ago = clock.now() - TimeDelta::days(8);
        seed(
            &mut storage,
            r#"[{"id":1,"name":"Brownie Prestígio","price":18,"quantity":1}]"#,
            eight_days_ago.timestamp_millis(),
        );

        let (cart, recovery) = CartLoader::new(catalog(), persistence(&storage, &clock)).load();

        assert!(cart.is_empty());
        assert!(!recovery.is_recovered());
        assert!(!storage.contains(CART_STORAGE_KEY));
        assert!(!storage.contains(CART_TIMESTAMP_KEY));
    }

    #[test]
    fn test_all_entries_invalid_is_not_recovered() {
        let mut storage = MemoryStorage::new();
        let clock = clock();
        seed(
            &mut storage,
            r#"[{"id":77,"name":"Descontinuado","price":10,"quantity":1}]"#,
            clock.now().timestamp_millis(),
        );

        let (cart, recovery) = CartLoader::new(catalog(), persistence(&storage, &clock)).load();
        assert!(cart.is_empty());
        assert_eq!(recovery, Recovery::NotRecovered);
    }

    #[test]
    fn test_from_config_uses_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = CartConfig {
            data_dir: dir.path().to_path_buf(),
            ..CartConfig::default()
        };

        let (mut cart, recovery) = CartLoader::from_config(&config).unwrap().load();
        assert_eq!(recovery, Recovery::NotRecovered);
        cart.add(ProductId::new(1));

        let (cart, recovery) = CartLoader::from_config(&config).unwrap().load();
        assert!(recovery.is_recovered());
        assert_eq!(cart.item_count(), 1);
    }

    #[test]
    fn test_recovered_cart_refreshes_timestamp() {
        let mut storage = MemoryStorage::new();
        let clock = clock();
        let two_days_ago = clock.now() - TimeDelta::days(2);
        seed(
            &mut storage,
            r#"[{"id":1,"name":"Brownie Prestígio","price":18,"quantity":2}]"#,
            two_days_ago.timestamp_millis(),
        );

        let (cart, _) = CartLoader::new(catalog(), persistence(&storage, &clock)).load();
        assert_eq!(cart.last_persisted_at(), Some(clock.now()));
    }
}
