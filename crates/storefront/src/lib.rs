//! Coco Brown storefront cart engine.
//!
//! A single-session shopping cart backed by local key-value storage. The
//! cart survives restarts for a limited time, and everything read back from
//! storage is checked against the immutable product catalog before use.
//!
//! ```rust,ignore
//! let config = CartConfig::from_env()?;
//! let (mut cart, recovery) = CartLoader::from_config(&config)?.load();
//! cart.add(ProductId::new(1));
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod integrity;
pub mod loader;
pub mod persistence;
pub mod storage;
pub mod view;

pub use cart::{CartAction, CartChanged, CartItem, CartStore, MAX_LINE_ITEMS, SubscriptionId};
pub use catalog::{CatalogError, Fingerprint, Product, ProductCatalog};
pub use config::{CartConfig, ConfigError};
pub use error::{Result, StorefrontError};
pub use integrity::{IntegrityValidator, RejectReason, ValidationReport};
pub use loader::{CartLoader, Recovery};
pub use persistence::{
    CART_STORAGE_KEY, CART_TIMESTAMP_KEY, Clock, ManualClock, PersistenceError,
    PersistencePolicy, PersistenceStore, SystemClock,
};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use view::{CartItemView, CartView};
