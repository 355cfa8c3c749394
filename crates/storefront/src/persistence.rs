//! Cart persistence with a time-to-live policy.
//!
//! The cart is stored under two associated keys: the payload (a JSON array of
//! `{id, name, price, imageRef, quantity}`) and the epoch-millisecond time it
//! was written. Both are committed together, timestamp last, so a reader
//! never adopts a payload without its matching timestamp.

use std::cell::Cell;
use std::rc::Rc;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use cocobrown_core::{ProductId, Quantity};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::{Number, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cart::CartItem;
use crate::storage::{KeyValueStorage, StorageError};

/// Storage key holding the serialized cart.
pub const CART_STORAGE_KEY: &str = "cocobrown_cart";

/// Storage key holding the time the cart was last written.
pub const CART_TIMESTAMP_KEY: &str = "cocobrown_cart_timestamp";

/// Days a stored cart stays valid.
pub const DEFAULT_TTL_DAYS: i64 = 7;

/// Largest payload accepted for a write (100 KiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 100 * 1024;

/// Errors that can occur while writing or clearing the stored cart.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Cart payload is {size} bytes, above the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Failed to serialize cart: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Price {0} cannot be stored as a JSON number")]
    UnrepresentablePrice(Decimal),
}

// =============================================================================
// Clock
// =============================================================================

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a test can keep a handle and advance
/// time under a store that owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        self.now.set(self.now.get() + delta);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

// =============================================================================
// Policy
// =============================================================================

/// Retention and size limits for the stored cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistencePolicy {
    /// Maximum age of a stored cart before it is treated as expired.
    pub ttl: TimeDelta,
    /// Writes whose serialized payload is larger than this are skipped.
    pub max_payload_bytes: usize,
}

impl Default for PersistencePolicy {
    fn default() -> Self {
        Self {
            ttl: TimeDelta::days(DEFAULT_TTL_DAYS),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedItem<'a> {
    id: ProductId,
    name: &'a str,
    price: Number,
    image_ref: &'a str,
    quantity: Quantity,
}

impl<'a> PersistedItem<'a> {
    fn try_from_item(item: &'a CartItem) -> Result<Self, PersistenceError> {
        let amount = item.price().amount();
        Ok(Self {
            id: item.product_id(),
            name: item.name(),
            price: decimal_to_json(amount)
                .ok_or(PersistenceError::UnrepresentablePrice(amount))?,
            image_ref: item.image_ref(),
            quantity: item.quantity(),
        })
    }
}

/// Encode a decimal as a JSON number, integral values without a fraction.
pub(crate) fn decimal_to_json(amount: Decimal) -> Option<Number> {
    let normalized = amount.normalize();
    if normalized.scale() == 0 {
        normalized.to_i64().map(Number::from)
    } else {
        normalized.to_f64().and_then(Number::from_f64)
    }
}

/// Decode a JSON number into a decimal.
pub(crate) fn decimal_from_json(number: &Number) -> Option<Decimal> {
    if let Some(n) = number.as_i64() {
        return Some(Decimal::from(n));
    }
    if let Some(n) = number.as_u64() {
        return Some(Decimal::from(n));
    }
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

enum StoredTimestamp {
    Missing,
    Invalid(String),
    At(DateTime<Utc>),
}

// =============================================================================
// PersistenceStore
// =============================================================================

/// Load and save of cart state with TTL expiry.
pub struct PersistenceStore<S> {
    storage: S,
    policy: PersistencePolicy,
    clock: Box<dyn Clock>,
}

impl<S> std::fmt::Debug for PersistenceStore<S>
where
    S: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceStore")
            .field("storage", &self.storage)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStorage> PersistenceStore<S> {
    /// Create a store that reads the wall clock.
    pub fn new(storage: S, policy: PersistencePolicy) -> Self {
        Self::with_clock(storage, policy, SystemClock)
    }

    /// Create a store with an explicit time source.
    pub fn with_clock(storage: S, policy: PersistencePolicy, clock: impl Clock + 'static) -> Self {
        Self {
            storage,
            policy,
            clock: Box::new(clock),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &PersistencePolicy {
        &self.policy
    }

    /// The underlying storage adapter.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Current time according to the store's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// When the stored cart was last written, if a valid timestamp exists.
    #[must_use]
    pub fn last_persisted_at(&self) -> Option<DateTime<Utc>> {
        match self.read_timestamp() {
            StoredTimestamp::At(at) => Some(at),
            StoredTimestamp::Missing | StoredTimestamp::Invalid(_) => None,
        }
    }

    /// Whether the stored cart has outlived the TTL.
    ///
    /// An expired (or unreadable) timestamp purges both keys. A missing
    /// timestamp is not expiry: there is simply nothing stored.
    pub fn is_expired(&mut self) -> bool {
        match self.read_timestamp() {
            StoredTimestamp::Missing => false,
            StoredTimestamp::Invalid(raw) => {
                warn!(timestamp = %raw, "Stored cart timestamp is invalid; discarding cart");
                self.purge();
                true
            }
            StoredTimestamp::At(at) => {
                let age = self.clock.now().signed_duration_since(at);
                if age <= self.policy.ttl {
                    return false;
                }
                info!(
                    ttl_days = self.policy.ttl.num_days(),
                    age_days = age.num_days(),
                    "Cart expired; items removed"
                );
                self.purge();
                true
            }
        }
    }

    /// Read the raw stored entries.
    ///
    /// Returns an empty list when nothing is stored, the payload is malformed
    /// or has no timestamp, the TTL has elapsed, or storage cannot be read.
    pub fn load(&mut self) -> Vec<Value> {
        if self.is_expired() {
            return Vec::new();
        }

        let payload = match self.storage.get(CART_STORAGE_KEY) {
            Ok(Some(payload)) => payload,
            Ok(None) => return Vec::new(),
            Err(err) => {
                error!(error = %err, "Failed to read stored cart");
                return Vec::new();
            }
        };

        if matches!(self.read_timestamp(), StoredTimestamp::Missing) {
            warn!("Stored cart has no timestamp; discarding cart");
            self.purge();
            return Vec::new();
        }

        match serde_json::from_str::<Value>(&payload) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                warn!("Stored cart is not a JSON array; ignoring");
                Vec::new()
            }
            Err(err) => {
                warn!(error = %err, "Stored cart is not valid JSON; ignoring");
                Vec::new()
            }
        }
    }

    /// Write the cart and a fresh timestamp as one unit.
    ///
    /// Returns the timestamp that was stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is above the size limit, a price
    /// cannot be encoded, or storage rejects the write. Nothing is written
    /// in any of these cases.
    pub fn save(&mut self, items: &[CartItem]) -> Result<DateTime<Utc>, PersistenceError> {
        let persisted = items
            .iter()
            .map(PersistedItem::try_from_item)
            .collect::<Result<Vec<_>, _>>()?;
        let payload = serde_json::to_string(&persisted)?;

        if payload.len() > self.policy.max_payload_bytes {
            return Err(PersistenceError::PayloadTooLarge {
                size: payload.len(),
                max: self.policy.max_payload_bytes,
            });
        }

        let now = self.clock.now();
        let millis = now.timestamp_millis();
        let stamp = millis.to_string();
        self.storage
            .commit(&[(CART_STORAGE_KEY, &payload), (CART_TIMESTAMP_KEY, &stamp)])?;

        Ok(DateTime::from_timestamp_millis(millis).unwrap_or(now))
    }

    /// Remove the payload and its timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be modified.
    pub fn clear(&mut self) -> Result<(), PersistenceError> {
        self.storage.remove(&[CART_STORAGE_KEY, CART_TIMESTAMP_KEY])?;
        Ok(())
    }

    fn purge(&mut self) {
        if let Err(err) = self.clear() {
            error!(error = %err, "Failed to purge stored cart");
        }
    }

    fn read_timestamp(&self) -> StoredTimestamp {
        let raw = match self.storage.get(CART_TIMESTAMP_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return StoredTimestamp::Missing,
            Err(err) => {
                error!(error = %err, "Failed to read stored cart timestamp");
                return StoredTimestamp::Missing;
            }
        };

        raw.trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .map_or(StoredTimestamp::Invalid(raw), StoredTimestamp::At)
    }
}
