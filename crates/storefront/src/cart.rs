//! Authoritative in-memory cart.
//!
//! [`CartStore`] owns the cart for one session. Every operation that changes
//! the cart writes it through the [`PersistenceStore`] and then notifies
//! subscribed listeners, synchronously and in that order. Operations never
//! fail from the caller's point of view: unknown products are ignored and
//! persistence failures only cost durability.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cocobrown_core::{Price, ProductId, Quantity};
use tracing::{debug, error, info, warn};

use crate::catalog::{Product, ProductCatalog};
use crate::error::add_breadcrumb;
use crate::persistence::{PersistenceError, PersistenceStore};
use crate::storage::KeyValueStorage;

/// Maximum number of distinct products held in one cart.
pub const MAX_LINE_ITEMS: usize = 50;

/// One product's purchase intent.
///
/// Name, price and image are a snapshot of the product when it was added.
/// Totals always use the catalog price; the snapshot only matters if the
/// product later disappears from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    product_id: ProductId,
    name: String,
    price: Price,
    image_ref: String,
    quantity: Quantity,
}

impl CartItem {
    pub(crate) fn from_product(product: &Product) -> Self {
        Self {
            product_id: product.id(),
            name: product.name().to_string(),
            price: product.price(),
            image_ref: product.image_ref().to_string(),
            quantity: Quantity::MIN,
        }
    }

    pub(crate) fn restore(
        product_id: ProductId,
        name: impl Into<String>,
        price: Price,
        image_ref: impl Into<String>,
        quantity: Quantity,
    ) -> Self {
        Self {
            product_id,
            name: name.into(),
            price,
            image_ref: image_ref.into(),
            quantity,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_quantity(mut self, quantity: Quantity) -> Self {
        self.quantity = quantity;
        self
    }

    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot price recorded when the item was added or restored.
    #[must_use]
    pub const fn price(&self) -> Price {
        self.price
    }

    #[must_use]
    pub fn image_ref(&self) -> &str {
        &self.image_ref
    }

    #[must_use]
    pub const fn quantity(&self) -> Quantity {
        self.quantity
    }
}

/// What changed the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartAction {
    Added(ProductId),
    QuantitySet(ProductId),
    Removed(ProductId),
    Cleared,
}

impl CartAction {
    /// The product the action applied to, if any.
    #[must_use]
    pub const fn product_id(&self) -> Option<ProductId> {
        match self {
            Self::Added(id) | Self::QuantitySet(id) | Self::Removed(id) => Some(*id),
            Self::Cleared => None,
        }
    }
}

impl fmt::Display for CartAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added(id) => write!(f, "Added product {id}"),
            Self::QuantitySet(id) => write!(f, "Changed quantity of product {id}"),
            Self::Removed(id) => write!(f, "Removed product {id}"),
            Self::Cleared => write!(f, "Cleared cart"),
        }
    }
}

/// Notification delivered to listeners after every change.
#[derive(Debug, Clone, Copy)]
pub struct CartChanged<'a> {
    pub action: CartAction,
    pub items: &'a [CartItem],
    pub item_count: u32,
    pub total: Price,
}

/// Handle returned by [`CartStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&CartChanged<'_>)>;

/// The session's cart.
pub struct CartStore<S> {
    catalog: Arc<ProductCatalog>,
    persistence: PersistenceStore<S>,
    items: Vec<CartItem>,
    last_persisted_at: Option<DateTime<Utc>>,
    persist_failures: u32,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl<S> fmt::Debug for CartStore<S>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CartStore")
            .field("items", &self.items)
            .field("last_persisted_at", &self.last_persisted_at)
            .field("persist_failures", &self.persist_failures)
            .field("listeners", &self.listeners.len())
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}

impl<S: KeyValueStorage> CartStore<S> {
    /// Create an empty cart.
    pub const fn new(catalog: Arc<ProductCatalog>, persistence: PersistenceStore<S>) -> Self {
        Self::restore(catalog, persistence, Vec::new(), None)
    }

    /// Create a cart from already validated items.
    pub(crate) const fn restore(
        catalog: Arc<ProductCatalog>,
        persistence: PersistenceStore<S>,
        items: Vec<CartItem>,
        last_persisted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            catalog,
            persistence,
            items,
            last_persisted_at,
            persist_failures: 0,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add one unit of a product.
    ///
    /// Increments the existing line or inserts a new one at quantity 1.
    /// Returns `false` (and does nothing) if the product is unknown, the line
    /// is already at the maximum quantity, or the cart is full.
    pub fn add(&mut self, product_id: ProductId) -> bool {
        let Some(product) = self.catalog.get(product_id) else {
            debug!(%product_id, "Ignoring add for unknown product");
            return false;
        };

        if let Some(item) = self.items.iter_mut().find(|i| i.product_id == product_id) {
            if item.quantity.is_max() {
                debug!(%product_id, "Line already at maximum quantity");
                return false;
            }
            item.quantity = item.quantity.saturating_increment();
        } else {
            if self.items.len() >= MAX_LINE_ITEMS {
                warn!(%product_id, limit = MAX_LINE_ITEMS, "Cart is full; ignoring add");
                return false;
            }
            info!(%product_id, name = product.name(), "Product added to cart");
            self.items.push(CartItem::from_product(product));
        }

        self.commit(CartAction::Added(product_id))
    }

    /// Set the quantity of a line already in the cart.
    ///
    /// Values above 99 are clamped to 99; zero or below removes the line.
    /// Returns `false` if the product is not in the cart or the quantity is
    /// unchanged.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: i64) -> bool {
        let Some(position) = self.position(product_id) else {
            debug!(%product_id, "Ignoring quantity change for product not in cart");
            return false;
        };

        let Some(quantity) = Quantity::clamped(quantity) else {
            self.items.remove(position);
            return self.commit(CartAction::Removed(product_id));
        };

        let Some(item) = self.items.get_mut(position) else {
            return false;
        };
        if item.quantity == quantity {
            return false;
        }
        item.quantity = quantity;

        self.commit(CartAction::QuantitySet(product_id))
    }

    /// Remove a line. Returns `false` if the product is not in the cart.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let Some(position) = self.position(product_id) else {
            return false;
        };
        self.items.remove(position);
        self.commit(CartAction::Removed(product_id))
    }

    /// Empty the cart and purge stored state immediately.
    ///
    /// Also resets the persistence failure counter. Returns `false` if the
    /// cart was already empty (stored state is purged regardless).
    pub fn clear(&mut self) -> bool {
        let had_items = !self.items.is_empty();
        self.items.clear();
        self.persist_failures = 0;
        self.last_persisted_at = None;

        if let Err(err) = self.persistence.clear() {
            error!(error = %err, "Failed to purge stored cart");
        }

        if !had_items {
            return false;
        }

        info!("Cart cleared");
        self.notify(CartAction::Cleared);
        true
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Sum of price times quantity, using catalog prices.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items
            .iter()
            .map(|item| self.unit_price(item).times(item.quantity))
            .sum()
    }

    /// Line total for one item, using the catalog price.
    #[must_use]
    pub fn line_total(&self, item: &CartItem) -> Price {
        self.unit_price(item).times(item.quantity)
    }

    /// Current catalog price for an item, or its snapshot if the product is
    /// no longer in the catalog.
    #[must_use]
    pub fn unit_price(&self, item: &CartItem) -> Price {
        self.catalog
            .get(item.product_id)
            .map_or(item.price, Product::price)
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .map(|item| u32::from(item.quantity.get()))
            .sum()
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// The line for a product, if present.
    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// When the cart was last written successfully.
    #[must_use]
    pub const fn last_persisted_at(&self) -> Option<DateTime<Utc>> {
        self.last_persisted_at
    }

    /// Consecutive writes that failed since the last successful one.
    #[must_use]
    pub const fn persist_failures(&self) -> u32 {
        self.persist_failures
    }

    #[must_use]
    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    #[must_use]
    pub const fn persistence(&self) -> &PersistenceStore<S> {
        &self.persistence
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register a listener called after every change.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&CartChanged<'_>) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Write the current lines back without notifying listeners.
    pub(crate) fn resave(&mut self) {
        self.persist();
    }

    fn position(&self, product_id: ProductId) -> Option<usize> {
        self.items.iter().position(|i| i.product_id == product_id)
    }

    /// Persist, then notify. Always reports the change as applied.
    fn commit(&mut self, action: CartAction) -> bool {
        let product_id = action.product_id().map(|id| id.to_string());
        let data = product_id.as_deref().map(|id| vec![("product_id", id)]);
        add_breadcrumb("cart", &action.to_string(), data.as_deref());

        self.persist();
        self.notify(action);
        true
    }

    fn persist(&mut self) {
        match self.persistence.save(&self.items) {
            Ok(saved_at) => {
                self.last_persisted_at = Some(saved_at);
                self.persist_failures = 0;
            }
            Err(PersistenceError::PayloadTooLarge { size, max }) => {
                self.persist_failures = self.persist_failures.saturating_add(1);
                warn!(bytes = size, max, "Cart payload too large; write skipped");
            }
            Err(err) => {
                self.persist_failures = self.persist_failures.saturating_add(1);
                error!(
                    error = %err,
                    failures = self.persist_failures,
                    "Failed to persist cart; continuing with in-memory state"
                );
            }
        }
    }

    fn notify(&mut self, action: CartAction) {
        let change = CartChanged {
            action,
            items: &self.items,
            item_count: self.item_count(),
            total: self.total(),
        };
        for (_, listener) in &mut self.listeners {
            listener(&change);
        }
    }
}
