//! Display snapshots of the cart for rendering collaborators.

use cocobrown_core::Price;
use serde::Serialize;

use crate::cart::{CartChanged, CartItem, CartStore};
use crate::storage::KeyValueStorage;

/// Cart item display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItemView {
    pub id: i32,
    pub name: String,
    pub image_ref: String,
    pub quantity: u8,
    pub price: String,
    pub line_price: String,
}

/// Cart display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: String,
    pub item_count: u32,
}

impl CartView {
    /// Create an empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            subtotal: Price::zero().display(),
            item_count: 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl CartItemView {
    fn new(item: &CartItem, unit_price: Price) -> Self {
        Self {
            id: item.product_id().as_i32(),
            name: item.name().to_string(),
            image_ref: item.image_ref().to_string(),
            quantity: item.quantity().get(),
            price: unit_price.display(),
            line_price: unit_price.times(item.quantity()).display(),
        }
    }
}

impl<S: KeyValueStorage> From<&CartStore<S>> for CartView {
    fn from(cart: &CartStore<S>) -> Self {
        Self {
            items: cart
                .items()
                .iter()
                .map(|item| CartItemView::new(item, cart.unit_price(item)))
                .collect(),
            subtotal: cart.total().display(),
            item_count: cart.item_count(),
        }
    }
}

/// Line prices come from the item snapshots. Both `add` and startup recovery
/// take them from the catalog.
impl From<&CartChanged<'_>> for CartView {
    fn from(change: &CartChanged<'_>) -> Self {
        Self {
            items: change
                .items
                .iter()
                .map(|item| CartItemView::new(item, item.price()))
                .collect(),
            subtotal: change.total.display(),
            item_count: change.item_count,
        }
    }
}
