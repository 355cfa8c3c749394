//! Immutable product catalog.
//!
//! The catalog is static reference data: it is built once at startup, shared
//! behind an `Arc`, and exposes no way to change a product afterwards. Every
//! product gets an integrity [`Fingerprint`] over its `{id, price}` at
//! construction time so that persisted cart entries can be checked against
//! the current price.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use cocobrown_core::{Price, ProductId};
use serde::Deserialize;
use thiserror::Error;

/// Catalog shipped with the storefront.
const BUILTIN_CATALOG: &str = include_str!("../content/catalog.json");

/// Errors that can occur while building a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Product id must be positive (got {0})")]
    InvalidId(ProductId),
    #[error("Duplicate product id {0}")]
    DuplicateId(ProductId),
    #[error("Product {0} has a negative price")]
    NegativePrice(ProductId),
    #[error("Product {0} has an empty name")]
    EmptyName(ProductId),
}

/// A purchasable product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    id: ProductId,
    name: String,
    price: Price,
    #[serde(default)]
    image_ref: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    badge: Option<String>,
}

impl Product {
    /// Create a product with empty display metadata.
    #[must_use]
    pub fn new(id: ProductId, name: impl Into<String>, price: Price) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            image_ref: String::new(),
            description: String::new(),
            category: String::new(),
            badge: None,
        }
    }

    /// Set the image reference.
    #[must_use]
    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = image_ref.into();
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the badge.
    #[must_use]
    pub fn with_badge(mut self, badge: impl Into<String>) -> Self {
        self.badge = Some(badge.into());
        self
    }

    #[must_use]
    pub const fn id(&self) -> ProductId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn price(&self) -> Price {
        self.price
    }

    #[must_use]
    pub fn image_ref(&self) -> &str {
        &self.image_ref
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn badge(&self) -> Option<&str> {
        self.badge.as_deref()
    }
}

/// Integrity digest over a product's `{id, price}`.
///
/// This is a tamper-detection checksum, not a security control: a 32-bit
/// rolling hash rendered in base 36. On mismatch the catalog price wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of an `{id, price}` pair.
    ///
    /// Hashes the canonical serialization `{"id":<id>,"price":<price>}` so
    /// that equal prices written with different trailing zeros agree.
    #[must_use]
    pub fn compute(id: ProductId, price: Price) -> Self {
        let canonical = format!("{{\"id\":{id},\"price\":{}}}", price.canonical());
        let hash = canonical.encode_utf16().fold(0_i32, |hash, unit| {
            hash.wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add(i32::from(unit))
        });
        Self(to_base36(i64::from(hash).unsigned_abs()))
    }

    /// Returns the fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn to_base36(mut n: u64) -> String {
    let mut digits = Vec::new();
    loop {
        let digit = u32::try_from(n % 36).unwrap_or_default();
        digits.push(char::from_digit(digit, 36).unwrap_or('0'));
        n /= 36;
        if n == 0 {
            break;
        }
    }
    digits.iter().rev().collect()
}

/// The authoritative set of purchasable products.
#[derive(Debug)]
pub struct ProductCatalog {
    products: Vec<Product>,
    positions: HashMap<ProductId, usize>,
    fingerprints: HashMap<ProductId, Fingerprint>,
}

impl ProductCatalog {
    /// Build a catalog, validating every product.
    ///
    /// # Errors
    ///
    /// Returns an error if an id is not positive or appears twice, a price is
    /// negative, or a name is empty.
    pub fn new(products: Vec<Product>) -> Result<Self, CatalogError> {
        let mut positions = HashMap::with_capacity(products.len());
        let mut fingerprints = HashMap::with_capacity(products.len());

        for (position, product) in products.iter().enumerate() {
            if !product.id.is_positive() {
                return Err(CatalogError::InvalidId(product.id));
            }
            if product.price.is_negative() {
                return Err(CatalogError::NegativePrice(product.id));
            }
            if product.name.trim().is_empty() {
                return Err(CatalogError::EmptyName(product.id));
            }
            if positions.insert(product.id, position).is_some() {
                return Err(CatalogError::DuplicateId(product.id));
            }
            fingerprints.insert(product.id, Fingerprint::compute(product.id, product.price));
        }

        tracing::debug!(products = products.len(), "Product catalog built");

        Ok(Self {
            products,
            positions,
            fingerprints,
        })
    }

    /// Build a catalog from a JSON array of products.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a product is invalid.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let products: Vec<Product> = serde_json::from_str(json)?;
        Self::new(products)
    }

    /// Load a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its content is invalid.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The catalog shipped with the storefront.
    ///
    /// # Errors
    ///
    /// Returns an error only if the embedded catalog file is invalid.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Look up a product by id.
    #[must_use]
    pub fn get(&self, id: ProductId) -> Option<&Product> {
        self.positions
            .get(&id)
            .and_then(|&position| self.products.get(position))
    }

    /// Fingerprint recorded for a product at construction time.
    #[must_use]
    pub fn fingerprint(&self, id: ProductId) -> Option<&Fingerprint> {
        self.fingerprints.get(&id)
    }

    /// All products, in catalog order.
    pub fn iter(&self) -> std::slice::Iter<'_, Product> {
        self.products.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl<'a> IntoIterator for &'a ProductCatalog {
    type Item = &'a Product;
    type IntoIter = std::slice::Iter<'a, Product>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
