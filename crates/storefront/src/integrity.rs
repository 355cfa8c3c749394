//! Validation of persisted cart entries against the catalog.
//!
//! Stored data is never trusted. Each raw entry is checked structurally and
//! matched to a catalog product. Restored items always carry the catalog
//! price; a stored price that differs (by fingerprint or by value) is logged
//! and counted as a correction rather than dropping the entry, so the product
//! and quantity survive a price change.

use std::collections::HashSet;

use cocobrown_core::{Price, ProductId, Quantity, QuantityError};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cart::{CartItem, MAX_LINE_ITEMS};
use crate::catalog::{Fingerprint, ProductCatalog};
use crate::persistence::decimal_from_json;

/// Why a stored entry was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("entry is not an object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("`id` is not a positive integer")]
    InvalidId,
    #[error("`name` is not a non-empty string")]
    InvalidName,
    #[error("`price` is not a positive number")]
    InvalidPrice,
    #[error("`quantity` is not an integer: {0}")]
    QuantityNotInteger(String),
    #[error("invalid quantity: {0}")]
    InvalidQuantity(#[from] QuantityError),
    #[error("product {0} is not in the catalog")]
    UnknownProduct(ProductId),
    #[error("product {0} appears more than once")]
    DuplicateProduct(ProductId),
}

/// Outcome of validating a stored cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Entries that survived, in their original order.
    pub items: Vec<CartItem>,
    /// Entries dropped as malformed, stale, or duplicated.
    pub dropped: usize,
    /// Entries whose price was replaced with the catalog price.
    pub corrected: usize,
    /// Valid entries cut off by the line-item limit.
    pub truncated: usize,
}

/// Checks stored entries against a catalog.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityValidator<'a> {
    catalog: &'a ProductCatalog,
}

impl<'a> IntegrityValidator<'a> {
    #[must_use]
    pub const fn new(catalog: &'a ProductCatalog) -> Self {
        Self { catalog }
    }

    /// Validate raw entries and return the clean cart items.
    #[must_use]
    pub fn validate(&self, raw: &[Value]) -> Vec<CartItem> {
        self.validate_with_report(raw).items
    }

    /// Validate raw entries, also reporting what was dropped or corrected.
    #[must_use]
    pub fn validate_with_report(&self, raw: &[Value]) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut seen = HashSet::new();

        for (index, entry) in raw.iter().enumerate() {
            let checked = self
                .check_entry(entry)
                .and_then(|(item, corrected)| {
                    if seen.insert(item.product_id()) {
                        Ok((item, corrected))
                    } else {
                        Err(RejectReason::DuplicateProduct(item.product_id()))
                    }
                });

            match checked {
                Ok((item, corrected)) => {
                    if corrected {
                        report.corrected += 1;
                    }
                    report.items.push(item);
                }
                Err(reason) => {
                    debug!(index, %reason, "Dropping stored cart entry");
                    report.dropped += 1;
                }
            }
        }

        if report.items.len() > MAX_LINE_ITEMS {
            report.truncated = report.items.len() - MAX_LINE_ITEMS;
            report.items.truncate(MAX_LINE_ITEMS);
            warn!(
                truncated = report.truncated,
                limit = MAX_LINE_ITEMS,
                "Stored cart exceeds line-item limit; truncating"
            );
        }

        report
    }

    /// Check one entry. Returns the item and whether its price was corrected.
    fn check_entry(&self, entry: &Value) -> Result<(CartItem, bool), RejectReason> {
        let fields = entry.as_object().ok_or(RejectReason::NotAnObject)?;

        let product_id = parse_id(fields)?;
        let name = parse_name(fields)?;
        let stored_price = parse_price(fields)?;
        let quantity = parse_quantity(fields)?;

        let product = self
            .catalog
            .get(product_id)
            .ok_or(RejectReason::UnknownProduct(product_id))?;

        let image_ref = fields
            .get("imageRef")
            .and_then(Value::as_str)
            .unwrap_or_else(|| product.image_ref());

        // The catalog price always wins.
        let catalog_price = product.price();
        let corrected = stored_price.is_none_or(|stored| {
            let expected = self.catalog.fingerprint(product_id);
            expected != Some(&Fingerprint::compute(product_id, stored)) || stored != catalog_price
        });
        if corrected {
            warn!(
                %product_id,
                stored_price = %stored_price.map_or_else(|| raw_price(fields), |p| p.canonical()),
                catalog_price = %catalog_price.canonical(),
                "Stored cart price does not match catalog; using catalog price"
            );
        }

        let item = CartItem::restore(product_id, name, catalog_price, image_ref, quantity);
        Ok((item, corrected))
    }
}

fn required<'v>(fields: &'v Map<String, Value>, key: &'static str) -> Result<&'v Value, RejectReason> {
    match fields.get(key) {
        None | Some(Value::Null) => Err(RejectReason::MissingField(key)),
        Some(value) => Ok(value),
    }
}

fn parse_id(fields: &Map<String, Value>) -> Result<ProductId, RejectReason> {
    required(fields, "id")?
        .as_i64()
        .and_then(|id| i32::try_from(id).ok())
        .map(ProductId::new)
        .filter(ProductId::is_positive)
        .ok_or(RejectReason::InvalidId)
}

fn parse_name(fields: &Map<String, Value>) -> Result<&str, RejectReason> {
    required(fields, "name")?
        .as_str()
        .filter(|name| !name.trim().is_empty())
        .ok_or(RejectReason::InvalidName)
}

/// A positive stored price, or `None` when it is positive but too large or
/// precise to hold as a decimal.
fn parse_price(fields: &Map<String, Value>) -> Result<Option<Price>, RejectReason> {
    let Value::Number(number) = required(fields, "price")? else {
        return Err(RejectReason::InvalidPrice);
    };
    if !number.as_f64().is_some_and(|n| n.is_finite() && n > 0.0) {
        return Err(RejectReason::InvalidPrice);
    }
    Ok(decimal_from_json(number)
        .map(Price::new)
        .filter(Price::is_positive))
}

fn raw_price(fields: &Map<String, Value>) -> String {
    fields
        .get("price")
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn parse_quantity(fields: &Map<String, Value>) -> Result<Quantity, RejectReason> {
    let value = required(fields, "quantity")?;
    let quantity = value
        .as_i64()
        .ok_or_else(|| RejectReason::QuantityNotInteger(value.to_string()))?;
    Ok(Quantity::parse(quantity)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::*;
    use crate::catalog::Product;

    fn catalog() -> ProductCatalog {
        ProductCatalog::new(vec![
            Product::new(ProductId::new(1), "Brownie Prestígio", Price::new(Decimal::from(18)))
                .with_image("imagens/brownie_prestigio.jpg"),
            Product::new(ProductId::new(2), "Brownie Nutella", Price::new(Decimal::new(2250, 2))),
        ])
        .unwrap()
    }

    #[test]
    fn test_accepts_valid_entry() {
        let catalog = catalog();
        let raw = vec![json!({
            "id": 1, "name": "Brownie Prestígio", "price": 18,
            "imageRef": "imagens/brownie_prestigio.jpg", "quantity": 3
        })];

        let report = IntegrityValidator::new(&catalog).validate_with_report(&raw);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.corrected, 0);

        let item = report.items.first().unwrap();
        assert_eq!(item.product_id(), ProductId::new(1));
        assert_eq!(item.quantity().get(), 3);
        assert_eq!(item.price().amount(), Decimal::from(18));
    }

    #[test]
    fn test_tampered_price_is_corrected_not_dropped() {
        let catalog = catalog();
        let raw = vec![json!({"id": 1, "name": "Brownie Prestígio", "price": 5, "quantity": 3})];

        let report = IntegrityValidator::new(&catalog).validate_with_report(&raw);
        assert_eq!(report.corrected, 1);

        let item = report.items.first().unwrap();
        assert_eq!(item.price().amount(), Decimal::from(18));
        assert_eq!(item.quantity().get(), 3);
    }

    #[test]
    fn test_price_with_colliding_fingerprint_uses_catalog_price() {
        let catalog = catalog();
        let stored = Price::new("83.8770666".parse().unwrap());
        assert_eq!(
            Fingerprint::compute(ProductId::new(1), stored),
            Fingerprint::compute(ProductId::new(1), Price::new(Decimal::from(18)))
        );

        let raw = vec![json!({"id": 1, "name": "Brownie", "price": 83.877_066_6, "quantity": 3})];
        let report = IntegrityValidator::new(&catalog).validate_with_report(&raw);

        assert_eq!(report.corrected, 1);
        let item = report.items.first().unwrap();
        assert_eq!(item.price().amount(), Decimal::from(18));
        assert_eq!(item.quantity().get(), 3);
    }

    #[test]
    fn test_unrepresentable_price_is_healed() {
        let catalog = catalog();
        let raw: Vec<Value> =
            serde_json::from_str(r#"[{"id":1,"name":"Brownie","price":1e30,"quantity":3}]"#).unwrap();

        let report = IntegrityValidator::new(&catalog).validate_with_report(&raw);

        assert_eq!(report.dropped, 0);
        assert_eq!(report.corrected, 1);
        let item = report.items.first().unwrap();
        assert_eq!(item.price().amount(), Decimal::from(18));
        assert_eq!(item.quantity().get(), 3);
    }

    #[test]
    fn test_equal_price_with_different_scale_is_not_a_correction() {
        let catalog = catalog();
        let raw = vec![json!({"id": 1, "name": "Brownie", "price": 18.0, "quantity": 1})];
        let report = IntegrityValidator::new(&catalog).validate_with_report(&raw);
        assert_eq!(report.corrected, 0);
        assert_eq!(report.items.len(), 1);
    }

    #[test]
    fn test_fractional_catalog_price_matches() {
        let catalog = catalog();
        let raw = vec![json!({"id": 2, "name": "Brownie Nutella", "price": 22.5, "quantity": 1})];

        let report = IntegrityValidator::new(&catalog).validate_with_report(&raw);
        assert_eq!(report.corrected, 0);
        assert_eq!(report.items.first().unwrap().price().amount(), Decimal::new(225, 1));
    }

    #[test]
    fn test_missing_image_falls_back_to_catalog() {
        let catalog = catalog();
        let raw = vec![json!({"id": 1, "name": "Brownie", "price": 18, "quantity": 1})];

        let items = IntegrityValidator::new(&catalog).validate(&raw);
        assert_eq!(items.first().unwrap().image_ref(), "imagens/brownie_prestigio.jpg");
    }

    #[test]
    fn test_drops_structurally_invalid_entries() {
        let catalog = catalog();
        let raw = vec![
            json!("not an object"),
            json!({"name": "x", "price": 18, "quantity": 1}),
            json!({"id": "1", "name": "x", "price": 18, "quantity": 1}),
            json!({"id": -1, "name": "x", "price": 18, "quantity": 1}),
            json!({"id": 1, "name": "", "price": 18, "quantity": 1}),
            json!({"id": 1, "name": "x", "price": "18", "quantity": 1}),
            json!({"id": 1, "name": "x", "price": 0, "quantity": 1}),
            json!({"id": 1, "name": "x", "price": 18, "quantity": 0}),
            json!({"id": 1, "name": "x", "price": 18, "quantity": 100}),
            json!({"id": 1, "name": "x", "price": 18, "quantity": 2.5}),
            json!({"id": 1, "name": "x", "price": 18, "quantity": null}),
        ];

        let report = IntegrityValidator::new(&catalog).validate_with_report(&raw);
        assert!(report.items.is_empty());
        assert_eq!(report.dropped, raw.len());
    }

    #[test]
    fn test_drops_unknown_products() {
        let catalog = catalog();
        let raw = vec![json!({"id": 99, "name": "Descontinuado", "price": 10, "quantity": 1})];
        assert!(IntegrityValidator::new(&catalog).validate(&raw).is_empty());
    }

    #[test]
    fn test_keeps_first_of_duplicate_products() {
        let catalog = catalog();
        let raw = vec![
            json!({"id": 1, "name": "a", "price": 18, "quantity": 2}),
            json!({"id": 1, "name": "b", "price": 18, "quantity": 7}),
        ];

        let report = IntegrityValidator::new(&catalog).validate_with_report(&raw);
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items.first().unwrap().quantity().get(), 2);
        assert_eq!(report.dropped, 1);
    }

    #[test]
    fn test_preserves_order_and_truncates() {
        let products = (1..=80)
            .map(|id| Product::new(ProductId::new(id), format!("P{id}"), Price::new(Decimal::from(10))))
            .collect();
        let catalog = ProductCatalog::new(products).unwrap();
        let raw: Vec<Value> = (1..=80)
            .map(|id| json!({"id": id, "name": format!("P{id}"), "price": 10, "quantity": 1}))
            .collect();

        let report = IntegrityValidator::new(&catalog).validate_with_report(&raw);
        assert_eq!(report.items.len(), MAX_LINE_ITEMS);
        assert_eq!(report.truncated, 30);

        let ids: Vec<i32> = report.items.iter().map(|i| i.product_id().as_i32()).collect();
        assert_eq!(ids, (1..=50).collect::<Vec<_>>());
    }

    #[test]
    fn test_reject_reason_messages() {
        assert_eq!(RejectReason::MissingField("id").to_string(), "missing field `id`");
        assert_eq!(
            RejectReason::UnknownProduct(ProductId::new(9)).to_string(),
            "product 9 is not in the catalog"
        );
    }
}
