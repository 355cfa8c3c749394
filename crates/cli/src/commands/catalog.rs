//! Catalog listing.
//!
//! # Usage
//!
//! ```bash
//! cocobrown catalog
//!
//! # Use a different catalog file
//! COCOBROWN_CATALOG_PATH=catalog.json cocobrown catalog
//! ```

use cocobrown_storefront::{CartConfig, Product, ProductCatalog, Result};

/// Log every product in the configured catalog.
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded.
pub fn list(config: &CartConfig) -> Result<()> {
    let catalog = config.load_catalog()?;
    tracing::info!("{} products in catalog", catalog.len());
    for line in lines(&catalog) {
        tracing::info!("{line}");
    }
    Ok(())
}

fn lines(catalog: &ProductCatalog) -> Vec<String> {
    catalog.iter().map(|product| line(catalog, product)).collect()
}

fn line(catalog: &ProductCatalog, product: &Product) -> String {
    let badge = product
        .badge()
        .map(|badge| format!(" [{badge}]"))
        .unwrap_or_default();
    let fingerprint = catalog
        .fingerprint(product.id())
        .map(ToString::to_string)
        .unwrap_or_default();
    format!(
        "#{} {}{} - {} ({fingerprint})",
        product.id(),
        product.name(),
        badge,
        product.price().display(),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_lines() {
        let catalog = ProductCatalog::builtin().unwrap();
        assert_eq!(
            lines(&catalog),
            vec!["#1 Brownie Prestígio [Exclusivo] - R$ 18,00 (qr0pb2)".to_string()]
        );
    }

    #[test]
    fn test_list_reports_missing_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = CartConfig {
            catalog_path: Some(dir.path().join("missing.json")),
            ..CartConfig::default()
        };
        assert!(list(&config).is_err());
    }
}
