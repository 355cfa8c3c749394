//! Cart session commands.
//!
//! # Environment Variables
//!
//! - `COCOBROWN_DATA_DIR` - Directory holding the stored cart
//! - `COCOBROWN_CART_TTL_DAYS` - Days before a stored cart expires

use std::cell::RefCell;
use std::rc::Rc;

use cocobrown_core::ProductId;
use cocobrown_storefront::{
    CartConfig, CartLoader, CartStore, CartView, KeyValueStorage, Recovery, Result,
};
use tracing::{debug, info, warn};

/// One user action applied after the cart is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Show,
    Add(ProductId),
    SetQuantity(ProductId, i64),
    Remove(ProductId),
    Clear,
}

/// Load the session cart, apply `operation`, and show the result.
///
/// # Errors
///
/// Returns an error if the catalog or data directory cannot be opened.
pub fn run(config: &CartConfig, operation: Operation) -> Result<CartView> {
    let (mut cart, recovery) = CartLoader::from_config(config)?.load();

    if let Recovery::Recovered { item_count, .. } = recovery {
        info!("Cart recovered: {item_count} items");
    }

    // Changes are rendered as they happen; a run that changes nothing
    // renders the loaded cart instead.
    let rendered = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&rendered);
    cart.subscribe(move |change| {
        debug!(action = %change.action, "Cart changed");
        let view = CartView::from(change);
        render(&view);
        *sink.borrow_mut() = Some(view);
    });

    if !apply(&mut cart, operation) {
        info!("Cart unchanged");
    }

    if cart.persist_failures() > 0 {
        warn!("Cart could not be saved; changes will be lost when this session ends");
    }

    let last_rendered = rendered.borrow_mut().take();
    Ok(last_rendered.unwrap_or_else(|| {
        let view = CartView::from(&cart);
        render(&view);
        view
    }))
}

fn apply<S: KeyValueStorage>(cart: &mut CartStore<S>, operation: Operation) -> bool {
    match operation {
        Operation::Show => true,
        Operation::Add(id) => {
            if cart.catalog().get(id).is_none() {
                warn!("Product {id} is not in the catalog");
                return false;
            }
            cart.add(id)
        }
        Operation::SetQuantity(id, quantity) => cart.set_quantity(id, quantity),
        Operation::Remove(id) => cart.remove(id),
        Operation::Clear => {
            cart.clear();
            true
        }
    }
}

fn render(view: &CartView) {
    if view.is_empty() {
        info!("Cart is empty");
        return;
    }

    for item in &view.items {
        info!(
            "{:>2} x {} ({}) = {}",
            item.quantity, item.name, item.price, item.line_price
        );
    }
    info!("{} items, subtotal {}", view.item_count, view.subtotal);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(dir: &tempfile::TempDir) -> CartConfig {
        CartConfig {
            data_dir: dir.path().to_path_buf(),
            ..CartConfig::default()
        }
    }

    #[test]
    fn test_actions_carry_over_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let brownie = ProductId::new(1);

        run(&config, Operation::Add(brownie)).unwrap();
        run(&config, Operation::Add(brownie)).unwrap();
        let view = run(&config, Operation::Show).unwrap();
        assert_eq!(view.item_count, 2);
        assert_eq!(view.subtotal, "R$ 36,00");

        let view = run(&config, Operation::SetQuantity(brownie, 150)).unwrap();
        assert_eq!(view.item_count, 99);

        let view = run(&config, Operation::Remove(brownie)).unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn test_changed_view_matches_reloaded_cart() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        let added = run(&config, Operation::Add(ProductId::new(1))).unwrap();
        let shown = run(&config, Operation::Show).unwrap();
        assert_eq!(added, shown);
        assert_eq!(added.subtotal, "R$ 18,00");
    }

    #[test]
    fn test_clear_of_empty_cart_renders_empty_view() {
        let dir = tempfile::tempdir().unwrap();
        let view = run(&config(&dir), Operation::Clear).unwrap();
        assert_eq!(view, CartView::empty());
    }

    #[test]
    fn test_unknown_product_leaves_cart_empty() {
        let dir = tempfile::tempdir().unwrap();
        let view = run(&config(&dir), Operation::Add(ProductId::new(42))).unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn test_clear_removes_stored_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);

        run(&config, Operation::Add(ProductId::new(1))).unwrap();
        let view = run(&config, Operation::Clear).unwrap();

        assert!(view.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
