//! Coco Brown Core - Shared types library.
//!
//! This crate provides the domain primitives used by the cart engine
//! (`cocobrown-storefront`) and the command-line driver (`cocobrown-cli`).
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no storage access, no
//! clocks. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for product IDs, prices, and quantities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
