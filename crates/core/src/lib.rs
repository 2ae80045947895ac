//! DSI Core - Cart state for the DSI storefront.
//!
//! This crate owns the visitor's shopping cart and everything it needs:
//! - `storefront` - Public site that serves the cart over HTTP/HTMX
//! - `integration-tests` - End-to-end tests against the storefront router
//!
//! # Architecture
//!
//! The core crate is synchronous and has no HTTP or async code. Persistence is
//! injected through the [`KeyValueStore`] trait, so the same [`CartStore`]
//! runs over an in-memory map in tests and over the visitor's session in the
//! storefront.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for line item ids and catalog item keys
//! - [`storage`] - The persistence adapter trait and an in-memory store
//! - [`cart`] - The validated, persisted cart

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod storage;
pub mod types;

pub use cart::{
    CART_KEY, CartItem, CartNavigation, CartStore, CountBadge, DEFAULT_IMAGE_REF, LoadOutcome,
};
pub use storage::{KeyValueStore, MemoryStore, StorageError};
pub use types::*;
