//! Core types for the DSI storefront cart.
//!
//! This module provides type-safe wrappers for the identifiers a cart holds.

pub mod id;
pub mod item_key;

pub use id::{LineItemId, ParseLineItemIdError};
pub use item_key::ItemKey;
