//! Persisted shopping cart.
//!
//! [`CartStore`] owns the visitor's cart. Every read goes through a validated
//! load and every write replaces the whole stored sequence.
//!
//! # Stored layout
//!
//! The cart lives under [`CART_KEY`] as a JSON array:
//!
//! ```text
//! [{"id": 1712345678901.42, "itemKey": "p1", "label": "Extintor PQS", "imageRef": "img/pqs.jpg"}]
//! ```
//!
//! An absent key means an empty cart. An empty cart is never stored as `[]`:
//! whenever a load finds nothing valid, the key is removed.
//!
//! # Repair on load
//!
//! Blobs that don't parse, and records without an item key, are dropped
//! instead of failing the caller. [`CartStore::load_checked`] reports whether
//! that happened.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::storage::{KeyValueStore, StorageError};
use crate::types::{ItemKey, LineItemId};

/// Storage key holding the serialized cart.
pub const CART_KEY: &str = "carrito";

/// Image shown for line items added without one.
pub const DEFAULT_IMAGE_REF: &str = "assets/placeholder.jpg";

/// One line item in a cart.
///
/// The same catalog item may appear several times as separate line items.
/// Construct through [`CartItem::new`], which fills defaults and assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(default, deserialize_with = "lenient_id")]
    id: LineItemId,
    #[serde(alias = "nameId")]
    item_key: ItemKey,
    #[serde(default, alias = "nombre", deserialize_with = "lenient_text")]
    label: String,
    #[serde(default, alias = "imagenSrc", deserialize_with = "lenient_text")]
    image_ref: String,
}

impl CartItem {
    /// Build a line item with a freshly generated id.
    ///
    /// `image_ref` falls back to `placeholder_image` when missing or empty.
    #[must_use]
    pub fn new(item_key: &str, label: &str, image_ref: Option<&str>, placeholder_image: &str) -> Self {
        let image_ref = image_ref
            .filter(|image| !image.is_empty())
            .unwrap_or(placeholder_image);

        Self {
            id: LineItemId::generate(),
            item_key: ItemKey::new(item_key),
            label: label.to_string(),
            image_ref: image_ref.to_string(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> LineItemId {
        self.id
    }

    #[must_use]
    pub const fn item_key(&self) -> &ItemKey {
        &self.item_key
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn image_ref(&self) -> &str {
        &self.image_ref
    }
}

// Only the item key decides whether a stored record is valid. The other
// fields fall back to defaults instead of failing the record.

/// Read a stored id from a number or numeric string; anything else is `0`.
fn lenient_id<'de, D>(deserializer: D) -> Result<LineItemId, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().map(LineItemId::new).unwrap_or_default(),
        Value::String(text) => text.parse().unwrap_or_default(),
        _ => LineItemId::default(),
    })
}

/// Read display text, keeping scalars as their text; `null`, arrays and
/// objects read as empty.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    })
}

/// Result of a validated load.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadOutcome {
    /// Valid line items, in stored order.
    pub items: Vec<CartItem>,
    /// True when the stored blob was unparseable or records were dropped.
    pub repaired: bool,
}

/// Where the "view cart" control should take the visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartNavigation {
    /// The cart has items; open the cart page.
    Open,
    /// The cart is empty; stay on the current page.
    Stay,
}

/// Anything that displays the cart's item count.
pub trait CountBadge: Send + Sync {
    /// Show `count` as the current number of line items.
    fn render(&self, count: usize);
}

/// The visitor's cart over an injected [`KeyValueStore`].
///
/// ```
/// use dsi_core::{CartNavigation, CartStore, MemoryStore};
///
/// let cart = CartStore::new(MemoryStore::new());
/// assert_eq!(cart.go_to_cart(), CartNavigation::Stay);
///
/// cart.add_item("p2", "Widget", None).unwrap();
/// assert_eq!(cart.get_count(), 1);
/// assert_eq!(cart.go_to_cart(), CartNavigation::Open);
/// ```
pub struct CartStore<S> {
    storage: S,
    placeholder_image: String,
    badge: Option<Arc<dyn CountBadge>>,
}

impl<S: KeyValueStore> CartStore<S> {
    /// Create a cart over `storage` with the default placeholder image.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            placeholder_image: DEFAULT_IMAGE_REF.to_string(),
            badge: None,
        }
    }

    /// Use a different placeholder for items added without an image.
    #[must_use]
    pub fn with_placeholder_image(mut self, placeholder_image: impl Into<String>) -> Self {
        self.placeholder_image = placeholder_image.into();
        self
    }

    /// Attach a badge that is re-rendered after every change.
    #[must_use]
    pub fn with_badge(mut self, badge: Arc<dyn CountBadge>) -> Self {
        self.badge = Some(badge);
        self
    }

    /// Borrow the underlying storage.
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Give back the underlying storage, e.g. to flush it.
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Load the cart, dropping invalid records, and report whether any repair
    /// was needed.
    ///
    /// Never fails: an unreadable store is logged and treated as empty. When
    /// nothing valid remains, the stored key is removed.
    pub fn load_checked(&self) -> LoadOutcome {
        let (items, repaired) = match self.storage.get(CART_KEY) {
            Ok(Some(raw)) => parse_items(&raw, &self.placeholder_image),
            Ok(None) => (Vec::new(), false),
            Err(e) => {
                warn!(error = %e, "Failed to read stored cart, treating as empty");
                return LoadOutcome::default();
            }
        };

        if repaired {
            debug!(kept = items.len(), "Dropped invalid cart data on load");
        }

        if items.is_empty() {
            if let Err(e) = self.storage.remove(CART_KEY) {
                warn!(error = %e, "Failed to remove empty cart");
            }
        }

        LoadOutcome { items, repaired }
    }

    /// Load the validated cart.
    pub fn load_cart(&self) -> Vec<CartItem> {
        self.load_checked().items
    }

    /// Number of valid line items, always recomputed from storage.
    pub fn get_count(&self) -> usize {
        self.load_cart().len()
    }

    /// Append a line item and persist the cart. Returns the new count.
    ///
    /// An empty `item_key` is not rejected here; the record is stored and
    /// dropped by the next load, so it never shows up in the count.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the cart cannot be written, e.g. when the
    /// store's quota is exceeded.
    pub fn add_item(
        &self,
        item_key: &str,
        label: &str,
        image_ref: Option<&str>,
    ) -> Result<usize, StorageError> {
        let item = CartItem::new(item_key, label, image_ref, &self.placeholder_image);
        if !item.item_key().is_present() {
            warn!(label, "Adding line item without item key, it will be dropped on next load");
        }

        let mut items = self.load_cart();
        items.push(item);
        self.save(&items)?;

        let count = self.render_cart_count();
        info!(item_key, label, count, "Line item added to cart");
        Ok(count)
    }

    /// Remove the line item with the given id. Returns whether one was found.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the remaining cart cannot be written.
    pub fn remove_item(&self, id: LineItemId) -> Result<bool, StorageError> {
        let mut items = self.load_cart();
        let Some(position) = items.iter().position(|item| item.id() == id) else {
            debug!(%id, "Line item not in cart");
            return Ok(false);
        };

        let removed = items.remove(position);
        if items.is_empty() {
            self.storage.remove(CART_KEY)?;
        } else {
            self.save(&items)?;
        }

        let count = self.render_cart_count();
        info!(item_key = %removed.item_key(), count, "Line item removed from cart");
        Ok(true)
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the stored cart cannot be deleted.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(CART_KEY)?;
        self.render_cart_count();
        info!("Cart cleared");
        Ok(())
    }

    /// Decide whether the visitor can be sent to the cart page.
    ///
    /// An empty cart is a normal outcome, logged for operators only.
    pub fn go_to_cart(&self) -> CartNavigation {
        let count = self.get_count();
        if count > 0 {
            debug!(count, "Opening cart");
            CartNavigation::Open
        } else {
            info!("Cart is empty, add products first");
            CartNavigation::Stay
        }
    }

    /// Re-read the cart and push its count to the badge. Returns the count.
    pub fn render_cart_count(&self) -> usize {
        let count = self.get_count();
        if let Some(badge) = &self.badge {
            badge.render(count);
        }
        count
    }

    fn save(&self, items: &[CartItem]) -> Result<(), StorageError> {
        let blob =
            serde_json::to_string(items).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(CART_KEY, &blob)
    }
}

/// Parse a stored blob into valid items. The flag is set when anything was
/// discarded.
fn parse_items(raw: &str, placeholder_image: &str) -> (Vec<CartItem>, bool) {
    let entries = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(Value::Null) => return (Vec::new(), false),
        Ok(_) | Err(_) => return (Vec::new(), true),
    };

    let total = entries.len();
    let items: Vec<CartItem> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<CartItem>(entry).ok())
        .filter(|item| item.item_key.is_present())
        .map(|mut item| {
            if item.image_ref.is_empty() {
                item.image_ref = placeholder_image.to_string();
            }
            item
        })
        .collect();

    let repaired = items.len() != total;
    (items, repaired)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::storage::MemoryStore;

    /// Badge that records every count it is asked to show.
    #[derive(Default)]
    struct RecordingBadge {
        shown: Mutex<Vec<usize>>,
    }

    impl CountBadge for RecordingBadge {
        fn render(&self, count: usize) {
            self.shown.lock().unwrap().push(count);
        }
    }

    /// Store whose reads always fail; counts remove attempts.
    #[derive(Default)]
    struct UnreadableStore {
        removes: Mutex<usize>,
    }

    impl KeyValueStore for UnreadableStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("disk detached".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Ok(())
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            *self.removes.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn cart_with_blob(blob: &str) -> CartStore<Arc<MemoryStore>> {
        let storage = Arc::new(MemoryStore::new());
        storage.set(CART_KEY, blob).unwrap();
        CartStore::new(storage)
    }

    fn keys(items: &[CartItem]) -> Vec<&str> {
        items.iter().map(|item| item.item_key().as_str()).collect()
    }

    #[test]
    fn test_load_missing_key_is_empty() {
        let cart = CartStore::new(MemoryStore::new());
        let outcome = cart.load_checked();
        assert!(outcome.items.is_empty());
        assert!(!outcome.repaired);
    }

    #[test]
    fn test_load_drops_records_without_item_key() {
        let cart = cart_with_blob(r#"[{"itemKey":"p1","label":"A"},{"itemKey":null},{}]"#);
        let outcome = cart.load_checked();

        assert_eq!(keys(&outcome.items), vec!["p1"]);
        assert_eq!(outcome.items[0].label(), "A");
        assert!(outcome.repaired);
        assert_eq!(cart.get_count(), 1);
    }

    #[test]
    fn test_load_preserves_order_of_valid_subset() {
        let cart = cart_with_blob(
            r#"[{"itemKey":"a"},null,{"itemKey":""},{"itemKey":"b"},{"label":"x"},{"itemKey":"a"}]"#,
        );
        assert_eq!(keys(&cart.load_cart()), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_load_drops_records_with_non_string_item_key() {
        let cart = cart_with_blob(r#"[{"itemKey":5},{"itemKey":["p1"]},{"itemKey":"p"},7]"#);
        let outcome = cart.load_checked();
        assert_eq!(keys(&outcome.items), vec!["p"]);
        assert!(outcome.repaired);
    }

    #[test]
    fn test_load_keeps_keyed_records_with_odd_fields() {
        let cart = cart_with_blob(
            r#"[{"itemKey":"p1","id":null},{"itemKey":"p2","id":"1712345678901.5"},{"itemKey":"p3","label":123},{"itemKey":"p4","label":["x"],"imageRef":{}},{"nameId":"p5","imagenSrc":null}]"#,
        );
        let outcome = cart.load_checked();

        assert_eq!(keys(&outcome.items), vec!["p1", "p2", "p3", "p4", "p5"]);
        assert!(!outcome.repaired);
        assert_eq!(outcome.items[0].id(), LineItemId::default());
        assert_eq!(outcome.items[1].id(), LineItemId::new(1_712_345_678_901.5));
        assert_eq!(outcome.items[2].label(), "123");
        assert_eq!(outcome.items[3].label(), "");
        assert_eq!(outcome.items[3].image_ref(), DEFAULT_IMAGE_REF);
        assert_eq!(outcome.items[4].image_ref(), DEFAULT_IMAGE_REF);
    }

    #[test]
    fn test_add_keeps_keyed_records_with_odd_fields() {
        let cart = cart_with_blob(r#"[{"itemKey":"p1","id":null,"label":123}]"#);
        assert_eq!(cart.add_item("p2", "B", None).unwrap(), 2);
        assert_eq!(keys(&cart.load_cart()), vec!["p1", "p2"]);
        assert_eq!(cart.load_cart()[0].label(), "123");
    }

    #[test]
    fn test_load_unreadable_store_is_empty_and_keeps_key() {
        let cart = CartStore::new(UnreadableStore::default());
        let outcome = cart.load_checked();

        assert!(outcome.items.is_empty());
        assert!(!outcome.repaired);
        assert_eq!(cart.get_count(), 0);
        assert_eq!(cart.go_to_cart(), CartNavigation::Stay);
        assert_eq!(*cart.storage().removes.lock().unwrap(), 0);
    }

    #[test]
    fn test_load_empty_array_removes_key() {
        let cart = cart_with_blob("[]");
        assert!(cart.load_cart().is_empty());
        assert!(!cart.storage().contains(CART_KEY).unwrap());
        assert_eq!(cart.get_count(), 0);
    }

    #[test]
    fn test_load_unparseable_blob_is_empty_and_removed() {
        let cart = cart_with_blob("{not json");
        let outcome = cart.load_checked();
        assert!(outcome.items.is_empty());
        assert!(outcome.repaired);
        assert!(!cart.storage().contains(CART_KEY).unwrap());
    }

    #[test]
    fn test_load_non_array_json_is_empty() {
        let cart = cart_with_blob(r#"{"itemKey":"p1"}"#);
        assert!(cart.load_cart().is_empty());
        assert!(!cart.storage().contains(CART_KEY).unwrap());
    }

    #[test]
    fn test_load_null_blob_is_not_a_repair() {
        let cart = cart_with_blob("null");
        let outcome = cart.load_checked();
        assert!(outcome.items.is_empty());
        assert!(!outcome.repaired);
    }

    #[test]
    fn test_load_is_idempotent() {
        let cart = cart_with_blob(r#"[{"itemKey":"p1","label":"A","id":1.5},{},{"itemKey":"p2"}]"#);
        let first = cart.load_cart();
        let stored_after_first = cart.storage().get(CART_KEY).unwrap();
        let second = cart.load_cart();

        assert_eq!(first, second);
        assert_eq!(cart.storage().get(CART_KEY).unwrap(), stored_after_first);
    }

    #[test]
    fn test_load_fills_missing_fields() {
        let cart = cart_with_blob(r#"[{"itemKey":"p1","label":null,"imageRef":""}]"#);
        let items = cart.load_cart();
        assert_eq!(items[0].label(), "");
        assert_eq!(items[0].image_ref(), DEFAULT_IMAGE_REF);
        assert_eq!(items[0].id(), LineItemId::default());
    }

    #[test]
    fn test_load_accepts_legacy_field_names() {
        let cart = cart_with_blob(
            r#"[{"id":1712345678901.25,"nameId":"pqs-6","nombre":"Extintor PQS","imagenSrc":"img/pqs.jpg"}]"#,
        );
        let items = cart.load_cart();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_key().as_str(), "pqs-6");
        assert_eq!(items[0].label(), "Extintor PQS");
        assert_eq!(items[0].image_ref(), "img/pqs.jpg");
        assert_eq!(items[0].id(), LineItemId::new(1_712_345_678_901.25));
    }

    #[test]
    fn test_add_to_empty_cart_uses_placeholder() {
        let cart = CartStore::new(MemoryStore::new());
        let count = cart.add_item("p2", "Widget", None).unwrap();

        assert_eq!(count, 1);
        let items = cart.load_cart();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_key().as_str(), "p2");
        assert_eq!(items[0].label(), "Widget");
        assert_eq!(items[0].image_ref(), DEFAULT_IMAGE_REF);
    }

    #[test]
    fn test_add_with_empty_image_uses_configured_placeholder() {
        let cart = CartStore::new(MemoryStore::new()).with_placeholder_image("img/none.png");
        cart.add_item("p2", "Widget", Some("")).unwrap();
        assert_eq!(cart.load_cart()[0].image_ref(), "img/none.png");
    }

    #[test]
    fn test_add_writes_canonical_field_names() {
        let cart = CartStore::new(MemoryStore::new());
        cart.add_item("p1", "A", Some("img/a.jpg")).unwrap();

        let stored = cart.storage().get(CART_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&stored).unwrap();
        let record = &value[0];
        assert!(record["id"].is_number());
        assert_eq!(record["itemKey"], "p1");
        assert_eq!(record["label"], "A");
        assert_eq!(record["imageRef"], "img/a.jpg");
    }

    #[test]
    fn test_add_allows_duplicate_item_keys() {
        let cart = CartStore::new(MemoryStore::new());
        cart.add_item("p1", "A", None).unwrap();
        cart.add_item("p1", "A", None).unwrap();

        let items = cart.load_cart();
        assert_eq!(keys(&items), vec!["p1", "p1"]);
        assert_ne!(items[0].id(), items[1].id());
    }

    #[test]
    fn test_add_repairs_corrupted_cart() {
        let cart = cart_with_blob(r#"[{"itemKey":"p1"},{}]"#);
        let count = cart.add_item("p2", "B", None).unwrap();

        assert_eq!(count, 2);
        let stored = cart.storage().get(CART_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_add_without_item_key_is_pruned_on_next_load() {
        let cart = CartStore::new(MemoryStore::new());
        let count = cart.add_item("", "Ghost", None).unwrap();

        assert_eq!(count, 0);
        assert!(cart.load_cart().is_empty());
        assert!(!cart.storage().contains(CART_KEY).unwrap());
    }

    #[test]
    fn test_add_renders_badge() {
        let badge = Arc::new(RecordingBadge::default());
        let cart = CartStore::new(MemoryStore::new()).with_badge(badge.clone());

        cart.add_item("p1", "A", None).unwrap();
        cart.add_item("p2", "B", None).unwrap();

        assert_eq!(*badge.shown.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_add_propagates_quota_error() {
        let badge = Arc::new(RecordingBadge::default());
        let cart = CartStore::new(MemoryStore::with_quota(16)).with_badge(badge.clone());

        let err = cart.add_item("p1", "A long product name", None).unwrap_err();

        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert_eq!(cart.get_count(), 0);
        assert!(badge.shown.lock().unwrap().is_empty());
    }

    #[test]
    fn test_count_matches_load_after_corruption() {
        let storage = Arc::new(MemoryStore::new());
        let cart = CartStore::new(Arc::clone(&storage));

        cart.add_item("p1", "A", None).unwrap();
        cart.add_item("p2", "B", None).unwrap();
        assert_eq!(cart.get_count(), cart.load_cart().len());

        let stored = storage.get(CART_KEY).unwrap().unwrap();
        let corrupted = stored.replacen("\"itemKey\":\"p1\"", "\"itemKey\":null", 1);
        storage.set(CART_KEY, &corrupted).unwrap();
        assert_eq!(cart.get_count(), 1);
        assert_eq!(cart.get_count(), cart.load_cart().len());

        storage.set(CART_KEY, "garbage").unwrap();
        assert_eq!(cart.get_count(), 0);
        assert_eq!(cart.add_item("p3", "C", None).unwrap(), 1);
        assert_eq!(cart.get_count(), cart.load_cart().len());
    }

    #[test]
    fn test_remove_item() {
        let cart = CartStore::new(MemoryStore::new());
        cart.add_item("p1", "A", None).unwrap();
        cart.add_item("p2", "B", None).unwrap();
        let first = cart.load_cart()[0].id();

        assert!(cart.remove_item(first).unwrap());
        assert_eq!(keys(&cart.load_cart()), vec!["p2"]);
    }

    #[test]
    fn test_remove_unknown_item() {
        let cart = CartStore::new(MemoryStore::new());
        cart.add_item("p1", "A", None).unwrap();
        assert!(!cart.remove_item(LineItemId::new(1.0)).unwrap());
        assert_eq!(cart.get_count(), 1);
    }

    #[test]
    fn test_remove_last_item_removes_key() {
        let cart = CartStore::new(MemoryStore::new());
        cart.add_item("p1", "A", None).unwrap();
        let id = cart.load_cart()[0].id();

        cart.remove_item(id).unwrap();
        assert!(!cart.storage().contains(CART_KEY).unwrap());
        assert_eq!(cart.get_count(), 0);
    }

    #[test]
    fn test_clear_removes_key_and_renders_badge() {
        let badge = Arc::new(RecordingBadge::default());
        let cart = CartStore::new(MemoryStore::new()).with_badge(badge.clone());
        cart.add_item("p1", "A", None).unwrap();

        cart.clear().unwrap();

        assert!(!cart.storage().contains(CART_KEY).unwrap());
        assert_eq!(*badge.shown.lock().unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_go_to_cart() {
        let cart = CartStore::new(MemoryStore::new());
        assert_eq!(cart.go_to_cart(), CartNavigation::Stay);

        cart.add_item("p1", "A", None).unwrap();
        assert_eq!(cart.go_to_cart(), CartNavigation::Open);
    }

    #[test]
    fn test_render_cart_count_without_badge() {
        let cart = cart_with_blob(r#"[{"itemKey":"p1"},{"itemKey":"p2"}]"#);
        assert_eq!(cart.render_cart_count(), 2);
    }
}
