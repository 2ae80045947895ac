//! Catalog item key.

use core::fmt;

use serde::{Deserialize, Serialize};

/// External identifier of a catalog item, as rendered in the product page's
/// `data-id` attribute.
///
/// The key is deliberately not validated at construction: an empty key can be
/// written to a cart, and the record is dropped the next time the cart loads.
/// Use [`ItemKey::is_present`] to check whether a record will survive a load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Create a key from any string, including an empty one.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Whether the key identifies anything. Records without one are invalid.
    #[must_use]
    pub fn is_present(&self) -> bool {
        !self.0.is_empty()
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ItemKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_is_present() {
        assert!(ItemKey::new("extintor-pqs-6kg").is_present());
        assert!(!ItemKey::new("").is_present());
    }

    #[test]
    fn test_rejects_null_json() {
        assert!(serde_json::from_str::<ItemKey>("null").is_err());
        assert!(serde_json::from_str::<ItemKey>("7").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ItemKey::from("p1").to_string(), "p1");
    }
}
