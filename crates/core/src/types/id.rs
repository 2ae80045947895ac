//! Line item identifiers.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of one line item in a cart.
///
/// Generated at add time as epoch milliseconds plus a random fraction, so two
/// adds in the same millisecond still get distinct ids. Serialized as a bare
/// JSON number, the format carts written by the browser script already use.
///
/// ```
/// use dsi_core::LineItemId;
///
/// let a = LineItemId::generate();
/// let b = LineItemId::generate();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemId(f64);

impl LineItemId {
    /// Create an ID from a raw value.
    #[must_use]
    pub const fn new(id: f64) -> Self {
        Self(id)
    }

    /// Generate a fresh time-based ID with a random component.
    #[must_use]
    pub fn generate() -> Self {
        #[allow(clippy::cast_precision_loss)] // Epoch millis stay well inside f64's exact integer range
        let millis = chrono::Utc::now().timestamp_millis() as f64;
        Self(millis + rand::random::<f64>())
    }

    /// Get the underlying value.
    #[must_use]
    pub const fn as_f64(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for LineItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error parsing a [`LineItemId`] from text.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid line item id: {0}")]
pub struct ParseLineItemIdError(String);

impl FromStr for LineItemId {
    type Err = ParseLineItemIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Self)
            .ok_or_else(|| ParseLineItemIdError(s.to_string()))
    }
}

impl From<f64> for LineItemId {
    fn from(id: f64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_time_based() {
        let before = chrono::Utc::now().timestamp_millis();
        let id = LineItemId::generate();
        #[allow(clippy::cast_possible_truncation)]
        let whole = id.as_f64().trunc() as i64;
        assert!(whole >= before);
        assert!(id.as_f64().fract() >= 0.0);
    }

    #[test]
    fn test_display_parses_back() {
        let id = LineItemId::new(1_712_345_678_901.375);
        let parsed: LineItemId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("abc".parse::<LineItemId>().is_err());
        assert!("NaN".parse::<LineItemId>().is_err());
        assert!("".parse::<LineItemId>().is_err());
    }

    #[test]
    fn test_serializes_as_number() {
        let id = LineItemId::new(42.5);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42.5");
    }

    #[test]
    fn test_accepts_integer_json() {
        let id: LineItemId = serde_json::from_str("1712345678901").unwrap();
        assert_eq!(id, LineItemId::new(1_712_345_678_901.0));
    }
}
