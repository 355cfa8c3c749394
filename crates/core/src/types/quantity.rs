//! Cart line quantity.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// The value is zero.
    #[error("quantity cannot be zero")]
    Zero,
    /// The value is below zero.
    #[error("quantity cannot be negative (got {0})")]
    Negative(i64),
    /// The value is above the per-line limit.
    #[error("quantity must be at most {max} (got {value})")]
    TooLarge {
        /// Rejected value.
        value: i64,
        /// Maximum allowed quantity.
        max: u8,
    },
}

/// Number of units of one product in the cart.
///
/// ## Constraints
///
/// - Range: 1-99 inclusive
/// - A line whose quantity would drop to zero is removed, never stored as zero
///
/// ## Examples
///
/// ```
/// use cocobrown_core::Quantity;
///
/// assert_eq!(Quantity::parse(3).unwrap().get(), 3);
/// assert!(Quantity::parse(0).is_err());
///
/// // Clamping keeps values in range; zero or below means "remove".
/// assert_eq!(Quantity::clamped(150).map(Quantity::get), Some(99));
/// assert_eq!(Quantity::clamped(0), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Quantity(u8);

impl Quantity {
    /// Smallest stored quantity.
    pub const MIN: Self = Self(1);
    /// Largest stored quantity.
    pub const MAX: Self = Self(99);

    /// Parse a `Quantity`, rejecting anything outside 1-99.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is zero, negative, or above 99.
    pub fn parse(value: i64) -> Result<Self, QuantityError> {
        match value {
            0 => Err(QuantityError::Zero),
            v if v < 0 => Err(QuantityError::Negative(v)),
            v if v > i64::from(Self::MAX.0) => Err(QuantityError::TooLarge {
                value: v,
                max: Self::MAX.0,
            }),
            // Range checked above
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            v => Ok(Self(v as u8)),
        }
    }

    /// Clamp a requested quantity into range.
    ///
    /// Returns `None` when the request is zero or below, meaning the line
    /// should be removed.
    #[must_use]
    pub fn clamped(requested: i64) -> Option<Self> {
        if requested <= 0 {
            return None;
        }
        Self::parse(requested.min(i64::from(Self::MAX.0))).ok()
    }

    /// Returns the quantity as a plain number.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// One more unit, stopping at [`Quantity::MAX`].
    #[must_use]
    pub const fn saturating_increment(self) -> Self {
        if self.0 >= Self::MAX.0 {
            Self::MAX
        } else {
            Self(self.0 + 1)
        }
    }

    /// Whether the quantity has reached the per-line limit.
    #[must_use]
    pub const fn is_max(self) -> bool {
        self.0 >= Self::MAX.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Quantity> for u8 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(Quantity::parse(1).unwrap(), Quantity::MIN);
        assert_eq!(Quantity::parse(99).unwrap(), Quantity::MAX);
        assert_eq!(Quantity::parse(42).unwrap().get(), 42);
    }

    #[test]
    fn test_parse_zero() {
        assert_eq!(Quantity::parse(0), Err(QuantityError::Zero));
    }

    #[test]
    fn test_parse_negative() {
        assert_eq!(Quantity::parse(-4), Err(QuantityError::Negative(-4)));
    }

    #[test]
    fn test_parse_too_large() {
        assert!(matches!(
            Quantity::parse(100),
            Err(QuantityError::TooLarge { value: 100, max: 99 })
        ));
    }

    #[test]
    fn test_clamped() {
        assert_eq!(Quantity::clamped(150), Some(Quantity::MAX));
        assert_eq!(Quantity::clamped(i64::MAX), Some(Quantity::MAX));
        assert_eq!(Quantity::clamped(5).unwrap().get(), 5);
        assert_eq!(Quantity::clamped(0), None);
        assert_eq!(Quantity::clamped(-1), None);
    }

    #[test]
    fn test_saturating_increment() {
        assert_eq!(Quantity::MIN.saturating_increment().get(), 2);
        assert_eq!(Quantity::MAX.saturating_increment(), Quantity::MAX);
        assert!(Quantity::MAX.is_max());
    }

    #[test]
    fn test_serde_roundtrip_rejects_out_of_range() {
        let json = serde_json::to_string(&Quantity::parse(3).unwrap()).unwrap();
        assert_eq!(json, "3");
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert!(serde_json::from_str::<Quantity>("100").is_err());
    }
}
