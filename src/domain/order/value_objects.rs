use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;
use uuid::Uuid;

use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Order identity (UUIDv7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OrderId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for OrderId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Money
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Amount is empty")]
    Empty,

    #[error("Malformed amount: {0:?}")]
    Malformed(String),

    #[error("Amount {0:?} has more than two fractional digits")]
    TooPrecise(String),

    #[error("Amount overflows")]
    Overflow,
}

/// Number of fractional digits carried by [`Money`].
pub const SCALE: u32 = 2;
const MINOR_PER_MAJOR: u64 = 10u64.pow(SCALE);

/// Non-negative fixed-point amount stored as integer minor units (cents).
///
/// There is no negative representation and no rounding: parsing rejects
/// anything finer than [`SCALE`] digits and arithmetic is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor_units(minor_units: u64) -> Self {
        Self(minor_units)
    }

    pub const fn minor_units(&self) -> u64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_mul(self, factor: u32) -> Option<Money> {
        self.0.checked_mul(u64::from(factor)).map(Money)
    }

    /// Sum of amounts, failing instead of wrapping
    pub fn try_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Result<Money, MoneyError> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m).ok_or(MoneyError::Overflow))
    }

    /// Mean of the amounts rounded half-up to the minor unit; `None` when empty.
    ///
    /// Summed in `u128` so many large totals never overflow.
    pub fn mean<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        let (total, count) = amounts
            .into_iter()
            .fold((0u128, 0u128), |(total, count), m| (total + u128::from(m.0), count + 1));
        if count == 0 {
            return None;
        }
        let mean = (total * 2 + count) / (count * 2);
        u64::try_from(mean).ok().map(Money)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(MoneyError::Empty);
        }

        let (major, minor) = match text.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (text, ""),
        };

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if major.is_empty() || !all_digits(major) || !all_digits(minor) || (text.contains('.') && minor.is_empty()) {
            return Err(MoneyError::Malformed(text.to_string()));
        }
        if minor.len() > SCALE as usize {
            return Err(MoneyError::TooPrecise(text.to_string()));
        }

        let major: u64 = major.parse().map_err(|_| MoneyError::Overflow)?;
        let mut minor_units: u64 = if minor.is_empty() { 0 } else {
            minor.parse().map_err(|_| MoneyError::Malformed(text.to_string()))?
        };
        for _ in minor.len()..SCALE as usize {
            minor_units *= 10;
        }

        major
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|m| m.checked_add(minor_units))
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:0width$}",
            self.0 / MINOR_PER_MAJOR,
            self.0 % MINOR_PER_MAJOR,
            width = SCALE as usize
        )
    }
}

impl Sum for Money {
    /// Saturating; use [`Money::try_sum`] where overflow must be reported.
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| Money(acc.0.saturating_add(m.0)))
    }
}

// Serialized as a decimal string so no float ever touches an amount
impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Line Item
// ============================================================================

/// One product entry within an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }

    /// `unit_price * quantity`
    pub fn subtotal(&self) -> Result<Money, MoneyError> {
        self.unit_price.checked_mul(self.quantity).ok_or(MoneyError::Overflow)
    }

    /// Check field rules and return the item with trimmed text fields
    pub fn validated(&self) -> Result<LineItem, OrderError> {
        let product_id = self.product_id.trim();
        if product_id.is_empty() {
            return Err(OrderError::InvalidInput("product id is required".to_string()));
        }
        let product_name = self.product_name.trim();
        if product_name.is_empty() {
            return Err(OrderError::InvalidInput("product name is required".to_string()));
        }
        if self.quantity < 1 {
            return Err(OrderError::InvalidInput("quantity must be at least 1".to_string()));
        }
        if self.unit_price.is_zero() {
            return Err(OrderError::InvalidInput("unit price must be positive".to_string()));
        }
        self.subtotal()?;

        Ok(LineItem {
            product_id: product_id.to_string(),
            product_name: product_name.to_string(),
            quantity: self.quantity,
            unit_price: self.unit_price,
        })
    }
}

// ============================================================================
// Order Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Confirmed,
    Processed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Created,
        OrderStatus::Confirmed,
        OrderStatus::Processed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// No outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
