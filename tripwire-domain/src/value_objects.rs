//! Value Objects for the Tripwire domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Unit could not be parsed or is not usable
    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    /// Security code/board validation error
    #[error("Invalid security: {0}")]
    InvalidSecurity(String),

    /// Enum code outside of the known range
    #[error("Value out of range for {kind}: {value}")]
    OutOfRange {
        /// Name of the enum being decoded
        kind: &'static str,
        /// Offending raw value
        value: String,
    },
}

// =============================================================================
// Price
// =============================================================================

/// Price represents a positive decimal price
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice(format!("Price must be positive, got {}", value)));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Quantity represents a positive order or trade volume
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a new Quantity with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQuantity` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(format!(
                "Quantity must be positive, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// OrderSide
// =============================================================================

/// OrderSide represents the order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl OrderSide {
    /// The opposite direction (Buy ↔ Sell)
    pub fn invert(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Position direction: +1 for Buy, -1 for Sell
    pub fn sign(&self) -> Decimal {
        match self {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    /// Side that moves a position by a signed amount
    ///
    /// Positive gap → Buy, negative gap → Sell. Zero has no side.
    pub fn from_signed(gap: Decimal) -> Option<OrderSide> {
        if gap > Decimal::ZERO {
            Some(OrderSide::Buy)
        } else if gap < Decimal::ZERO {
            Some(OrderSide::Sell)
        } else {
            None
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

// =============================================================================
// Unit
// =============================================================================

/// A threshold amount that is either an absolute level or an offset.
///
/// Threshold rules resolve a `Unit` against the current value exactly once:
///
/// ```text
/// Limit(x)    → x
/// Delta(d)    → current ∓ d
/// Percent(p)  → current ∓ |current| × p / 100
/// ```
///
/// # Examples
/// ```
/// # use tripwire_domain::Unit;
/// # use rust_decimal_macros::dec;
/// assert_eq!(Unit::Delta(dec!(5)).below(dec!(10)), dec!(5));
/// assert_eq!(Unit::Limit(dec!(3)).below(dec!(10)), dec!(3));
/// assert_eq!(Unit::Percent(dec!(10)).above(dec!(200)), dec!(220));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum Unit {
    /// Absolute target level
    Limit(Decimal),
    /// Signed offset from the current value
    Delta(Decimal),
    /// Offset expressed as a percentage of the current value's magnitude
    Percent(Decimal),
}

impl Unit {
    /// True when this unit is an absolute level rather than an offset
    pub fn is_limit(&self) -> bool {
        matches!(self, Unit::Limit(_))
    }

    /// Raw amount carried by the unit
    pub fn amount(&self) -> Decimal {
        match self {
            Unit::Limit(v) | Unit::Delta(v) | Unit::Percent(v) => *v,
        }
    }

    /// Offset this unit represents relative to `base`, `None` for a limit.
    ///
    /// Saturates at the `Decimal` bounds.
    pub fn offset_from(&self, base: Decimal) -> Option<Decimal> {
        match self {
            Unit::Limit(_) => None,
            Unit::Delta(d) => Some(*d),
            Unit::Percent(p) => {
                let magnitude = base.abs();
                Some(match magnitude.checked_mul(*p) {
                    Some(scaled) => scaled / Decimal::ONE_HUNDRED,
                    None => (magnitude / Decimal::ONE_HUNDRED).saturating_mul(*p),
                })
            }
        }
    }

    /// Level below `current` (or the absolute level for a limit).
    ///
    /// Saturates at `Decimal::MIN`/`Decimal::MAX`.
    pub fn below(&self, current: Decimal) -> Decimal {
        match self.offset_from(current) {
            Some(offset) => current.saturating_sub(offset),
            None => self.amount(),
        }
    }

    /// Level above `current` (or the absolute level for a limit).
    ///
    /// Saturates at `Decimal::MIN`/`Decimal::MAX`.
    pub fn above(&self, current: Decimal) -> Decimal {
        match self.offset_from(current) {
            Some(offset) => current.saturating_add(offset),
            None => self.amount(),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Limit(v) => write!(f, "{}l", v),
            Unit::Delta(v) => write!(f, "{}", v),
            Unit::Percent(v) => write!(f, "{}%", v),
        }
    }
}

impl FromStr for Unit {
    type Err = DomainError;

    /// Parse `"5"` (delta), `"5%"` (percent) or `"5l"` (limit).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |raw: &str| {
            Decimal::from_str(raw.trim())
                .map_err(|_| DomainError::InvalidUnit(format!("Cannot parse unit: {}", s)))
        };

        if let Some(raw) = s.strip_suffix('%') {
            Ok(Unit::Percent(parse(raw)?))
        } else if let Some(raw) = s.strip_suffix('l').or_else(|| s.strip_suffix('L')) {
            Ok(Unit::Limit(parse(raw)?))
        } else {
            Ok(Unit::Delta(parse(s)?))
        }
    }
}

// =============================================================================
// Strategy state enums
// =============================================================================

/// Strategy process lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Not running
    #[default]
    Stopped,
    /// Running
    Started,
    /// Shutdown requested, still winding down
    Stopping,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Stopped => write!(f, "stopped"),
            ProcessState::Started => write!(f, "started"),
            ProcessState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Trading permission level of a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    /// No trading at all
    Disabled,
    /// Unrestricted trading
    #[default]
    Full,
    /// Only cancellations are permitted
    CancelOrdersOnly,
    /// Only orders that reduce the position are permitted
    ReducePositionOnly,
}

impl TradingMode {
    /// Stable numeric code used by external configuration
    pub fn code(&self) -> i32 {
        match self {
            TradingMode::Disabled => 0,
            TradingMode::Full => 1,
            TradingMode::CancelOrdersOnly => 2,
            TradingMode::ReducePositionOnly => 3,
        }
    }
}

impl TryFrom<i32> for TradingMode {
    type Error = DomainError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TradingMode::Disabled),
            1 => Ok(TradingMode::Full),
            2 => Ok(TradingMode::CancelOrdersOnly),
            3 => Ok(TradingMode::ReducePositionOnly),
            other => Err(DomainError::OutOfRange {
                kind: "TradingMode",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for TradingMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "disabled" => Ok(TradingMode::Disabled),
            "full" => Ok(TradingMode::Full),
            "cancel_orders_only" | "cancel_only" => Ok(TradingMode::CancelOrdersOnly),
            "reduce_position_only" | "reduce_only" => Ok(TradingMode::ReducePositionOnly),
            _ => Err(DomainError::OutOfRange {
                kind: "TradingMode",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingMode::Disabled => write!(f, "disabled"),
            TradingMode::Full => write!(f, "full"),
            TradingMode::CancelOrdersOnly => write!(f, "cancel_orders_only"),
            TradingMode::ReducePositionOnly => write!(f, "reduce_position_only"),
        }
    }
}

/// Severity level used for a strategy's error state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Diagnostic chatter
    Debug,
    /// Normal operation
    #[default]
    Info,
    /// Something needs attention
    Warning,
    /// Failure
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
