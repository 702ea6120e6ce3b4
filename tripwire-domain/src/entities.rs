//! Domain records consumed by the rule layer.
//!
//! Orders and trades are immutable after construction; status changes are
//! expressed by producing an updated copy.

use crate::value_objects::{DomainError, OrderSide, Price, Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an Order
pub type OrderId = Uuid;

/// Unique identifier for a Trade
pub type TradeId = Uuid;

// =============================================================================
// Security / Portfolio
// =============================================================================

/// Instrument an order trades
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Security {
    code: String,
    board: String,
    supports_market_orders: bool,
}

impl Security {
    /// Create a security that accepts market orders.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSecurity` if code or board is empty
    pub fn new(code: impl Into<String>, board: impl Into<String>) -> Result<Self, DomainError> {
        let code = code.into();
        let board = board.into();
        if code.trim().is_empty() || board.trim().is_empty() {
            return Err(DomainError::InvalidSecurity(
                "Code and board must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            code,
            board,
            supports_market_orders: true,
        })
    }

    /// Mark whether the board accepts market orders
    pub fn with_market_orders(mut self, supported: bool) -> Self {
        self.supports_market_orders = supported;
        self
    }

    /// Security code (e.g. "BTCUSDT")
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Board/venue code
    pub fn board(&self) -> &str {
        &self.board
    }

    /// Whether market orders can be sent for this security
    pub fn supports_market_orders(&self) -> bool {
        self.supports_market_orders
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.code, self.board)
    }
}

/// Account an order is booked against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Portfolio {
    /// Portfolio/account name
    pub name: String,
}

impl Portfolio {
    /// Create a portfolio reference
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Portfolio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// =============================================================================
// Order
// =============================================================================

/// Order types supported
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderType {
    /// Market order (immediate execution)
    Market,
    /// Limit order (price guaranteed)
    Limit,
}

/// Order status lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    /// Created locally, not sent yet
    Pending,
    /// Handed to the order router
    Active,
    /// Completely filled
    Filled,
    /// Cancelled
    Cancelled,
    /// Rejected by the router
    Rejected,
}

/// Instruction to buy or sell.
///
/// `price` is `None` for market orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub security: Security,
    pub portfolio: Option<Portfolio>,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub volume: Quantity,
    pub price: Option<Price>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Create a new unregistered market order
    pub fn market(
        security: Security,
        portfolio: Option<Portfolio>,
        side: OrderSide,
        volume: Quantity,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            security,
            portfolio,
            side,
            order_type: OrderType::Market,
            volume,
            price: None,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Create a new unregistered limit order
    pub fn limit(
        security: Security,
        portfolio: Option<Portfolio>,
        side: OrderSide,
        volume: Quantity,
        price: Price,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(security, portfolio, side, volume)
        }
    }

    /// Check if this is a market order
    pub fn is_market(&self) -> bool {
        matches!(self.order_type, OrderType::Market)
    }

    /// Copy of this order carrying a new status
    pub fn with_status(&self, status: OrderStatus) -> Order {
        Order {
            status,
            ..self.clone()
        }
    }

    /// Copy of a limit order with its price moved to `price`.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` for market orders or a
    /// non-positive result
    pub fn repriced(&self, price: rust_decimal::Decimal) -> Result<Order, DomainError> {
        if self.is_market() {
            return Err(DomainError::InvalidPrice("Market orders carry no price".to_string()));
        }
        Ok(Order {
            price: Some(Price::new(price)?),
            ..self.clone()
        })
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.price {
            Some(price) => write!(f, "{} {} {} @ {}", self.side, self.volume, self.security, price),
            None => write!(f, "{} {} {} @ MKT", self.side, self.volume, self.security),
        }
    }
}

// =============================================================================
// Trade
// =============================================================================

/// Own trade (fill) produced by one of the strategy's orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub order_id: OrderId,
    pub security: Security,
    pub side: OrderSide,
    pub price: Price,
    pub volume: Quantity,
    pub time: DateTime<Utc>,
}

impl Trade {
    /// Create a fill for `order` at `price`
    pub fn new(order: &Order, price: Price, volume: Quantity) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id: order.id,
            security: order.security.clone(),
            side: order.side,
            price,
            volume,
            time: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn security() -> Security {
        Security::new("BTCUSDT", "BINANCE").unwrap()
    }

    #[test]
    fn test_security_validation() {
        assert!(Security::new("", "X").is_err());
        assert!(Security::new("A", " ").is_err());

        let sec = security();
        assert!(sec.supports_market_orders());
        assert!(!sec.with_market_orders(false).supports_market_orders());
    }

    #[test]
    fn test_market_order_has_no_price() {
        let qty = Quantity::new(dec!(1)).unwrap();
        let order = Order::market(security(), None, OrderSide::Buy, qty);

        assert!(order.is_market());
        assert_eq!(order.price, None);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_limit_order() {
        let order = Order::limit(
            security(),
            Some(Portfolio::new("main")),
            OrderSide::Sell,
            Quantity::new(dec!(2)).unwrap(),
            Price::new(dec!(100)).unwrap(),
        );

        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.price.unwrap().as_decimal(), dec!(100));
        assert_eq!(order.to_string(), "SELL 2 BTCUSDT@BINANCE @ 100");
    }

    #[test]
    fn test_repriced() {
        let qty = Quantity::new(dec!(1)).unwrap();
        let limit =
            Order::limit(security(), None, OrderSide::Buy, qty, Price::new(dec!(10)).unwrap());
        let moved = limit.repriced(dec!(10.5)).unwrap();
        assert_eq!(moved.id, limit.id);
        assert_eq!(moved.price.unwrap().as_decimal(), dec!(10.5));

        assert!(limit.repriced(dec!(0)).is_err());
        assert!(Order::market(security(), None, OrderSide::Buy, qty).repriced(dec!(1)).is_err());
    }

    #[test]
    fn test_trade_from_order() {
        let qty = Quantity::new(dec!(3)).unwrap();
        let order = Order::market(security(), None, OrderSide::Buy, qty);
        let trade = Trade::new(&order, Price::new(dec!(95)).unwrap(), qty);

        assert_eq!(trade.order_id, order.id);
        assert_eq!(trade.side, OrderSide::Buy);
        assert_eq!(trade.security, order.security);
    }

    #[test]
    fn test_order_serialization() {
        let qty = Quantity::new(dec!(1)).unwrap();
        let order = Order::market(security(), None, OrderSide::Sell, qty);

        let json = serde_json::to_string(&order).unwrap();
        let parsed: Order = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, order);
    }
}
