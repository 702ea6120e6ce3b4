//! Tripwire Domain Layer
//!
//! Pure domain values with zero I/O dependencies.
//! Contains the order/trade records and the strategy state enums that the
//! rule layer reads.

#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    Order, OrderId, OrderStatus, OrderType, Portfolio, Security, Trade, TradeId,
};
pub use value_objects::{
    DomainError, LogLevel, OrderSide, Price, ProcessState, Quantity, TradingMode, Unit,
};
