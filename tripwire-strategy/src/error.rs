//! Strategy host error types.

use thiserror::Error;
use tripwire_domain::{DomainError, OrderId};

/// Errors raised by strategy commands and event dispatch.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// Order router communication error
    #[error("Router error: {0}")]
    Router(String),

    /// Order was rejected by the router
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// Order is not tracked by this strategy
    #[error("Unknown order: {0}")]
    UnknownOrder(OrderId),

    /// Command is not valid for the order or strategy state
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Strategy was disposed or dropped
    #[error("Strategy disposed: {0}")]
    Disposed(String),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// An attached action failed while handling an event
    #[error("Action failed: {0}")]
    Action(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for strategy operations.
pub type StrategyResult<T> = Result<T, StrategyError>;
