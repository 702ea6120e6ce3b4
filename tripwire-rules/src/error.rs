//! Rule layer error types.

use thiserror::Error;
use tripwire_domain::DomainError;
use tripwire_strategy::StrategyError;

/// Errors raised when building rules, actions and orders.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A required argument is unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A combinator was configured with nothing to do
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The rule's owning strategy has been dropped or disposed
    #[error("Owner unavailable: {0}")]
    OwnerUnavailable(String),

    /// The strategy has no instrument to build an order for
    #[error("Security not specified for strategy {0}")]
    SecurityNotSpecified(String),

    /// The strategy state does not allow the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An enum value outside the accepted range
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// Strategy command failed
    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Result type for rule operations.
pub type RuleResult<T> = Result<T, RuleError>;

/// Lets actions use `?` on rule-layer calls inside event handlers.
impl From<RuleError> for StrategyError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Strategy(inner) => inner,
            RuleError::Domain(inner) => StrategyError::Domain(inner),
            other => StrategyError::Action(Box::new(other)),
        }
    }
}
