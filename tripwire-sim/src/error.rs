//! Simulator error types.

use thiserror::Error;
use tripwire_domain::DomainError;
use tripwire_rules::RuleError;
use tripwire_strategy::StrategyError;

/// Simulator-level errors.
#[derive(Debug, Error)]
pub enum SimError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scenario file could not be used
    #[error("Scenario error: {0}")]
    Scenario(String),

    /// Scenario I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Scenario JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rule error
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// Strategy error
    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Result type for simulator operations.
pub type SimResult<T> = Result<T, SimError>;
