//! Tripwire Rules
//!
//! Declarative triggers over a [`Strategy`](tripwire_strategy::Strategy):
//!
//! ```text
//! strategy.when_position_less(Unit::Delta(dec!(5)))?   ← rule variant
//!     .once()                                          ← lifecycle
//!     .register(strategy.sell_at_market(None)?)?;      ← action combinator
//! ```
//!
//! Rules bind synchronously to one strategy event, filter each raised value,
//! and run their attached actions in order on the raising thread.

#![warn(clippy::all)]

pub mod actions;
pub mod error;
pub mod gate;
pub mod orders;
pub mod rule;
pub mod variants;

pub use actions::{RuleActions, TradeRuleActions, UnitFactory};
pub use error::{RuleError, RuleResult};
pub use gate::{allow_trading_for_code, can_trade, is_formed_and_online_and_allow_trading};
pub use orders::StrategyOrders;
pub use rule::Rule;
pub use variants::{ProtectiveRules, StrategyRules};
