//! Tripwire Strategy Host
//!
//! The strategy side of the rule engine: the [`Event`] primitive, the
//! [`Strategy`] state holder with its change notifications and commands,
//! child strategies, and the [`OrderRouter`] port.
//!
//! # Architecture
//!
//! ```text
//! collaborator ──set_position()──► Strategy ──position_changed.raise()──► handlers
//!                                     │
//!                                     └──register_order()──► OrderRouter
//! ```

#![warn(clippy::all)]

pub mod child;
pub mod container;
pub mod error;
pub mod event;
pub mod ports;
pub mod strategy;
pub mod stub;

pub use child::{
    ChildStrategy, ProtectiveActivation, ProtectiveKind, ProtectiveLeg, ProtectiveStrategy,
    QuotingStrategy,
};
pub use container::{RuleContainer, RuleHandle};
pub use error::{StrategyError, StrategyResult};
pub use event::{Event, HandlerResult, Subscription};
pub use ports::{OrderRouter, RouterCommand};
pub use strategy::{Strategy, StrategyBuilder, StrategyFault, StrategyId, StrategyProperty};
pub use stub::RecordingRouter;
