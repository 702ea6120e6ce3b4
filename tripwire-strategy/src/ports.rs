//! Order routing port.
//!
//! The strategy never talks to a venue directly. Commands issued through the
//! rule layer land on an [`OrderRouter`]; adapters implement it for a real
//! connector, [`RecordingRouter`](crate::stub::RecordingRouter) for tests.

use serde::{Deserialize, Serialize};
use tripwire_domain::{Order, OrderId};

use crate::error::StrategyResult;

/// Port for order commands (register/replace/cancel).
///
/// Calls are synchronous; an adapter that talks to a remote venue is expected
/// to enqueue and return.
pub trait OrderRouter: Send + Sync {
    /// Send a new order.
    fn register(&self, order: &Order) -> StrategyResult<()>;

    /// Replace `old` with `new` atomically on the venue.
    fn re_register(&self, old: &Order, new: &Order) -> StrategyResult<()>;

    /// Cancel a working order.
    fn cancel(&self, order: &Order) -> StrategyResult<()>;
}

/// A command observed by a router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RouterCommand {
    /// `register` was called
    Register(Order),
    /// `re_register` was called
    ReRegister {
        /// Order being replaced
        old: OrderId,
        /// Replacement order
        new: Order,
    },
    /// `cancel` was called
    Cancel(OrderId),
}
