//! Stub router for testing.
//!
//! Records every command and accepts it, unless told to fail the next one.

use std::sync::RwLock;

use tripwire_domain::Order;

use crate::error::{StrategyError, StrategyResult};
use crate::ports::{OrderRouter, RouterCommand};

/// Router that records commands instead of routing them.
#[derive(Debug, Default)]
pub struct RecordingRouter {
    commands: RwLock<Vec<RouterCommand>>,
    fail_next: RwLock<bool>,
}

impl RecordingRouter {
    /// Create an empty recording router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the next command to be rejected.
    pub fn set_fail_next(&self, fail: bool) {
        *self.fail_next.write().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    /// All commands seen so far, oldest first.
    pub fn commands(&self) -> Vec<RouterCommand> {
        self.commands.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Orders passed to `register`, oldest first.
    pub fn registered(&self) -> Vec<Order> {
        self.commands()
            .into_iter()
            .filter_map(|cmd| match cmd {
                RouterCommand::Register(order) => Some(order),
                _ => None,
            })
            .collect()
    }

    /// Number of commands seen so far.
    pub fn len(&self) -> usize {
        self.commands.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True if no command has been seen.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget recorded commands.
    pub fn clear(&self) {
        self.commands.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn should_fail(&self) -> bool {
        let mut fail_next = self.fail_next.write().unwrap_or_else(|e| e.into_inner());
        let fail = *fail_next;
        *fail_next = false; // Reset after check
        fail
    }

    fn record(&self, command: RouterCommand) -> StrategyResult<()> {
        if self.should_fail() {
            return Err(StrategyError::OrderRejected("Simulated router failure".to_string()));
        }
        self.commands.write().unwrap_or_else(|e| e.into_inner()).push(command);
        Ok(())
    }
}

impl OrderRouter for RecordingRouter {
    fn register(&self, order: &Order) -> StrategyResult<()> {
        tracing::debug!(order_id = %order.id, "Stub: order registered");
        self.record(RouterCommand::Register(order.clone()))
    }

    fn re_register(&self, old: &Order, new: &Order) -> StrategyResult<()> {
        tracing::debug!(old = %old.id, new = %new.id, "Stub: order replaced");
        self.record(RouterCommand::ReRegister {
            old: old.id,
            new: new.clone(),
        })
    }

    fn cancel(&self, order: &Order) -> StrategyResult<()> {
        tracing::debug!(order_id = %order.id, "Stub: order cancelled");
        self.record(RouterCommand::Cancel(order.id))
    }
}
