//! Per-strategy rule container.
//!
//! Rules register themselves with their owner on construction. The container
//! keeps them alive and disposes them all when the strategy is disposed.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Type-erased view of a rule, as seen by its owner.
pub trait RuleHandle: Send + Sync {
    /// Unique rule identifier
    fn rule_id(&self) -> Uuid;

    /// Current diagnostic name
    fn rule_name(&self) -> String;

    /// True until the rule is disposed
    fn is_subscribed(&self) -> bool;

    /// Detach the rule from its event.
    ///
    /// Returns `true` only for the call that performed the detach.
    fn dispose(&self) -> bool;
}

/// Rules owned by one strategy.
#[derive(Default)]
pub struct RuleContainer {
    rules: Mutex<Vec<Arc<dyn RuleHandle>>>,
}

impl RuleContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn RuleHandle>>> {
        self.rules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take ownership of a rule. Disposed rules are pruned on the way.
    pub fn add(&self, rule: Arc<dyn RuleHandle>) {
        let mut rules = self.lock();
        rules.retain(|r| r.is_subscribed());
        rules.push(rule);
    }

    /// Forget a rule without disposing it.
    pub fn remove(&self, rule_id: Uuid) -> bool {
        let mut rules = self.lock();
        let before = rules.len();
        rules.retain(|r| r.rule_id() != rule_id);
        rules.len() != before
    }

    /// Number of rules still subscribed.
    pub fn len(&self) -> usize {
        self.lock().iter().filter(|r| r.is_subscribed()).count()
    }

    /// True when no subscribed rule remains.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the subscribed rules, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().filter(|r| r.is_subscribed()).map(|r| r.rule_name()).collect()
    }

    /// Dispose and forget every rule. Returns how many were detached.
    pub fn dispose_all(&self) -> usize {
        // Disposal runs outside the lock: a rule may call back into `remove`.
        let rules = std::mem::take(&mut *self.lock());
        rules.iter().filter(|r| r.dispose()).count()
    }
}

impl fmt::Debug for RuleContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleContainer").field("rules", &self.names()).finish()
    }
}
