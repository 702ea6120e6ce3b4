//! Generic rule: one subscription, a filter, and an ordered action list.
//!
//! # Lifecycle
//!
//! ```text
//! bind() ──► subscribed ──(event passes filter)──► activate ──► actions in order
//!                │
//!                └──dispose() / once-consumed / owner.dispose()──► detached (terminal)
//! ```
//!
//! The rule core is kept alive by the owner's [`RuleContainer`]; the event
//! handler only holds a weak reference to it, and the core only holds a weak
//! reference to its owner. Dropping every [`Rule`] handle does not dispose
//! the rule.
//!
//! [`RuleContainer`]: tripwire_strategy::RuleContainer

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tracing::{debug, trace};
use uuid::Uuid;

use tripwire_strategy::{
    Event, HandlerResult, RuleHandle, Strategy, StrategyError, StrategyResult, Subscription,
};

use crate::error::{RuleError, RuleResult};

type Action<A> = Arc<dyn Fn(&A) -> HandlerResult + Send + Sync>;

// =============================================================================
// RuleCore
// =============================================================================

pub(crate) struct RuleCore<A> {
    id: Uuid,
    name: RwLock<String>,
    owner: Weak<Strategy>,
    owner_name: String,
    subscription: Mutex<Option<Subscription>>,
    live: AtomicBool,
    once: AtomicBool,
    activations: AtomicU64,
    actions: RwLock<Vec<Action<A>>>,
}

impl<A: Send + Sync + 'static> RuleCore<A> {
    fn name(&self) -> String {
        self.name.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn activate(&self, value: &A) -> HandlerResult {
        if !self.live.load(Ordering::Acquire) {
            return Ok(());
        }
        // A one-shot rule activates only for the caller that wins the detach.
        if self.once.load(Ordering::Acquire) && !self.detach() {
            return Ok(());
        }

        let count = self.activations.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(rule = %self.name(), activation = count, "Rule activated");

        let actions = self.actions.read().unwrap_or_else(PoisonError::into_inner).clone();
        for action in actions.iter() {
            action(value)?;
        }
        Ok(())
    }

    fn detach(&self) -> bool {
        if !self.live.swap(false, Ordering::AcqRel) {
            return false;
        }

        let subscription = self.subscription.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        if let Some(owner) = self.owner.upgrade() {
            owner.rules().remove(self.id);
        }

        debug!(rule = %self.name(), owner = %self.owner_name, "Rule disposed");
        true
    }
}

impl<A: Send + Sync + 'static> RuleHandle for RuleCore<A> {
    fn rule_id(&self) -> Uuid {
        self.id
    }

    fn rule_name(&self) -> String {
        self.name()
    }

    fn is_subscribed(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn dispose(&self) -> bool {
        self.detach()
    }
}

// =============================================================================
// Rule
// =============================================================================

/// A live trigger that activates with values of type `A`.
///
/// Cloning a `Rule` clones the handle; all clones refer to the same rule.
pub struct Rule<A> {
    core: Arc<RuleCore<A>>,
}

impl<A> Clone for Rule<A> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<A: Send + Sync + 'static> Rule<A> {
    /// Subscribe a new rule to `event`.
    ///
    /// `filter` maps each raised value to an activation value, or `None` to
    /// skip it. The rule is added to `owner`'s rule container.
    ///
    /// # Errors
    /// Returns `RuleError::InvalidArgument` if `owner` is disposed
    pub fn bind<T, F>(
        owner: &Arc<Strategy>,
        event: &Event<T>,
        name: impl Into<String>,
        filter: F,
    ) -> RuleResult<Self>
    where
        T: 'static,
        F: Fn(&T) -> Option<A> + Send + Sync + 'static,
    {
        let name = name.into();
        if owner.is_disposed() {
            return Err(RuleError::InvalidArgument(format!(
                "Cannot create rule '{}' on disposed strategy {}",
                name,
                owner.name()
            )));
        }

        let core = Arc::new(RuleCore {
            id: Uuid::now_v7(),
            name: RwLock::new(name),
            owner: Arc::downgrade(owner),
            owner_name: owner.name().to_string(),
            subscription: Mutex::new(None),
            live: AtomicBool::new(true),
            once: AtomicBool::new(false),
            activations: AtomicU64::new(0),
            actions: RwLock::new(Vec::new()),
        });

        let weak: Weak<RuleCore<A>> = Arc::downgrade(&core);
        let subscription = event.subscribe(move |value: &T| {
            let Some(core) = weak.upgrade() else {
                return Ok(());
            };
            match filter(value) {
                Some(activation) => core.activate(&activation),
                None => Ok(()),
            }
        });
        *core.subscription.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription);

        owner.rules().add(core.clone());
        // The owner may have drained its container since the check above.
        if owner.is_disposed() {
            core.detach();
            return Err(RuleError::InvalidArgument(format!(
                "Strategy {} was disposed while rule '{}' was created",
                owner.name(),
                core.name()
            )));
        }
        debug!(
            rule = %core.name(),
            owner = %owner.name(),
            event = event.name(),
            "Rule subscribed"
        );

        Ok(Self { core })
    }

    /// Unique rule identifier
    pub fn id(&self) -> Uuid {
        self.core.id
    }

    /// Diagnostic name
    pub fn name(&self) -> String {
        self.core.name()
    }

    /// Rename the rule.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.core.name.write().unwrap_or_else(PoisonError::into_inner) = name.into();
    }

    /// Builder-style [`set_name`](Rule::set_name).
    pub fn named(self, name: impl Into<String>) -> Self {
        self.set_name(name);
        self
    }

    /// True until disposed
    pub fn is_subscribed(&self) -> bool {
        self.core.live.load(Ordering::Acquire)
    }

    /// Number of activations so far
    pub fn activation_count(&self) -> u64 {
        self.core.activations.load(Ordering::Acquire)
    }

    /// Dispose the rule on its first activation.
    pub fn once(self) -> Self {
        self.core.once.store(true, Ordering::Release);
        self
    }

    /// True if the rule is one-shot
    pub fn is_once(&self) -> bool {
        self.core.once.load(Ordering::Acquire)
    }

    /// Strategy the rule was created for.
    ///
    /// # Errors
    /// Returns `RuleError::OwnerUnavailable` if the owner was dropped or disposed
    pub fn owner(&self) -> RuleResult<Arc<Strategy>> {
        match self.core.owner.upgrade() {
            Some(owner) if !owner.is_disposed() => Ok(owner),
            _ => Err(RuleError::OwnerUnavailable(format!(
                "Owner {} of rule '{}' is gone",
                self.core.owner_name,
                self.name()
            ))),
        }
    }

    /// Weak owner handle for action closures, checked at construction.
    pub(crate) fn owner_ref(&self) -> RuleResult<OwnerRef> {
        let owner = self.owner()?;
        Ok(OwnerRef {
            strategy: Arc::downgrade(&owner),
            name: owner.name().to_string(),
        })
    }

    /// Attach an action, run on every activation after those attached before it.
    pub fn on_activated<F>(self, action: F) -> Self
    where
        F: Fn(&A) -> HandlerResult + Send + Sync + 'static,
    {
        self.core.actions.write().unwrap_or_else(PoisonError::into_inner).push(Arc::new(action));
        self
    }

    /// Detach from the event.
    ///
    /// Returns `true` for the call that performed the detach; later calls are
    /// no-ops.
    pub fn dispose(&self) -> bool {
        self.core.detach()
    }
}

impl<A: Send + Sync + 'static> fmt::Debug for Rule<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.core.id)
            .field("name", &self.name())
            .field("owner", &self.core.owner_name)
            .field("subscribed", &self.is_subscribed())
            .field("activations", &self.activation_count())
            .finish()
    }
}

impl<A: Send + Sync + 'static> fmt::Display for Rule<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Non-owning strategy reference captured by action closures.
#[derive(Clone)]
pub(crate) struct OwnerRef {
    strategy: Weak<Strategy>,
    name: String,
}

impl OwnerRef {
    /// Live owner, or `StrategyError::Disposed` at activation time.
    pub(crate) fn get(&self) -> StrategyResult<Arc<Strategy>> {
        match self.strategy.upgrade() {
            Some(strategy) if !strategy.is_disposed() => Ok(strategy),
            _ => Err(StrategyError::Disposed(self.name.clone())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;
    use tripwire_testkit::strategy;

    fn any_position(owner: &Arc<Strategy>) -> Rule<Decimal> {
        Rule::bind(owner, owner.position_changed(), "any", |v: &Decimal| Some(*v)).unwrap()
    }

    fn counting(rule: Rule<Decimal>) -> (Rule<Decimal>, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let rule = rule.on_activated(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (rule, hits)
    }

    #[test]
    fn test_bind_registers_in_container() {
        let (_router, owner) = strategy("host");
        let rule = any_position(&owner);

        assert!(rule.is_subscribed());
        assert_eq!(owner.rules().names(), vec!["any".to_string()]);
        assert_eq!(owner.position_changed().handler_count(), 1);
    }

    #[test]
    fn test_bind_on_disposed_owner_fails() {
        let (_router, owner) = strategy("host");
        owner.dispose();

        let result = Rule::bind(&owner, owner.pnl_changed(), "late", |v: &Decimal| Some(*v));
        assert!(matches!(result, Err(RuleError::InvalidArgument(_))));
    }

    #[test]
    fn test_actions_run_in_attachment_order() {
        let (_router, owner) = strategy("host");
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&log), Arc::clone(&log));
        let _rule = any_position(&owner)
            .on_activated(move |v| {
                a.lock().unwrap().push(("first", *v));
                Ok(())
            })
            .on_activated(move |v| {
                b.lock().unwrap().push(("second", *v));
                Ok(())
            });

        owner.set_position(dec!(3)).unwrap();

        assert_eq!(*log.lock().unwrap(), vec![("first", dec!(3)), ("second", dec!(3))]);
    }

    #[test]
    fn test_dispose_is_idempotent_and_silences_rule() {
        let (_router, owner) = strategy("host");
        let (rule, hits) = counting(any_position(&owner));

        owner.set_position(dec!(1)).unwrap();
        assert!(rule.dispose());
        assert!(!rule.dispose());
        owner.set_position(dec!(2)).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(owner.position_changed().handler_count(), 0);
        assert!(owner.rules().is_empty());
    }

    #[test]
    fn test_once_disposes_on_first_activation() {
        let (_router, owner) = strategy("host");
        let (rule, hits) = counting(any_position(&owner).once());

        owner.set_position(dec!(1)).unwrap();
        owner.set_position(dec!(2)).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(rule.activation_count(), 1);
        assert!(!rule.is_subscribed());
    }

    #[test]
    fn test_rule_survives_dropped_handle() {
        let (_router, owner) = strategy("host");
        let hits = {
            let (_rule, hits) = counting(any_position(&owner));
            hits
        };

        owner.set_position(dec!(1)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_owner_dispose_detaches_rules() {
        let (_router, owner) = strategy("host");
        let (rule, hits) = counting(any_position(&owner));

        owner.dispose();
        owner.set_position(dec!(5)).unwrap();

        assert!(!rule.is_subscribed());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(matches!(rule.owner(), Err(RuleError::OwnerUnavailable(_))));
    }

    #[test]
    fn test_action_error_reaches_raiser() {
        let (_router, owner) = strategy("host");
        let _rule = any_position(&owner)
            .on_activated(|_| Err(StrategyError::InvalidCommand("nope".to_string())));

        assert!(matches!(
            owner.set_position(dec!(1)),
            Err(StrategyError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_action_may_dispose_its_rule() {
        let (_router, owner) = strategy("host");
        let slot: Arc<Mutex<Option<Rule<Decimal>>>> = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        let rule = any_position(&owner).on_activated(move |_| {
            if let Some(rule) = inner.lock().unwrap().as_ref() {
                rule.dispose();
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(rule.clone());

        owner.set_position(dec!(1)).unwrap();
        owner.set_position(dec!(2)).unwrap();

        assert_eq!(rule.activation_count(), 1);
    }

    #[test]
    fn test_bind_racing_owner_dispose_leaves_nothing_live() {
        for _ in 0..50 {
            let (_router, owner) = strategy("host");

            let bound: Vec<Rule<Decimal>> = std::thread::scope(|scope| {
                let binder = scope.spawn(|| {
                    (0..20)
                        .filter_map(|_| {
                            Rule::bind(&owner, owner.position_changed(), "racer", |v: &Decimal| {
                                Some(*v)
                            })
                            .ok()
                        })
                        .collect()
                });
                owner.dispose();
                binder.join().unwrap()
            });

            assert!(bound.iter().all(|rule| !rule.is_subscribed()));
            assert!(owner.rules().is_empty());
            assert_eq!(owner.position_changed().handler_count(), 0);
        }
    }

    #[test]
    fn test_set_name() {
        let (_router, owner) = strategy("host");
        let rule = any_position(&owner).named("entry guard");

        assert_eq!(rule.to_string(), "entry guard");
        assert_eq!(owner.rules().names(), vec!["entry guard".to_string()]);
    }
}
