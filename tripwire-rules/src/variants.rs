//! Rule constructors, one per strategy notification.
//!
//! Each constructor binds a [`Rule`] to exactly one event of the owner. The
//! threshold constructors resolve their [`Unit`] against the owner's current
//! value once, when the rule is created:
//!
//! ```text
//! position = 10, when_position_less(Delta(5))  → threshold 5
//!   raise 6 → 6 < 5 false → no activation
//!   raise 4 → 4 < 5 true  → activate(4)
//! ```

use std::sync::{Arc, Weak};

use rust_decimal::Decimal;

use tripwire_domain::{LogLevel, Order, ProcessState, Trade, Unit};
use tripwire_strategy::{ProtectiveActivation, ProtectiveStrategy, Strategy, StrategyFault};

use crate::error::RuleResult;
use crate::rule::Rule;

/// Rule constructors on a strategy.
pub trait StrategyRules {
    /// Every PnL change
    fn when_pnl_changed(&self) -> RuleResult<Rule<Decimal>>;

    /// PnL changes for which `predicate` holds
    fn when_pnl_matches<F>(&self, name: &str, predicate: F) -> RuleResult<Rule<Decimal>>
    where
        F: Fn(Decimal) -> bool + Send + Sync + 'static;

    /// PnL strictly below the resolved level
    fn when_pnl_less(&self, level: Unit) -> RuleResult<Rule<Decimal>>;

    /// PnL strictly above the resolved level
    fn when_pnl_more(&self, level: Unit) -> RuleResult<Rule<Decimal>>;

    /// Every position change
    fn when_position_changed(&self) -> RuleResult<Rule<Decimal>>;

    /// Position changes for which `predicate` holds
    fn when_position_matches<F>(&self, name: &str, predicate: F) -> RuleResult<Rule<Decimal>>
    where
        F: Fn(Decimal) -> bool + Send + Sync + 'static;

    /// Position strictly below the resolved level
    fn when_position_less(&self, level: Unit) -> RuleResult<Rule<Decimal>>;

    /// Position strictly above the resolved level
    fn when_position_more(&self, level: Unit) -> RuleResult<Rule<Decimal>>;

    /// Every own trade
    fn when_new_trade(&self) -> RuleResult<Rule<Trade>>;

    /// Every successful order registration
    fn when_order_registered(&self) -> RuleResult<Rule<Order>>;

    /// Every order state change
    fn when_order_changed(&self) -> RuleResult<Rule<Order>>;

    /// Transitions into a process state accepted by `predicate`
    fn when_process_state<F>(&self, name: &str, predicate: F) -> RuleResult<Rule<Arc<Strategy>>>
    where
        F: Fn(ProcessState) -> bool + Send + Sync + 'static;

    fn when_started(&self) -> RuleResult<Rule<Arc<Strategy>>>;

    fn when_stopping(&self) -> RuleResult<Rule<Arc<Strategy>>>;

    fn when_stopped(&self) -> RuleResult<Rule<Arc<Strategy>>>;

    /// Any property change after which `predicate` holds for the strategy
    fn when_property<F>(&self, name: &str, predicate: F) -> RuleResult<Rule<Arc<Strategy>>>
    where
        F: Fn(&Strategy) -> bool + Send + Sync + 'static;

    /// Error state becomes `Warning`
    fn when_warning(&self) -> RuleResult<Rule<Arc<Strategy>>>;

    /// Errors raised by the strategy and, if `include_children`, its descendants
    fn when_error(&self, include_children: bool) -> RuleResult<Rule<StrategyFault>>;
}

fn value_rule<F>(
    owner: &Arc<Strategy>,
    pnl: bool,
    name: String,
    predicate: F,
) -> RuleResult<Rule<Decimal>>
where
    F: Fn(Decimal) -> bool + Send + Sync + 'static,
{
    let event = if pnl { owner.pnl_changed() } else { owner.position_changed() };
    Rule::bind(owner, event, name, move |value: &Decimal| predicate(*value).then_some(*value))
}

fn state_rule<T, F>(
    owner: &Arc<Strategy>,
    event: &tripwire_strategy::Event<T>,
    name: String,
    predicate: F,
) -> RuleResult<Rule<Arc<Strategy>>>
where
    T: 'static,
    F: Fn(&T, &Strategy) -> bool + Send + Sync + 'static,
{
    let strategy: Weak<Strategy> = Arc::downgrade(owner);
    Rule::bind(owner, event, name, move |value: &T| {
        let strategy = strategy.upgrade()?;
        predicate(value, &strategy).then_some(strategy)
    })
}

impl StrategyRules for Arc<Strategy> {
    fn when_pnl_changed(&self) -> RuleResult<Rule<Decimal>> {
        value_rule(self, true, format!("{} P&L changed", self.name()), |_| true)
    }

    fn when_pnl_matches<F>(&self, name: &str, predicate: F) -> RuleResult<Rule<Decimal>>
    where
        F: Fn(Decimal) -> bool + Send + Sync + 'static,
    {
        value_rule(self, true, name.to_string(), predicate)
    }

    fn when_pnl_less(&self, level: Unit) -> RuleResult<Rule<Decimal>> {
        let threshold = level.below(self.pnl());
        value_rule(self, true, format!("P&L < {}", threshold), move |v| v < threshold)
    }

    fn when_pnl_more(&self, level: Unit) -> RuleResult<Rule<Decimal>> {
        let threshold = level.above(self.pnl());
        value_rule(self, true, format!("P&L > {}", threshold), move |v| v > threshold)
    }

    fn when_position_changed(&self) -> RuleResult<Rule<Decimal>> {
        value_rule(self, false, format!("{} position changed", self.name()), |_| true)
    }

    fn when_position_matches<F>(&self, name: &str, predicate: F) -> RuleResult<Rule<Decimal>>
    where
        F: Fn(Decimal) -> bool + Send + Sync + 'static,
    {
        value_rule(self, false, name.to_string(), predicate)
    }

    fn when_position_less(&self, level: Unit) -> RuleResult<Rule<Decimal>> {
        let threshold = level.below(self.position());
        value_rule(self, false, format!("Pos < {}", threshold), move |v| v < threshold)
    }

    fn when_position_more(&self, level: Unit) -> RuleResult<Rule<Decimal>> {
        let threshold = level.above(self.position());
        value_rule(self, false, format!("Pos > {}", threshold), move |v| v > threshold)
    }

    fn when_new_trade(&self) -> RuleResult<Rule<Trade>> {
        Rule::bind(self, self.new_trade(), format!("{} new trade", self.name()), |t: &Trade| {
            Some(t.clone())
        })
    }

    fn when_order_registered(&self) -> RuleResult<Rule<Order>> {
        let name = format!("{} order registered", self.name());
        Rule::bind(self, self.order_registered(), name, |o: &Order| Some(o.clone()))
    }

    fn when_order_changed(&self) -> RuleResult<Rule<Order>> {
        let name = format!("{} order changed", self.name());
        Rule::bind(self, self.order_changed(), name, |o: &Order| Some(o.clone()))
    }

    fn when_process_state<F>(&self, name: &str, predicate: F) -> RuleResult<Rule<Arc<Strategy>>>
    where
        F: Fn(ProcessState) -> bool + Send + Sync + 'static,
    {
        state_rule(self, self.process_state_changed(), name.to_string(), move |s, _| predicate(*s))
    }

    fn when_started(&self) -> RuleResult<Rule<Arc<Strategy>>> {
        let name = format!("{} started", self.name());
        self.when_process_state(&name, |s| s == ProcessState::Started)
    }

    fn when_stopping(&self) -> RuleResult<Rule<Arc<Strategy>>> {
        let name = format!("{} stopping", self.name());
        self.when_process_state(&name, |s| s == ProcessState::Stopping)
    }

    fn when_stopped(&self) -> RuleResult<Rule<Arc<Strategy>>> {
        let name = format!("{} stopped", self.name());
        self.when_process_state(&name, |s| s == ProcessState::Stopped)
    }

    fn when_property<F>(&self, name: &str, predicate: F) -> RuleResult<Rule<Arc<Strategy>>>
    where
        F: Fn(&Strategy) -> bool + Send + Sync + 'static,
    {
        state_rule(self, self.property_changed(), name.to_string(), move |_, s| predicate(s))
    }

    fn when_warning(&self) -> RuleResult<Rule<Arc<Strategy>>> {
        let name = format!("{} warning", self.name());
        self.when_property(&name, |s| s.error_state() == LogLevel::Warning)
    }

    fn when_error(&self, include_children: bool) -> RuleResult<Rule<StrategyFault>> {
        let own_id = self.id();
        let name = format!("{} error", self.name());
        Rule::bind(self, self.error(), name, move |fault: &StrategyFault| {
            (include_children || fault.origin == own_id).then(|| fault.clone())
        })
    }
}

/// Rule constructors on a protective strategy.
pub trait ProtectiveRules {
    /// The protective strategy fired
    fn when_activated(&self) -> RuleResult<Rule<ProtectiveActivation>>;
}

impl ProtectiveRules for Arc<ProtectiveStrategy> {
    fn when_activated(&self) -> RuleResult<Rule<ProtectiveActivation>> {
        let name = format!("{} activated", self.core().name());
        Rule::bind(self.core(), self.activated(), name, |a: &ProtectiveActivation| Some(a.clone()))
    }
}

// =============================================================================
// Tests
// =============================================================================
