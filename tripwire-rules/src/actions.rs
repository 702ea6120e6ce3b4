//! Action combinators.
//!
//! Each combinator resolves the rule's owner once, when it is attached, and
//! captures it weakly. At activation time a dropped or disposed owner
//! surfaces as `StrategyError::Disposed`.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use tripwire_domain::{Order, Trade, Unit};
use tripwire_strategy::{ChildStrategy, ProtectiveKind, ProtectiveStrategy};

use crate::error::{RuleError, RuleResult};
use crate::orders::StrategyOrders;
use crate::rule::Rule;

/// Builds a protective level from the trade being protected.
pub type UnitFactory = Box<dyn Fn(&Trade) -> Unit + Send + Sync>;

/// Order and position actions, available on every rule.
pub trait RuleActions: Sized {
    /// Register `order` on activation.
    fn register(self, order: Order) -> RuleResult<Self>;

    /// Replace `old` with `new` on activation.
    ///
    /// # Errors
    /// `RuleError::InvalidArgument` if both are the same order
    fn re_register(self, old: Order, new: Order) -> RuleResult<Self>;

    /// Cancel `order` on activation.
    fn cancel(self, order: Order) -> RuleResult<Self>;

    /// Flatten the position on activation.
    fn close_position(self, slippage: Decimal) -> RuleResult<Self>;

    /// Spawn a quoting child toward `target` on activation.
    fn open_position_by_quoting(self, target: Decimal) -> RuleResult<Self>;

    /// Spawn a quoting child that flattens the position on activation.
    fn close_position_by_quoting(self) -> RuleResult<Self>;
}

impl<A: Send + Sync + 'static> RuleActions for Rule<A> {
    fn register(self, order: Order) -> RuleResult<Self> {
        let owner = self.owner_ref()?;
        Ok(self.on_activated(move |_| {
            owner.get()?.register_order(order.clone())?;
            Ok(())
        }))
    }

    fn re_register(self, old: Order, new: Order) -> RuleResult<Self> {
        if old.id == new.id {
            return Err(RuleError::InvalidArgument(format!(
                "Order {} cannot replace itself",
                old.id
            )));
        }
        let owner = self.owner_ref()?;
        Ok(self.on_activated(move |_| {
            owner.get()?.re_register_order(&old, new.clone())?;
            Ok(())
        }))
    }

    fn cancel(self, order: Order) -> RuleResult<Self> {
        let owner = self.owner_ref()?;
        Ok(self.on_activated(move |_| owner.get()?.cancel_order(&order)))
    }

    fn close_position(self, slippage: Decimal) -> RuleResult<Self> {
        let owner = self.owner_ref()?;
        Ok(self.on_activated(move |_| {
            owner.get()?.close_position(slippage)?;
            Ok(())
        }))
    }

    fn open_position_by_quoting(self, target: Decimal) -> RuleResult<Self> {
        let owner = self.owner_ref()?;
        Ok(self.on_activated(move |_| {
            owner.get()?.open_position_by_quoting(target)?;
            Ok(())
        }))
    }

    fn close_position_by_quoting(self) -> RuleResult<Self> {
        self.open_position_by_quoting(Decimal::ZERO)
    }
}

/// Actions for rules that activate with a trade.
pub trait TradeRuleActions: Sized {
    /// Guard every trade with fixed take-profit and/or stop-loss units.
    ///
    /// # Errors
    /// `RuleError::InvalidConfiguration` if both legs are `None`
    fn protect(self, take_profit: Option<Unit>, stop_loss: Option<Unit>) -> RuleResult<Self>;

    /// Guard every trade with units computed from the trade.
    fn protect_with(
        self,
        take_profit: Option<UnitFactory>,
        stop_loss: Option<UnitFactory>,
    ) -> RuleResult<Self>;
}

impl TradeRuleActions for Rule<Trade> {
    fn protect(self, take_profit: Option<Unit>, stop_loss: Option<Unit>) -> RuleResult<Self> {
        let fixed = |unit: Unit| -> UnitFactory { Box::new(move |_: &Trade| unit) };
        self.protect_with(take_profit.map(fixed), stop_loss.map(fixed))
    }

    fn protect_with(
        self,
        take_profit: Option<UnitFactory>,
        stop_loss: Option<UnitFactory>,
    ) -> RuleResult<Self> {
        if take_profit.is_none() && stop_loss.is_none() {
            return Err(RuleError::InvalidConfiguration(format!(
                "Rule '{}' needs a take-profit or a stop-loss",
                self.name()
            )));
        }
        let owner = self.owner_ref()?;

        Ok(self.on_activated(move |trade: &Trade| {
            let strategy = owner.get()?;
            let kind = ProtectiveKind::from_legs(
                take_profit.as_ref().map(|f| f(trade)),
                stop_loss.as_ref().map(|f| f(trade)),
            )
            .ok_or_else(|| RuleError::InvalidConfiguration("No protective leg".to_string()))?;

            let protective = ProtectiveStrategy::new(&strategy, trade.clone(), kind);
            info!(
                strategy = %strategy.name(),
                trade_id = %trade.id,
                child = %protective.core().name(),
                "Protecting trade"
            );
            strategy.add_child(ChildStrategy::Protective(Arc::clone(&protective)))
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================
