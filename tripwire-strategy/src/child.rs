//! Child strategies spawned by actions: protective (take-profit / stop-loss)
//! and quoting.
//!
//! Each child wraps its own [`Strategy`] core, created with
//! [`Strategy::new_child`] so it shares the parent's router, security and
//! portfolio. The parent holds children as [`ChildStrategy`] values.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tripwire_domain::{Order, OrderSide, OrderStatus, Price, Quantity, Trade, Unit};

use crate::error::{StrategyError, StrategyResult};
use crate::event::Event;
use crate::strategy::{Strategy, StrategyId};

// =============================================================================
// ChildStrategy
// =============================================================================

/// A strategy attached to a parent.
#[derive(Debug, Clone)]
pub enum ChildStrategy {
    /// Plain strategy core
    Generic(Arc<Strategy>),
    /// Works an order toward a target position
    Quoting(Arc<QuotingStrategy>),
    /// Guards a trade with take-profit and/or stop-loss
    Protective(Arc<ProtectiveStrategy>),
}

impl ChildStrategy {
    /// Underlying strategy core
    pub fn strategy(&self) -> &Arc<Strategy> {
        match self {
            ChildStrategy::Generic(s) => s,
            ChildStrategy::Quoting(q) => &q.core,
            ChildStrategy::Protective(p) => &p.core,
        }
    }

    /// Short kind label for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            ChildStrategy::Generic(_) => "generic",
            ChildStrategy::Quoting(_) => "quoting",
            ChildStrategy::Protective(_) => "protective",
        }
    }
}

// =============================================================================
// Quoting
// =============================================================================

/// Child that keeps one limit order working for a fixed side and volume.
///
/// Each call to [`quote`](QuotingStrategy::quote) places the order at the
/// given price, replacing the previous one if it is still active.
pub struct QuotingStrategy {
    core: Arc<Strategy>,
    side: OrderSide,
    volume: Quantity,
    working: Mutex<Option<Order>>,
}

impl QuotingStrategy {
    /// Create a quoting child of `parent`.
    pub fn new(parent: &Strategy, side: OrderSide, volume: Quantity) -> Arc<Self> {
        let core = parent.new_child(format!("Quoting {} {}", side, volume));
        Arc::new(Self {
            core,
            side,
            volume,
            working: Mutex::new(None),
        })
    }

    pub fn core(&self) -> &Arc<Strategy> {
        &self.core
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    pub fn volume(&self) -> Quantity {
        self.volume
    }

    /// Order currently being worked, if any
    pub fn working_order(&self) -> Option<Order> {
        let working = self.working.lock().unwrap_or_else(PoisonError::into_inner).clone();
        working.and_then(|o| self.core.order(o.id))
    }

    /// Place (or move) the quote to `price`.
    pub fn quote(&self, price: Price) -> StrategyResult<Order> {
        let security = self.core.security().cloned().ok_or_else(|| {
            StrategyError::InvalidCommand(format!("{} has no security", self.core.name()))
        })?;
        let portfolio = self.core.portfolio().cloned();
        let order = Order::limit(security, portfolio, self.side, self.volume, price);

        let active = match self.working_order() {
            Some(current) if current.status == OrderStatus::Active => {
                if current.price == Some(price) {
                    return Ok(current);
                }
                self.core.re_register_order(&current, order)?
            }
            _ => self.core.register_order(order)?,
        };

        debug!(strategy = %self.core.name(), price = %price, "Quote moved");
        *self.working.lock().unwrap_or_else(PoisonError::into_inner) = Some(active.clone());
        Ok(active)
    }
}

impl fmt::Debug for QuotingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotingStrategy")
            .field("name", &self.core.name())
            .field("side", &self.side)
            .field("volume", &self.volume)
            .finish()
    }
}

// =============================================================================
// Protective
// =============================================================================

/// Which protective leg fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectiveLeg {
    TakeProfit,
    StopLoss,
}

/// Protection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectiveKind {
    TakeProfit(Unit),
    StopLoss(Unit),
    TakeProfitStopLoss { take_profit: Unit, stop_loss: Unit },
}

impl ProtectiveKind {
    /// Combine optional legs; `None` when both are absent.
    pub fn from_legs(take_profit: Option<Unit>, stop_loss: Option<Unit>) -> Option<Self> {
        match (take_profit, stop_loss) {
            (Some(take_profit), Some(stop_loss)) => {
                Some(ProtectiveKind::TakeProfitStopLoss {
                    take_profit,
                    stop_loss,
                })
            }
            (Some(tp), None) => Some(ProtectiveKind::TakeProfit(tp)),
            (None, Some(sl)) => Some(ProtectiveKind::StopLoss(sl)),
            (None, None) => None,
        }
    }

    pub fn take_profit(&self) -> Option<Unit> {
        match self {
            ProtectiveKind::TakeProfit(u) => Some(*u),
            ProtectiveKind::TakeProfitStopLoss { take_profit, .. } => Some(*take_profit),
            ProtectiveKind::StopLoss(_) => None,
        }
    }

    pub fn stop_loss(&self) -> Option<Unit> {
        match self {
            ProtectiveKind::StopLoss(u) => Some(*u),
            ProtectiveKind::TakeProfitStopLoss { stop_loss, .. } => Some(*stop_loss),
            ProtectiveKind::TakeProfit(_) => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ProtectiveKind::TakeProfit(_) => "TakeProfit",
            ProtectiveKind::StopLoss(_) => "StopLoss",
            ProtectiveKind::TakeProfitStopLoss { .. } => "TakeProfitStopLoss",
        }
    }
}

/// Payload raised when a protective strategy fires.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectiveActivation {
    pub strategy_id: StrategyId,
    pub leg: ProtectiveLeg,
    /// Trade being protected
    pub trade: Trade,
    /// Market price that crossed the level
    pub trigger_price: Decimal,
    /// Level that was crossed
    pub level: Decimal,
    /// Registered closing order
    pub close_order: Order,
}

/// Child that closes a trade once the market crosses its take-profit or
/// stop-loss level.
///
/// Levels are fixed at construction from the trade price: for a buy trade
/// the take-profit sits above and the stop-loss below, mirrored for a sell.
pub struct ProtectiveStrategy {
    core: Arc<Strategy>,
    kind: ProtectiveKind,
    trade: Trade,
    take_profit: Option<Decimal>,
    stop_loss: Option<Decimal>,
    fired: AtomicBool,
    activated: Event<ProtectiveActivation>,
}

impl ProtectiveStrategy {
    /// Create a protective child of `parent` for `trade`.
    pub fn new(parent: &Strategy, trade: Trade, kind: ProtectiveKind) -> Arc<Self> {
        let price = trade.price.as_decimal();
        let (take_profit, stop_loss) = match trade.side {
            OrderSide::Buy => (
                kind.take_profit().map(|u| u.above(price)),
                kind.stop_loss().map(|u| u.below(price)),
            ),
            OrderSide::Sell => (
                kind.take_profit().map(|u| u.below(price)),
                kind.stop_loss().map(|u| u.above(price)),
            ),
        };

        let core = parent.new_child(format!("{} {}", kind.label(), trade.id));
        info!(
            strategy = %core.name(),
            side = %trade.side,
            price = %price,
            take_profit = ?take_profit,
            stop_loss = ?stop_loss,
            "Protective strategy created"
        );

        Arc::new(Self {
            core,
            kind,
            trade,
            take_profit,
            stop_loss,
            fired: AtomicBool::new(false),
            activated: Event::new("protective_activated"),
        })
    }

    pub fn core(&self) -> &Arc<Strategy> {
        &self.core
    }

    pub fn kind(&self) -> ProtectiveKind {
        self.kind
    }

    pub fn trade(&self) -> &Trade {
        &self.trade
    }

    pub fn take_profit_level(&self) -> Option<Decimal> {
        self.take_profit
    }

    pub fn stop_loss_level(&self) -> Option<Decimal> {
        self.stop_loss
    }

    /// True once a leg has fired
    pub fn is_activated(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Raised once, when a leg fires
    pub fn activated(&self) -> &Event<ProtectiveActivation> {
        &self.activated
    }

    fn crossed(&self, price: Decimal) -> Option<(ProtectiveLeg, Decimal)> {
        let long = self.trade.side == OrderSide::Buy;
        if let Some(level) = self.take_profit {
            if (long && price >= level) || (!long && price <= level) {
                return Some((ProtectiveLeg::TakeProfit, level));
            }
        }
        if let Some(level) = self.stop_loss {
            if (long && price <= level) || (!long && price >= level) {
                return Some((ProtectiveLeg::StopLoss, level));
            }
        }
        None
    }

    /// Feed a market price.
    ///
    /// When a level is crossed for the first time, registers a closing order
    /// (opposite side, trade volume), raises `activated` and disposes the
    /// child core, which releases it from its parent. If the closing order
    /// cannot be registered the error is returned and the child stays armed.
    /// Later calls return `Ok(None)`.
    pub fn on_price(&self, price: Decimal) -> StrategyResult<Option<ProtectiveActivation>> {
        if self.core.is_disposed() {
            return Ok(None);
        }
        let Some((leg, level)) = self.crossed(price) else {
            return Ok(None);
        };
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }

        let close_order = match self.close(price) {
            Ok(order) => order,
            Err(e) => {
                self.fired.store(false, Ordering::Release);
                warn!(
                    strategy = %self.core.name(),
                    leg = ?leg,
                    price = %price,
                    error = %e,
                    "Protective close failed, staying armed"
                );
                return Err(e);
            }
        };

        info!(
            strategy = %self.core.name(),
            leg = ?leg,
            level = %level,
            price = %price,
            "Protective strategy fired"
        );

        let activation = ProtectiveActivation {
            strategy_id: self.core.id(),
            leg,
            trade: self.trade.clone(),
            trigger_price: price,
            level,
            close_order,
        };
        let raised = self.activated.raise(&activation);
        self.core.dispose();
        raised?;
        Ok(Some(activation))
    }

    fn close(&self, price: Decimal) -> StrategyResult<Order> {
        let side = self.trade.side.invert();
        let security = self.trade.security.clone();
        let portfolio = self.core.portfolio().cloned();
        let order = if security.supports_market_orders() {
            Order::market(security, portfolio, side, self.trade.volume)
        } else {
            Order::limit(security, portfolio, side, self.trade.volume, Price::new(price)?)
        };
        self.core.register_order(order)
    }
}

impl fmt::Debug for ProtectiveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectiveStrategy")
            .field("name", &self.core.name())
            .field("kind", &self.kind)
            .field("take_profit", &self.take_profit)
            .field("stop_loss", &self.stop_loss)
            .field("fired", &self.is_activated())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::RecordingRouter;
    use crate::ports::RouterCommand;
    use rust_decimal_macros::dec;
    use tripwire_domain::Security;

    fn parent() -> (Arc<RecordingRouter>, Arc<Strategy>) {
        let router = Arc::new(RecordingRouter::new());
        let strategy = Strategy::builder("parent", router.clone())
            .security(Security::new("ETHUSDT", "BINANCE").unwrap())
            .build();
        (router, strategy)
    }

    fn trade(strategy: &Strategy, side: OrderSide, price: Decimal) -> Trade {
        let order = Order::market(
            strategy.security().unwrap().clone(),
            None,
            side,
            Quantity::new(dec!(2)).unwrap(),
        );
        Trade::new(&order, Price::new(price).unwrap(), Quantity::new(dec!(2)).unwrap())
    }

    #[test]
    fn test_kind_from_legs() {
        let tp = Unit::Delta(dec!(5));
        let sl = Unit::Percent(dec!(1));

        assert_eq!(ProtectiveKind::from_legs(Some(tp), None), Some(ProtectiveKind::TakeProfit(tp)));
        assert_eq!(ProtectiveKind::from_legs(None, Some(sl)), Some(ProtectiveKind::StopLoss(sl)));
        assert_eq!(
            ProtectiveKind::from_legs(Some(tp), Some(sl)),
            Some(ProtectiveKind::TakeProfitStopLoss {
                take_profit: tp,
                stop_loss: sl,
            })
        );
        assert_eq!(ProtectiveKind::from_legs(None, None), None);
    }

    #[test]
    fn test_levels_for_buy_and_sell() {
        let (_router, parent) = parent();
        let kind = ProtectiveKind::TakeProfitStopLoss {
            take_profit: Unit::Delta(dec!(10)),
            stop_loss: Unit::Delta(dec!(5)),
        };

        let long_trade = trade(&parent, OrderSide::Buy, dec!(100));
        let long = ProtectiveStrategy::new(&parent, long_trade, kind);
        assert_eq!(long.take_profit_level(), Some(dec!(110)));
        assert_eq!(long.stop_loss_level(), Some(dec!(95)));

        let short_trade = trade(&parent, OrderSide::Sell, dec!(100));
        let short = ProtectiveStrategy::new(&parent, short_trade, kind);
        assert_eq!(short.take_profit_level(), Some(dec!(90)));
        assert_eq!(short.stop_loss_level(), Some(dec!(105)));
    }

    #[test]
    fn test_stop_loss_fires_once() {
        let (router, parent) = parent();
        let protective = ProtectiveStrategy::new(
            &parent,
            trade(&parent, OrderSide::Buy, dec!(100)),
            ProtectiveKind::StopLoss(Unit::Delta(dec!(5))),
        );

        assert!(protective.on_price(dec!(97)).unwrap().is_none());

        let activation = protective.on_price(dec!(94)).unwrap().unwrap();
        assert_eq!(activation.leg, ProtectiveLeg::StopLoss);
        assert_eq!(activation.level, dec!(95));
        assert_eq!(activation.close_order.side, OrderSide::Sell);
        assert_eq!(activation.close_order.volume.as_decimal(), dec!(2));

        assert!(protective.on_price(dec!(90)).unwrap().is_none());
        assert!(protective.is_activated());
        assert_eq!(router.len(), 1);
        assert!(matches!(router.commands()[0], RouterCommand::Register(_)));
    }

    #[test]
    fn test_take_profit_on_short() {
        let (_router, parent) = parent();
        let protective = ProtectiveStrategy::new(
            &parent,
            trade(&parent, OrderSide::Sell, dec!(200)),
            ProtectiveKind::TakeProfit(Unit::Percent(dec!(10))),
        );

        let activation = protective.on_price(dec!(180)).unwrap().unwrap();
        assert_eq!(activation.leg, ProtectiveLeg::TakeProfit);
        assert_eq!(activation.close_order.side, OrderSide::Buy);
    }

    #[test]
    fn test_failed_close_stays_armed() {
        let (router, parent) = parent();
        let protective = ProtectiveStrategy::new(
            &parent,
            trade(&parent, OrderSide::Buy, dec!(100)),
            ProtectiveKind::StopLoss(Unit::Delta(dec!(5))),
        );
        router.set_fail_next(true);

        assert!(matches!(protective.on_price(dec!(94)), Err(StrategyError::OrderRejected(_))));
        assert!(!protective.is_activated());
        assert!(router.is_empty());

        let activation = protective.on_price(dec!(90)).unwrap().unwrap();
        assert_eq!(activation.trigger_price, dec!(90));
        assert!(protective.is_activated());
        assert_eq!(router.registered().len(), 1);
    }

    #[test]
    fn test_fired_child_leaves_parent() {
        let (_router, parent) = parent();
        let protective = ProtectiveStrategy::new(
            &parent,
            trade(&parent, OrderSide::Buy, dec!(100)),
            ProtectiveKind::TakeProfit(Unit::Delta(dec!(1))),
        );
        parent.add_child(ChildStrategy::Protective(protective.clone())).unwrap();
        assert_eq!(parent.children().len(), 1);

        protective.on_price(dec!(101)).unwrap().unwrap();

        assert!(protective.core().is_disposed());
        assert!(parent.children().is_empty());
        assert_eq!(protective.core().error().handler_count(), 0);
        assert!(protective.on_price(dec!(102)).unwrap().is_none());
    }

    #[test]
    fn test_quote_moves_working_order() {
        let (router, parent) = parent();
        let volume = Quantity::new(dec!(3)).unwrap();
        let quoting = QuotingStrategy::new(&parent, OrderSide::Buy, volume);

        let first = quoting.quote(Price::new(dec!(10)).unwrap()).unwrap();
        let same = quoting.quote(Price::new(dec!(10)).unwrap()).unwrap();
        let moved = quoting.quote(Price::new(dec!(11)).unwrap()).unwrap();

        assert_eq!(first.id, same.id);
        assert_ne!(first.id, moved.id);
        assert_eq!(router.len(), 2);
        assert!(matches!(
            &router.commands()[1],
            RouterCommand::ReRegister { old, .. } if *old == first.id
        ));
        assert_eq!(quoting.working_order().unwrap().id, moved.id);
    }
}
