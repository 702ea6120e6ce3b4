//! Strategy host: state, change notifications and commands.
//!
//! A [`Strategy`] is shared as `Arc<Strategy>`. External collaborators
//! (position accounting, connectors, the order book) push changes in through
//! the `set_*`/`process_*` methods; every change is published on the matching
//! [`Event`] after the state lock has been released. Rules and actions issue
//! commands back through `register_order`, `re_register_order`,
//! `cancel_order` and `add_child`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tripwire_domain::{
    LogLevel, Order, OrderId, OrderStatus, Portfolio, Price, ProcessState, Security, Trade,
    TradingMode,
};

use crate::child::ChildStrategy;
use crate::container::RuleContainer;
use crate::error::{StrategyError, StrategyResult};
use crate::event::{Event, HandlerResult, Subscription};
use crate::ports::OrderRouter;

/// Unique identifier for a Strategy
pub type StrategyId = Uuid;

// =============================================================================
// Notification payloads
// =============================================================================

/// Property reported by a property-changed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyProperty {
    Position,
    PnL,
    ProcessState,
    TradingMode,
    IsFormed,
    IsOnline,
    ErrorState,
    Volume,
    LastPrice,
    Children,
}

/// Error raised by a strategy or one of its descendants.
#[derive(Debug, Clone)]
pub struct StrategyFault {
    /// Strategy the error originated in
    pub origin: StrategyId,
    /// Name of the originating strategy
    pub origin_name: String,
    /// The error itself
    pub error: Arc<dyn std::error::Error + Send + Sync>,
}

impl fmt::Display for StrategyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin_name, self.error)
    }
}

#[derive(Debug, Clone)]
struct StrategyState {
    position: Decimal,
    pnl: Decimal,
    process_state: ProcessState,
    trading_mode: TradingMode,
    is_formed: bool,
    is_online: bool,
    error_state: LogLevel,
    volume: Decimal,
    last_price: Option<Price>,
    disposed: bool,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`Strategy`].
pub struct StrategyBuilder {
    name: String,
    router: Arc<dyn OrderRouter>,
    security: Option<Security>,
    portfolio: Option<Portfolio>,
    volume: Decimal,
    trading_mode: TradingMode,
    position: Decimal,
}

impl StrategyBuilder {
    /// Instrument the strategy trades
    pub fn security(mut self, security: Security) -> Self {
        self.security = Some(security);
        self
    }

    /// Account orders are booked against
    pub fn portfolio(mut self, portfolio: Portfolio) -> Self {
        self.portfolio = Some(portfolio);
        self
    }

    /// Default order volume (1 if not set)
    pub fn volume(mut self, volume: Decimal) -> Self {
        self.volume = volume;
        self
    }

    /// Initial trading mode (`Full` if not set)
    pub fn trading_mode(mut self, mode: TradingMode) -> Self {
        self.trading_mode = mode;
        self
    }

    /// Initial position, for strategies resumed mid-session
    pub fn position(mut self, position: Decimal) -> Self {
        self.position = position;
        self
    }

    /// Build the shared strategy.
    pub fn build(self) -> Arc<Strategy> {
        Arc::new(Strategy {
            id: Uuid::now_v7(),
            name: self.name,
            security: self.security,
            portfolio: self.portfolio,
            router: self.router,
            state: RwLock::new(StrategyState {
                position: self.position,
                pnl: Decimal::ZERO,
                process_state: ProcessState::Stopped,
                trading_mode: self.trading_mode,
                is_formed: false,
                is_online: false,
                error_state: LogLevel::Info,
                volume: self.volume,
                last_price: None,
                disposed: false,
            }),
            orders: RwLock::new(HashMap::new()),
            children: RwLock::new(Vec::new()),
            child_links: Mutex::new(Vec::new()),
            parent: Mutex::new(Weak::new()),
            rules: RuleContainer::new(),
            pnl_changed: Event::new("pnl_changed"),
            position_changed: Event::new("position_changed"),
            new_trade: Event::new("new_trade"),
            order_registered: Event::new("order_registered"),
            order_changed: Event::new("order_changed"),
            process_state_changed: Event::new("process_state_changed"),
            property_changed: Event::new("property_changed"),
            error: Event::new("error"),
        })
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// A trading strategy as seen by the rule layer.
pub struct Strategy {
    id: StrategyId,
    name: String,
    security: Option<Security>,
    portfolio: Option<Portfolio>,
    router: Arc<dyn OrderRouter>,
    state: RwLock<StrategyState>,
    orders: RwLock<HashMap<OrderId, Order>>,
    children: RwLock<Vec<ChildStrategy>>,
    child_links: Mutex<Vec<(StrategyId, Subscription)>>,
    parent: Mutex<Weak<Strategy>>,
    rules: RuleContainer,

    pnl_changed: Event<Decimal>,
    position_changed: Event<Decimal>,
    new_trade: Event<Trade>,
    order_registered: Event<Order>,
    order_changed: Event<Order>,
    process_state_changed: Event<ProcessState>,
    property_changed: Event<StrategyProperty>,
    error: Event<StrategyFault>,
}

impl Strategy {
    /// Start building a strategy that routes orders through `router`.
    pub fn builder(name: impl Into<String>, router: Arc<dyn OrderRouter>) -> StrategyBuilder {
        StrategyBuilder {
            name: name.into(),
            router,
            security: None,
            portfolio: None,
            volume: Decimal::ONE,
            trading_mode: TradingMode::Full,
            position: Decimal::ZERO,
        }
    }

    /// Build a child core that inherits router, instrument, portfolio and volume.
    pub fn new_child(&self, name: impl Into<String>) -> Arc<Strategy> {
        let mut builder = Strategy::builder(name, Arc::clone(&self.router)).volume(self.volume());
        if let Some(security) = &self.security {
            builder = builder.security(security.clone());
        }
        if let Some(portfolio) = &self.portfolio {
            builder = builder.portfolio(portfolio.clone());
        }
        builder.build()
    }

    fn read(&self) -> RwLockReadGuard<'_, StrategyState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StrategyState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Unique strategy identifier
    pub fn id(&self) -> StrategyId {
        self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instrument, if configured
    pub fn security(&self) -> Option<&Security> {
        self.security.as_ref()
    }

    /// Portfolio, if configured
    pub fn portfolio(&self) -> Option<&Portfolio> {
        self.portfolio.as_ref()
    }

    /// Signed position
    pub fn position(&self) -> Decimal {
        self.read().position
    }

    /// Current profit and loss
    pub fn pnl(&self) -> Decimal {
        self.read().pnl
    }

    pub fn process_state(&self) -> ProcessState {
        self.read().process_state
    }

    pub fn trading_mode(&self) -> TradingMode {
        self.read().trading_mode
    }

    /// All indicators/inputs have enough history
    pub fn is_formed(&self) -> bool {
        self.read().is_formed
    }

    /// Connected and receiving data
    pub fn is_online(&self) -> bool {
        self.read().is_online
    }

    pub fn error_state(&self) -> LogLevel {
        self.read().error_state
    }

    /// Default order volume
    pub fn volume(&self) -> Decimal {
        self.read().volume
    }

    /// Last known market price of the instrument
    pub fn last_price(&self) -> Option<Price> {
        self.read().last_price
    }

    /// True once `dispose` has run
    pub fn is_disposed(&self) -> bool {
        self.read().disposed
    }

    /// Rules owned by this strategy
    pub fn rules(&self) -> &RuleContainer {
        &self.rules
    }

    /// Child strategies, in the order they were added
    pub fn children(&self) -> Vec<ChildStrategy> {
        self.children.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Tracked order by id
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.orders.read().unwrap_or_else(|e| e.into_inner()).get(&id).cloned()
    }

    /// Tracked orders with `Active` status
    pub fn active_orders(&self) -> Vec<Order> {
        self.orders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|o| o.status == OrderStatus::Active)
            .cloned()
            .collect()
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    pub fn pnl_changed(&self) -> &Event<Decimal> {
        &self.pnl_changed
    }

    pub fn position_changed(&self) -> &Event<Decimal> {
        &self.position_changed
    }

    pub fn new_trade(&self) -> &Event<Trade> {
        &self.new_trade
    }

    pub fn order_registered(&self) -> &Event<Order> {
        &self.order_registered
    }

    pub fn order_changed(&self) -> &Event<Order> {
        &self.order_changed
    }

    pub fn process_state_changed(&self) -> &Event<ProcessState> {
        &self.process_state_changed
    }

    pub fn property_changed(&self) -> &Event<StrategyProperty> {
        &self.property_changed
    }

    /// Errors from this strategy and, forwarded, from its descendants
    pub fn error(&self) -> &Event<StrategyFault> {
        &self.error
    }

    // -------------------------------------------------------------------------
    // Notifications from external collaborators
    // -------------------------------------------------------------------------

    fn notify(&self, property: StrategyProperty) -> HandlerResult {
        self.property_changed.raise(&property)
    }

    /// Update the position; raises position-changed when it differs.
    pub fn set_position(&self, position: Decimal) -> HandlerResult {
        {
            let mut state = self.write();
            if state.position == position {
                return Ok(());
            }
            state.position = position;
        }
        self.position_changed.raise(&position)?;
        self.notify(StrategyProperty::Position)
    }

    /// Update PnL; raises pnl-changed when it differs.
    pub fn set_pnl(&self, pnl: Decimal) -> HandlerResult {
        {
            let mut state = self.write();
            if state.pnl == pnl {
                return Ok(());
            }
            state.pnl = pnl;
        }
        self.pnl_changed.raise(&pnl)?;
        self.notify(StrategyProperty::PnL)
    }

    /// Move to a new process state; raises process-state-changed on transitions.
    pub fn set_process_state(&self, process_state: ProcessState) -> HandlerResult {
        {
            let mut state = self.write();
            if state.process_state == process_state {
                return Ok(());
            }
            state.process_state = process_state;
        }
        info!(strategy = %self.name, state = %process_state, "Process state changed");
        self.process_state_changed.raise(&process_state)?;
        self.notify(StrategyProperty::ProcessState)
    }

    pub fn set_trading_mode(&self, mode: TradingMode) -> HandlerResult {
        {
            let mut state = self.write();
            if state.trading_mode == mode {
                return Ok(());
            }
            state.trading_mode = mode;
        }
        info!(strategy = %self.name, mode = %mode, "Trading mode changed");
        self.notify(StrategyProperty::TradingMode)
    }

    pub fn set_formed(&self, formed: bool) -> HandlerResult {
        {
            let mut state = self.write();
            if state.is_formed == formed {
                return Ok(());
            }
            state.is_formed = formed;
        }
        self.notify(StrategyProperty::IsFormed)
    }

    pub fn set_online(&self, online: bool) -> HandlerResult {
        {
            let mut state = self.write();
            if state.is_online == online {
                return Ok(());
            }
            state.is_online = online;
        }
        self.notify(StrategyProperty::IsOnline)
    }

    pub fn set_error_state(&self, level: LogLevel) -> HandlerResult {
        {
            let mut state = self.write();
            if state.error_state == level {
                return Ok(());
            }
            state.error_state = level;
        }
        self.notify(StrategyProperty::ErrorState)
    }

    /// Change the default order volume.
    ///
    /// # Errors
    /// Returns `StrategyError::InvalidCommand` for a non-positive volume
    pub fn set_volume(&self, volume: Decimal) -> HandlerResult {
        if volume <= Decimal::ZERO {
            return Err(StrategyError::InvalidCommand(format!(
                "Default volume must be positive, got {}",
                volume
            )));
        }
        {
            let mut state = self.write();
            if state.volume == volume {
                return Ok(());
            }
            state.volume = volume;
        }
        self.notify(StrategyProperty::Volume)
    }

    pub fn set_last_price(&self, price: Price) -> HandlerResult {
        {
            let mut state = self.write();
            if state.last_price == Some(price) {
                return Ok(());
            }
            state.last_price = Some(price);
        }
        self.notify(StrategyProperty::LastPrice)
    }

    /// Deliver an own trade.
    pub fn process_trade(&self, trade: Trade) -> HandlerResult {
        debug!(strategy = %self.name, trade_id = %trade.id, price = %trade.price, "New trade");
        self.new_trade.raise(&trade)
    }

    /// Deliver an order state update from the connector.
    pub fn process_order_change(&self, order: Order) -> HandlerResult {
        {
            let mut orders = self.orders.write().unwrap_or_else(|e| e.into_inner());
            if !orders.contains_key(&order.id) {
                return Err(StrategyError::UnknownOrder(order.id));
            }
            orders.insert(order.id, order.clone());
        }
        self.order_changed.raise(&order)
    }

    /// Report an error originating in this strategy.
    ///
    /// Sets the error state to `Error` and raises the error event, which
    /// ancestors receive as well. The error event is raised even when a
    /// property-changed handler fails; the first failure is returned.
    pub fn raise_error<E>(&self, error: E) -> HandlerResult
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        warn!(strategy = %self.name, %error, "Strategy error");
        let fault = StrategyFault {
            origin: self.id,
            origin_name: self.name.clone(),
            error: Arc::new(error),
        };
        let state = self.set_error_state(LogLevel::Error);
        let raised = self.error.raise(&fault);
        state.and(raised)
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    fn ensure_live(&self) -> StrategyResult<()> {
        if self.is_disposed() {
            return Err(StrategyError::Disposed(self.name.clone()));
        }
        Ok(())
    }

    fn tracked_active(&self, order: &Order) -> StrategyResult<Order> {
        let tracked = self.order(order.id).ok_or(StrategyError::UnknownOrder(order.id))?;
        if tracked.status != OrderStatus::Active {
            return Err(StrategyError::InvalidCommand(format!(
                "Order {} is not active ({:?})",
                order.id, tracked.status
            )));
        }
        Ok(tracked)
    }

    fn track(&self, order: Order) {
        self.orders.write().unwrap_or_else(|e| e.into_inner()).insert(order.id, order);
    }

    /// Send a new order through the router.
    ///
    /// Returns the tracked (active) copy.
    pub fn register_order(&self, order: Order) -> StrategyResult<Order> {
        self.ensure_live()?;
        if order.status != OrderStatus::Pending {
            return Err(StrategyError::InvalidCommand(format!(
                "Order {} was already sent ({:?})",
                order.id, order.status
            )));
        }
        if self.order(order.id).is_some() {
            return Err(StrategyError::InvalidCommand(format!(
                "Order {} is already registered",
                order.id
            )));
        }

        self.router.register(&order)?;
        let active = order.with_status(OrderStatus::Active);
        self.track(active.clone());

        info!(strategy = %self.name, order_id = %active.id, order = %active, "Order registered");
        self.order_registered.raise(&active)?;
        Ok(active)
    }

    /// Replace a working order with a new one.
    pub fn re_register_order(&self, old: &Order, new: Order) -> StrategyResult<Order> {
        self.ensure_live()?;
        let tracked = self.tracked_active(old)?;
        if new.status != OrderStatus::Pending {
            return Err(StrategyError::InvalidCommand(format!(
                "Replacement order {} was already sent",
                new.id
            )));
        }

        self.router.re_register(&tracked, &new)?;
        let replaced = tracked.with_status(OrderStatus::Cancelled);
        let active = new.with_status(OrderStatus::Active);
        self.track(replaced.clone());
        self.track(active.clone());

        info!(
            strategy = %self.name,
            old = %replaced.id,
            new = %active.id,
            order = %active,
            "Order re-registered"
        );
        self.order_changed.raise(&replaced)?;
        self.order_registered.raise(&active)?;
        Ok(active)
    }

    /// Cancel a working order.
    pub fn cancel_order(&self, order: &Order) -> StrategyResult<()> {
        self.ensure_live()?;
        let tracked = self.tracked_active(order)?;

        self.router.cancel(&tracked)?;
        let cancelled = tracked.with_status(OrderStatus::Cancelled);
        self.track(cancelled.clone());

        info!(strategy = %self.name, order_id = %cancelled.id, "Order cancelled");
        self.order_changed.raise(&cancelled)
    }

    /// Attach a child strategy; its errors are forwarded to this strategy.
    ///
    /// The child stays attached until its core is disposed, at which point it
    /// is released from this strategy.
    ///
    /// # Errors
    /// Returns `StrategyError::Disposed` if either strategy is disposed
    pub fn add_child(self: &Arc<Self>, child: ChildStrategy) -> StrategyResult<()> {
        self.ensure_live()?;
        let core = Arc::clone(child.strategy());
        core.ensure_live()?;

        let parent: Weak<Strategy> = Arc::downgrade(self);
        let link = core.error().subscribe(move |fault: &StrategyFault| match parent.upgrade() {
            Some(parent) => parent.error.raise(fault),
            None => Ok(()),
        });
        *core.parent.lock().unwrap_or_else(|e| e.into_inner()) = Arc::downgrade(self);
        self.child_links.lock().unwrap_or_else(|e| e.into_inner()).push((core.id, link));

        info!(
            strategy = %self.name,
            child = %core.name(),
            kind = child.kind_name(),
            "Child strategy added"
        );
        self.children.write().unwrap_or_else(|e| e.into_inner()).push(child);

        // Disposed while being attached: its own dispose missed the parent link.
        if core.is_disposed() {
            self.remove_child(core.id);
            return Err(StrategyError::Disposed(core.name.clone()));
        }
        self.notify(StrategyProperty::Children)
    }

    /// Release a child and its error forwarding.
    ///
    /// Returns `false` if no child with that id is attached.
    pub fn remove_child(&self, child_id: StrategyId) -> bool {
        let link = {
            let mut links = self.child_links.lock().unwrap_or_else(|e| e.into_inner());
            links
                .iter()
                .position(|(id, _)| *id == child_id)
                .map(|index| links.remove(index))
        };
        if let Some((_, link)) = link {
            link.unsubscribe();
        }

        let mut children = self.children.write().unwrap_or_else(|e| e.into_inner());
        let before = children.len();
        children.retain(|child| child.strategy().id() != child_id);
        let removed = children.len() != before;
        drop(children);

        if removed {
            debug!(strategy = %self.name, child = %child_id, "Child strategy released");
        }
        removed
    }

    /// Dispose every owned rule, dispose the children and leave the parent.
    ///
    /// Idempotent. Commands fail with `StrategyError::Disposed` afterwards.
    pub fn dispose(&self) {
        {
            let mut state = self.write();
            if state.disposed {
                return;
            }
            state.disposed = true;
        }

        let rules = self.rules.dispose_all();
        let links =
            std::mem::take(&mut *self.child_links.lock().unwrap_or_else(|e| e.into_inner()));
        for (_, link) in &links {
            link.unsubscribe();
        }
        for child in self.children() {
            child.strategy().dispose();
        }

        let parent = self.parent.lock().unwrap_or_else(|e| e.into_inner()).upgrade();
        if let Some(parent) = parent {
            parent.remove_child(self.id);
        }

        info!(strategy = %self.name, rules, "Strategy disposed");
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &*self.read())
            .finish()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::RecordingRouter;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tripwire_domain::{OrderSide, Quantity};

    fn strategy() -> (Arc<RecordingRouter>, Arc<Strategy>) {
        let router = Arc::new(RecordingRouter::new());
        let strategy = Strategy::builder("test", router.clone())
            .security(Security::new("BTCUSDT", "BINANCE").unwrap())
            .volume(dec!(2))
            .build();
        (router, strategy)
    }

    fn order(strategy: &Strategy) -> Order {
        Order::market(
            strategy.security().unwrap().clone(),
            None,
            OrderSide::Buy,
            Quantity::new(dec!(1)).unwrap(),
        )
    }

    #[derive(Debug, thiserror::Error)]
    #[error("feed lost")]
    struct FeedLost;

    #[test]
    fn test_set_position_raises_only_on_change() {
        let (_router, strategy) = strategy();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = strategy.position_changed().subscribe(move |v: &Decimal| {
            sink.lock().unwrap().push(*v);
            Ok(())
        });

        strategy.set_position(dec!(1)).unwrap();
        strategy.set_position(dec!(1)).unwrap();
        strategy.set_position(dec!(-3)).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![dec!(1), dec!(-3)]);
        assert_eq!(strategy.position(), dec!(-3));
    }

    #[test]
    fn test_property_changed_follows_setters() {
        let (_router, strategy) = strategy();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = strategy.property_changed().subscribe(move |p: &StrategyProperty| {
            sink.lock().unwrap().push(*p);
            Ok(())
        });

        strategy.set_formed(true).unwrap();
        strategy.set_online(true).unwrap();
        strategy.set_pnl(dec!(5)).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![StrategyProperty::IsFormed, StrategyProperty::IsOnline, StrategyProperty::PnL]
        );
    }

    #[test]
    fn test_register_and_cancel() {
        let (router, strategy) = strategy();
        let active = strategy.register_order(order(&strategy)).unwrap();

        assert_eq!(active.status, OrderStatus::Active);
        assert_eq!(strategy.active_orders().len(), 1);

        strategy.cancel_order(&active).unwrap();

        assert_eq!(strategy.order(active.id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(router.len(), 2);
        assert!(matches!(
            strategy.cancel_order(&active),
            Err(StrategyError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_register_twice_is_rejected() {
        let (_router, strategy) = strategy();
        let active = strategy.register_order(order(&strategy)).unwrap();

        assert!(matches!(
            strategy.register_order(active),
            Err(StrategyError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_cancel_unknown_order() {
        let (_router, strategy) = strategy();
        let stray = order(&strategy);

        assert!(matches!(
            strategy.cancel_order(&stray),
            Err(StrategyError::UnknownOrder(id)) if id == stray.id
        ));
    }

    #[test]
    fn test_re_register_raises_changed_then_registered() {
        let (_router, strategy) = strategy();
        let old = strategy.register_order(order(&strategy)).unwrap();
        let changed = Arc::new(AtomicUsize::new(0));
        let registered = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&changed);
        let r = Arc::clone(&registered);
        let _a = strategy.order_changed().subscribe(move |o: &Order| {
            assert_eq!(o.status, OrderStatus::Cancelled);
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let _b = strategy.order_registered().subscribe(move |_: &Order| {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let new = strategy.re_register_order(&old, order(&strategy)).unwrap();

        assert_eq!(changed.load(Ordering::SeqCst), 1);
        assert_eq!(registered.load(Ordering::SeqCst), 1);
        assert_eq!(strategy.active_orders(), vec![new]);
    }

    #[test]
    fn test_router_failure_leaves_order_untracked() {
        let (router, strategy) = strategy();
        router.set_fail_next(true);
        let pending = order(&strategy);

        assert!(strategy.register_order(pending.clone()).is_err());
        assert!(strategy.order(pending.id).is_none());
    }

    #[test]
    fn test_child_errors_are_forwarded() {
        let (_router, parent) = strategy();
        let child = parent.new_child("child");
        parent.add_child(ChildStrategy::Generic(child.clone())).unwrap();

        let origins = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&origins);
        let _sub = parent.error().subscribe(move |fault: &StrategyFault| {
            sink.lock().unwrap().push(fault.origin);
            Ok(())
        });

        child.raise_error(FeedLost).unwrap();
        parent.raise_error(FeedLost).unwrap();

        assert_eq!(*origins.lock().unwrap(), vec![child.id(), parent.id()]);
        assert_eq!(child.error_state(), LogLevel::Error);
    }

    #[test]
    fn test_new_child_inherits_defaults() {
        let (_router, parent) = strategy();
        let child = parent.new_child("child");

        assert_eq!(child.security(), parent.security());
        assert_eq!(child.volume(), dec!(2));
        assert_ne!(child.id(), parent.id());
    }

    #[test]
    fn test_dispose_blocks_commands() {
        let (_router, strategy) = strategy();
        let child = strategy.new_child("child");
        strategy.add_child(ChildStrategy::Generic(child.clone())).unwrap();

        strategy.dispose();
        strategy.dispose();

        assert!(strategy.is_disposed());
        assert!(child.is_disposed());
        assert!(strategy.children().is_empty());
        assert!(matches!(
            strategy.register_order(order(&strategy)),
            Err(StrategyError::Disposed(_))
        ));
    }

    #[test]
    fn test_disposed_child_is_released() {
        let (_router, parent) = strategy();
        let child = parent.new_child("child");
        parent.add_child(ChildStrategy::Generic(child.clone())).unwrap();
        let origins = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&origins);
        let _sub = parent.error().subscribe(move |_: &StrategyFault| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        child.dispose();
        child.raise_error(FeedLost).unwrap();

        assert!(parent.children().is_empty());
        assert_eq!(child.error().handler_count(), 0);
        assert_eq!(origins.load(Ordering::SeqCst), 0);
        assert!(!parent.remove_child(child.id()));
    }

    #[test]
    fn test_add_disposed_child_rejected() {
        let (_router, parent) = strategy();
        let child = parent.new_child("child");
        child.dispose();

        assert!(matches!(
            parent.add_child(ChildStrategy::Generic(child)),
            Err(StrategyError::Disposed(_))
        ));
        assert!(parent.children().is_empty());
    }

    #[test]
    fn test_raise_error_survives_failing_property_handler() {
        let (_router, strategy) = strategy();
        let _failing = strategy.property_changed().subscribe(|_: &StrategyProperty| {
            Err(StrategyError::InvalidCommand("busy".to_string()))
        });
        let faults = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&faults);
        let _sub = strategy.error().subscribe(move |_: &StrategyFault| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let result = strategy.raise_error(FeedLost);

        assert!(matches!(result, Err(StrategyError::InvalidCommand(_))));
        assert_eq!(faults.load(Ordering::SeqCst), 1);
        assert_eq!(strategy.error_state(), LogLevel::Error);
    }

    #[test]
    fn test_set_volume_rejects_non_positive() {
        let (_router, strategy) = strategy();

        assert!(strategy.set_volume(dec!(0)).is_err());
        strategy.set_volume(dec!(5)).unwrap();
        assert_eq!(strategy.volume(), dec!(5));
    }
}
