//! Order factory and position helpers.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use tripwire_domain::{Order, OrderSide, Price, Quantity, Security};
use tripwire_strategy::{ChildStrategy, QuotingStrategy, Strategy};

use crate::error::{RuleError, RuleResult};

/// Order construction from strategy defaults.
pub trait StrategyOrders {
    /// Build an unregistered order.
    ///
    /// `volume` defaults to the strategy volume. Without `price` the order is
    /// a market order, or, when the security does not take market orders, a
    /// limit order at the last known price.
    ///
    /// # Errors
    /// - `RuleError::SecurityNotSpecified` if the strategy has no security
    /// - `RuleError::InvalidArgument` for a non-positive price or volume
    /// - `RuleError::InvalidState` if a limit fallback has no last price
    fn create_order(
        &self,
        side: OrderSide,
        price: Option<Decimal>,
        volume: Option<Decimal>,
    ) -> RuleResult<Order>;

    fn buy_at_market(&self, volume: Option<Decimal>) -> RuleResult<Order> {
        self.create_order(OrderSide::Buy, None, volume)
    }

    fn sell_at_market(&self, volume: Option<Decimal>) -> RuleResult<Order> {
        self.create_order(OrderSide::Sell, None, volume)
    }

    fn buy_at_limit(&self, price: Decimal, volume: Option<Decimal>) -> RuleResult<Order> {
        self.create_order(OrderSide::Buy, Some(price), volume)
    }

    fn sell_at_limit(&self, price: Decimal, volume: Option<Decimal>) -> RuleResult<Order> {
        self.create_order(OrderSide::Sell, Some(price), volume)
    }

    /// Register an order that flattens the position.
    ///
    /// Returns `None` (and does nothing) when already flat. A limit order is
    /// moved by `slippage` against the strategy: up for a buy, down for a sell.
    fn close_position(&self, slippage: Decimal) -> RuleResult<Option<Order>>;

    /// Spawn a quoting child working the gap between position and `target`.
    ///
    /// Returns `None` when the position is already at `target`.
    fn open_position_by_quoting(&self, target: Decimal) -> RuleResult<Option<Arc<QuotingStrategy>>>;

    /// Spawn a quoting child that flattens the position.
    fn close_position_by_quoting(&self) -> RuleResult<Option<Arc<QuotingStrategy>>> {
        self.open_position_by_quoting(Decimal::ZERO)
    }
}

fn security_of(strategy: &Strategy) -> RuleResult<Security> {
    strategy
        .security()
        .cloned()
        .ok_or_else(|| RuleError::SecurityNotSpecified(strategy.name().to_string()))
}

impl StrategyOrders for Arc<Strategy> {
    fn create_order(
        &self,
        side: OrderSide,
        price: Option<Decimal>,
        volume: Option<Decimal>,
    ) -> RuleResult<Order> {
        let security = security_of(self)?;
        let volume = Quantity::new(volume.unwrap_or_else(|| self.volume()))
            .map_err(|e| RuleError::InvalidArgument(e.to_string()))?;
        let portfolio = self.portfolio().cloned();

        let order = match price {
            Some(price) => {
                let price =
                    Price::new(price).map_err(|e| RuleError::InvalidArgument(e.to_string()))?;
                Order::limit(security, portfolio, side, volume, price)
            }
            None if security.supports_market_orders() => {
                Order::market(security, portfolio, side, volume)
            }
            None => {
                let last = self.last_price().ok_or_else(|| {
                    RuleError::InvalidState(format!(
                        "{} takes no market orders and has no last price",
                        security
                    ))
                })?;
                Order::limit(security, portfolio, side, volume, last)
            }
        };

        debug!(strategy = %self.name(), order = %order, "Order created");
        Ok(order)
    }

    fn close_position(&self, slippage: Decimal) -> RuleResult<Option<Order>> {
        let position = self.position();
        let Some(held) = OrderSide::from_signed(position) else {
            return Ok(None);
        };
        let side = held.invert();

        let mut order = self.create_order(side, None, Some(position.abs()))?;
        if let Some(price) = order.price {
            let shifted = match side {
                OrderSide::Buy => price.as_decimal() + slippage,
                OrderSide::Sell => price.as_decimal() - slippage,
            };
            order = order.repriced(shifted)?;
        }

        info!(strategy = %self.name(), position = %position, order = %order, "Closing position");
        Ok(Some(self.register_order(order)?))
    }

    fn open_position_by_quoting(
        &self,
        target: Decimal,
    ) -> RuleResult<Option<Arc<QuotingStrategy>>> {
        let gap = target - self.position();
        let Some(side) = OrderSide::from_signed(gap) else {
            return Ok(None);
        };
        security_of(self)?;

        let quoting = QuotingStrategy::new(self, side, Quantity::new(gap.abs())?);
        info!(
            strategy = %self.name(),
            target = %target,
            side = %side,
            volume = %gap.abs(),
            "Quoting toward target position"
        );
        self.add_child(ChildStrategy::Quoting(Arc::clone(&quoting)))?;
        Ok(Some(quoting))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tripwire_domain::{OrderType, Security};
    use tripwire_strategy::RecordingRouter;
    use tripwire_testkit::{strategy, TEST_BOARD, TEST_SECURITY};

    fn limit_only() -> (Arc<RecordingRouter>, Arc<Strategy>) {
        let router = Arc::new(RecordingRouter::new());
        let strategy = Strategy::builder("limit-only", router.clone())
            .security(Security::new("SBER", "TQBR").unwrap().with_market_orders(false))
            .volume(dec!(10))
            .build();
        (router, strategy)
    }

    #[test]
    fn test_create_order_defaults_to_market_with_default_volume() {
        let (_router, owner) = strategy("s");
        let order = owner.create_order(OrderSide::Buy, None, None).unwrap();

        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.volume.as_decimal(), owner.volume());
        assert_eq!(order.price, None);
        assert_eq!(order.security.code(), TEST_SECURITY);
        assert_eq!(order.security.board(), TEST_BOARD);
    }

    #[test]
    fn test_create_limit_order() {
        let (_router, owner) = strategy("s");
        let order = owner.sell_at_limit(dec!(101.5), Some(dec!(3))).unwrap();

        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.price.unwrap().as_decimal(), dec!(101.5));
        assert_eq!(order.volume.as_decimal(), dec!(3));
    }

    #[test]
    fn test_create_order_without_security() {
        let owner = Strategy::builder("bare", Arc::new(RecordingRouter::new())).build();

        assert!(matches!(
            owner.buy_at_market(None),
            Err(RuleError::SecurityNotSpecified(_))
        ));
    }

    #[test]
    fn test_create_order_rejects_bad_numbers() {
        let (_router, owner) = strategy("s");

        assert!(matches!(owner.buy_at_market(Some(dec!(0))), Err(RuleError::InvalidArgument(_))));
        assert!(matches!(owner.buy_at_limit(dec!(-1), None), Err(RuleError::InvalidArgument(_))));
    }

    #[test]
    fn test_market_fallback_uses_last_price() {
        let (_router, owner) = limit_only();
        assert!(matches!(owner.buy_at_market(None), Err(RuleError::InvalidState(_))));

        owner.set_last_price(Price::new(dec!(250)).unwrap()).unwrap();
        let order = owner.buy_at_market(None).unwrap();

        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.price.unwrap().as_decimal(), dec!(250));
    }

    #[test]
    fn test_close_position_flat_is_noop() {
        let (router, owner) = strategy("s");

        assert!(owner.close_position(dec!(0)).unwrap().is_none());
        assert!(router.is_empty());
    }

    #[test]
    fn test_close_long_position_at_market() {
        let (router, owner) = strategy("s");
        owner.set_position(dec!(4)).unwrap();

        let order = owner.close_position(dec!(0)).unwrap().unwrap();

        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.volume.as_decimal(), dec!(4));
        assert!(order.is_market());
        assert_eq!(router.registered().len(), 1);
    }

    #[test]
    fn test_close_short_position_with_slippage() {
        let (_router, owner) = limit_only();
        owner.set_last_price(Price::new(dec!(250)).unwrap()).unwrap();
        owner.set_position(dec!(-20)).unwrap();

        let order = owner.close_position(dec!(0.5)).unwrap().unwrap();

        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.volume.as_decimal(), dec!(20));
        assert_eq!(order.price.unwrap().as_decimal(), dec!(250.5));
    }

    #[test]
    fn test_open_position_by_quoting() {
        let (_router, owner) = strategy("s");
        owner.set_position(dec!(2)).unwrap();

        assert!(owner.open_position_by_quoting(dec!(2)).unwrap().is_none());
        assert!(owner.children().is_empty());

        let quoting = owner.open_position_by_quoting(dec!(5)).unwrap().unwrap();
        assert_eq!(quoting.side(), OrderSide::Buy);
        assert_eq!(quoting.volume().as_decimal(), dec!(3));
        assert_eq!(owner.children().len(), 1);
    }

    #[test]
    fn test_close_position_by_quoting() {
        let (_router, owner) = strategy("s");
        assert!(owner.close_position_by_quoting().unwrap().is_none());

        owner.set_position(dec!(7)).unwrap();
        let quoting = owner.close_position_by_quoting().unwrap().unwrap();

        assert_eq!(quoting.side(), OrderSide::Sell);
        assert_eq!(quoting.volume().as_decimal(), dec!(7));
    }
}
