//! Fixture builders.
//!
//! All helpers panic on invalid input: they are meant for tests only.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use tripwire_domain::{Order, OrderSide, Portfolio, Price, Quantity, Security, Trade};
use tripwire_strategy::{RecordingRouter, Strategy};

/// Security code used by fixture strategies
pub const TEST_SECURITY: &str = "BTCUSDT";
/// Board used by fixture strategies
pub const TEST_BOARD: &str = "BINANCE";

/// Strategy with a security, a portfolio, default volume 1 and a recording router.
///
/// Returns (router, strategy) so tests can inspect routed commands.
pub fn strategy(name: &str) -> (Arc<RecordingRouter>, Arc<Strategy>) {
    let router = Arc::new(RecordingRouter::new());
    let security = Security::new(TEST_SECURITY, TEST_BOARD).expect("fixture security");
    let strategy = Strategy::builder(name, router.clone())
        .security(security)
        .portfolio(Portfolio::new(format!("test-{}", Uuid::now_v7())))
        .volume(Decimal::ONE)
        .build();
    (router, strategy)
}

/// [`strategy`] that is already formed and online.
pub fn ready_strategy(name: &str) -> (Arc<RecordingRouter>, Arc<Strategy>) {
    let (router, strategy) = strategy(name);
    strategy.set_formed(true).expect("set formed");
    strategy.set_online(true).expect("set online");
    (router, strategy)
}

/// Unregistered market order on the strategy's security.
pub fn market_order(strategy: &Strategy, side: OrderSide, volume: Decimal) -> Order {
    Order::market(
        strategy.security().expect("strategy security").clone(),
        strategy.portfolio().cloned(),
        side,
        Quantity::new(volume).expect("positive volume"),
    )
}

/// Unregistered limit order on the strategy's security.
pub fn limit_order(
    strategy: &Strategy,
    side: OrderSide,
    price: Decimal,
    volume: Decimal,
) -> Order {
    Order::limit(
        strategy.security().expect("strategy security").clone(),
        strategy.portfolio().cloned(),
        side,
        Quantity::new(volume).expect("positive volume"),
        Price::new(price).expect("positive price"),
    )
}

/// Own trade for a fresh market order, filled in full at `price`.
pub fn fill(strategy: &Strategy, side: OrderSide, price: Decimal, volume: Decimal) -> Trade {
    let order = market_order(strategy, side, volume);
    Trade::new(&order, Price::new(price).expect("positive price"), order.volume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ready_strategy_flags() {
        let (router, strategy) = ready_strategy("fixture");

        assert!(strategy.is_formed());
        assert!(strategy.is_online());
        assert!(router.is_empty());
    }

    #[test]
    fn test_fill_matches_order() {
        let (_router, strategy) = strategy("fixture");
        let trade = fill(&strategy, OrderSide::Sell, dec!(10), dec!(2));

        assert_eq!(trade.side, OrderSide::Sell);
        assert_eq!(trade.volume.as_decimal(), dec!(2));
        assert_eq!(trade.security.code(), TEST_SECURITY);
    }

    #[test]
    fn test_limit_order_price() {
        let (_router, strategy) = strategy("fixture");
        let order = limit_order(&strategy, OrderSide::Buy, dec!(99), dec!(1));

        assert_eq!(order.price.unwrap().as_decimal(), dec!(99));
    }
}
