//! Trading permission check.

use tripwire_domain::TradingMode;
use tripwire_strategy::Strategy;

use crate::error::{RuleError, RuleResult};

/// Whether `strategy` may trade at the `required` level.
///
/// False unless the strategy is formed, online and not `Disabled`. Past that:
///
/// | required             | allowed when mode is        |
/// |----------------------|-----------------------------|
/// | `Full`               | `Full`                      |
/// | `CancelOrdersOnly`   | anything                    |
/// | `ReducePositionOnly` | anything but `CancelOrdersOnly` |
///
/// # Errors
/// Returns `RuleError::OutOfRange` when `required` is `Disabled` and the base
/// conditions hold
pub fn is_formed_and_online_and_allow_trading(
    strategy: &Strategy,
    required: TradingMode,
) -> RuleResult<bool> {
    let mode = strategy.trading_mode();
    if !strategy.is_formed() || !strategy.is_online() || mode == TradingMode::Disabled {
        return Ok(false);
    }

    match required {
        TradingMode::Full => Ok(mode == TradingMode::Full),
        TradingMode::CancelOrdersOnly => Ok(true),
        TradingMode::ReducePositionOnly => Ok(mode != TradingMode::CancelOrdersOnly),
        TradingMode::Disabled => Err(RuleError::OutOfRange(format!(
            "{} is not a required trading level",
            required
        ))),
    }
}

/// Gate check from a raw mode code, as read from configuration.
///
/// # Errors
/// Returns `RuleError::Domain` for an unknown code
pub fn allow_trading_for_code(strategy: &Strategy, required: i32) -> RuleResult<bool> {
    is_formed_and_online_and_allow_trading(strategy, TradingMode::try_from(required)?)
}

/// Shorthand for the `Full` check.
pub fn can_trade(strategy: &Strategy) -> bool {
    matches!(is_formed_and_online_and_allow_trading(strategy, TradingMode::Full), Ok(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripwire_testkit::{ready_strategy, strategy};

    const CANCEL_ONLY: TradingMode = TradingMode::CancelOrdersOnly;
    const REDUCE_ONLY: TradingMode = TradingMode::ReducePositionOnly;

    const ALL_MODES: [TradingMode; 4] = [
        TradingMode::Disabled,
        TradingMode::Full,
        TradingMode::CancelOrdersOnly,
        TradingMode::ReducePositionOnly,
    ];

    #[test]
    fn test_not_formed_is_always_false() {
        let (_router, owner) = strategy("s");
        owner.set_online(true).unwrap();

        for mode in ALL_MODES {
            owner.set_trading_mode(mode).unwrap();
            for required in ALL_MODES {
                assert!(!is_formed_and_online_and_allow_trading(&owner, required).unwrap());
            }
        }
    }

    #[test]
    fn test_offline_is_false() {
        let (_router, owner) = strategy("s");
        owner.set_formed(true).unwrap();

        assert!(!is_formed_and_online_and_allow_trading(&owner, CANCEL_ONLY).unwrap());
        assert!(!can_trade(&owner));
    }

    #[test]
    fn test_cancel_only_allowed_whenever_enabled() {
        let (_router, owner) = ready_strategy("s");

        for mode in [TradingMode::Full, CANCEL_ONLY, REDUCE_ONLY] {
            owner.set_trading_mode(mode).unwrap();
            assert!(is_formed_and_online_and_allow_trading(&owner, CANCEL_ONLY).unwrap());
        }

        owner.set_trading_mode(TradingMode::Disabled).unwrap();
        assert!(!is_formed_and_online_and_allow_trading(&owner, CANCEL_ONLY).unwrap());
    }

    #[test]
    fn test_full_and_reduce_requirements() {
        let (_router, owner) = ready_strategy("s");

        owner.set_trading_mode(REDUCE_ONLY).unwrap();
        assert!(!is_formed_and_online_and_allow_trading(&owner, TradingMode::Full).unwrap());
        assert!(is_formed_and_online_and_allow_trading(&owner, REDUCE_ONLY).unwrap());

        owner.set_trading_mode(CANCEL_ONLY).unwrap();
        assert!(!is_formed_and_online_and_allow_trading(&owner, REDUCE_ONLY).unwrap());

        owner.set_trading_mode(TradingMode::Full).unwrap();
        assert!(can_trade(&owner));
    }

    #[test]
    fn test_disabled_requirement_is_out_of_range() {
        let (_router, owner) = ready_strategy("s");

        assert!(matches!(
            is_formed_and_online_and_allow_trading(&owner, TradingMode::Disabled),
            Err(RuleError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_unknown_code() {
        let (_router, owner) = ready_strategy("s");

        assert!(allow_trading_for_code(&owner, 1).unwrap());
        assert!(matches!(allow_trading_for_code(&owner, 9), Err(RuleError::Domain(_))));
    }
}
