//! Test helpers for Tripwire rule and strategy tests.
//!
//! Provides strategies wired to a recording router, plus order and fill builders.

mod helpers;

pub use helpers::{
    fill, limit_order, market_order, ready_strategy, strategy, TEST_BOARD, TEST_SECURITY,
};
