//! Tripwire Simulator
//!
//! Replays scripted notifications into a strategy wired with guard rules and
//! reports the commands those rules issued.
//!
//! # Modules
//!
//! - `config`: environment configuration
//! - `scenario`: scenario documents and the replay driver
//! - `error`: error types

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod scenario;

pub use config::{Config, Environment, GuardConfig, StrategyConfig};
pub use error::{SimError, SimResult};
pub use scenario::{Protection, Scenario, SimReport, Simulator, Step, BUNDLED_SCENARIO};
