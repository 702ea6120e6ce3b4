//! Simulator configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{SimError, SimResult};
use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tripwire_domain::{Security, TradingMode, Unit};

// =============================================================================
// Configuration
// =============================================================================

/// Simulator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Strategy defaults
    pub strategy: StrategyConfig,

    /// Guard rules installed on the strategy
    pub guard: GuardConfig,

    /// Scenario file; the bundled scenario is used when absent
    pub scenario: Option<PathBuf>,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Strategy defaults.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Instrument traded by the simulated strategy
    pub security: Security,
    /// Portfolio name
    pub portfolio: String,
    /// Default order volume
    pub default_volume: Decimal,
    /// Initial trading mode
    pub trading_mode: TradingMode,
}

/// Guard rule configuration.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Slippage applied when closing with a limit order
    pub close_slippage: Decimal,
    /// P&L level below which the position is flattened
    pub stop_loss_pnl: Unit,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> SimResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let strategy = Self::load_strategy_config()?;
        let guard = Self::load_guard_config()?;
        let scenario = env::var("TRIPWIRE_SCENARIO").ok().map(PathBuf::from);

        Ok(Self {
            strategy,
            guard,
            scenario,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            environment: Environment::Test,
            ..Self::default()
        }
    }

    fn load_environment() -> SimResult<Environment> {
        let env_str = env::var("TRIPWIRE_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(SimError::Config(format!(
                "Invalid TRIPWIRE_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_strategy_config() -> SimResult<StrategyConfig> {
        let security_str =
            env::var("TRIPWIRE_SECURITY").unwrap_or_else(|_| "BTCUSDT@BINANCE".to_string());
        let security = parse_security(&security_str)?;

        let portfolio = env::var("TRIPWIRE_PORTFOLIO").unwrap_or_else(|_| "sim".to_string());
        let default_volume = Self::load_decimal_env("TRIPWIRE_DEFAULT_VOLUME", Decimal::ONE)?;

        let trading_mode = match env::var("TRIPWIRE_TRADING_MODE") {
            Ok(val) => TradingMode::from_str(&val).map_err(|_| {
                SimError::Config(format!("Invalid TRIPWIRE_TRADING_MODE: {}", val))
            })?,
            Err(_) => TradingMode::Full,
        };

        Ok(StrategyConfig {
            security,
            portfolio,
            default_volume,
            trading_mode,
        })
    }

    fn load_guard_config() -> SimResult<GuardConfig> {
        let close_slippage = Self::load_decimal_env("TRIPWIRE_CLOSE_SLIPPAGE", Decimal::ZERO)?;

        let stop_loss_pnl = match env::var("TRIPWIRE_STOP_LOSS_PNL") {
            Ok(val) => Unit::from_str(&val)
                .map_err(|_| SimError::Config(format!("Invalid TRIPWIRE_STOP_LOSS_PNL: {}", val)))?,
            Err(_) => default_stop_loss(),
        };

        Ok(GuardConfig {
            close_slippage,
            stop_loss_pnl,
        })
    }

    fn load_decimal_env(key: &str, default: Decimal) -> SimResult<Decimal> {
        match env::var(key) {
            Ok(val) => Decimal::from_str(&val)
                .map_err(|_| SimError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }
}

fn default_stop_loss() -> Unit {
    Unit::Limit(Decimal::new(-500, 0))
}

/// Parse `CODE@BOARD`; the board defaults to `SIM`.
pub fn parse_security(value: &str) -> SimResult<Security> {
    let (code, board) = value.split_once('@').unwrap_or((value, "SIM"));
    Security::new(code.trim(), board.trim())
        .map_err(|e| SimError::Config(format!("Invalid TRIPWIRE_SECURITY {}: {}", value, e)))
}

impl Default for Config {
    fn default() -> Self {
        let security = Security::new("BTCUSDT", "BINANCE").expect("static security is valid");
        Self {
            strategy: StrategyConfig {
                security,
                portfolio: "sim".to_string(),
                default_volume: Decimal::ONE,
                trading_mode: TradingMode::Full,
            },
            guard: GuardConfig {
                close_slippage: Decimal::ZERO,
                stop_loss_pnl: default_stop_loss(),
            },
            scenario: None,
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
