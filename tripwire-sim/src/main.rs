//! Tripwire Simulator
//!
//! Replays a scenario against a strategy with guard rules and prints the report.
//!
//! # Usage
//!
//! ```bash
//! # Replay the bundled scenario
//! cargo run -p tripwire-sim
//!
//! # Replay a scenario file with a tighter P&L stop
//! TRIPWIRE_SCENARIO=tripwire-sim/scenarios/pnl_stop.json \
//!     TRIPWIRE_STOP_LOSS_PNL=-100l cargo run -p tripwire-sim
//! ```
//!
//! # Environment Variables
//!
//! - `TRIPWIRE_ENV`: Environment (test, development, production)
//! - `TRIPWIRE_SECURITY`: Instrument as `CODE@BOARD` (default: BTCUSDT@BINANCE)
//! - `TRIPWIRE_PORTFOLIO`: Portfolio name (default: sim)
//! - `TRIPWIRE_DEFAULT_VOLUME`: Default order volume (default: 1)
//! - `TRIPWIRE_TRADING_MODE`: full, disabled, cancel_orders_only, reduce_position_only
//! - `TRIPWIRE_CLOSE_SLIPPAGE`: Slippage for limit closes (default: 0)
//! - `TRIPWIRE_STOP_LOSS_PNL`: P&L stop level as a unit: `-500l`, `50`, `10%` (default: -500l)
//! - `TRIPWIRE_SCENARIO`: Scenario JSON file (default: bundled scenario)
//! - `TRIPWIRE_LOG_FORMAT`: `json` for JSON logs

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tripwire_sim::{Config, Scenario, Simulator};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("tripwire_sim=info".parse()?);
    if std::env::var("TRIPWIRE_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init();
    } else {
        tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        security = %config.strategy.security,
        trading_mode = %config.strategy.trading_mode,
        "Tripwire Simulator"
    );

    let scenario = match &config.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::bundled()?,
    };

    let report = Simulator::new(config)?.run(&scenario)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
