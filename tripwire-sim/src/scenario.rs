//! Scripted scenario replay.
//!
//! A scenario is a JSON document listing the notifications an external
//! collaborator would push into a strategy: flags, fills, price ticks,
//! position and P&L updates. The [`Simulator`] wires a strategy to a
//! recording router, installs the guard rules, replays the steps and reports
//! what the rules did.
//!
//! ```json
//! {
//!   "name": "long stopped out",
//!   "protect": { "take_profit": { "kind": "delta", "amount": "500" } },
//!   "steps": [
//!     { "type": "formed", "value": true },
//!     { "type": "fill", "side": "Buy", "price": "95000", "volume": "1" },
//!     { "type": "price", "value": "95600" }
//!   ]
//! }
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tripwire_domain::{
    LogLevel, OrderSide, Portfolio, Price, ProcessState, Quantity, Trade, TradingMode, Unit,
};
use tripwire_rules::{
    is_formed_and_online_and_allow_trading, RuleActions, StrategyOrders, StrategyRules,
    TradeRuleActions,
};
use tripwire_strategy::{
    ChildStrategy, RecordingRouter, RouterCommand, Strategy, StrategyFault,
};

use crate::config::Config;
use crate::error::{SimError, SimResult};

/// Scenario bundled with the binary.
pub const BUNDLED_SCENARIO: &str = include_str!("../scenarios/protective_exit.json");

// =============================================================================
// Scenario document
// =============================================================================

/// A replayable scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Protection attached to every fill, if any
    #[serde(default)]
    pub protect: Option<Protection>,
    pub steps: Vec<Step>,
}

/// Protective legs attached to fills.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Protection {
    #[serde(default)]
    pub take_profit: Option<Unit>,
    #[serde(default)]
    pub stop_loss: Option<Unit>,
}

/// One notification pushed into the strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Formed { value: bool },
    Online { value: bool },
    ProcessState { value: ProcessState },
    TradingMode { value: TradingMode },
    ErrorState { value: LogLevel },
    Position { value: Decimal },
    Pnl { value: Decimal },
    /// Market tick: updates the last price and feeds protective children
    Price { value: Decimal },
    /// Own fill; sent through the gate, registered, then reported as a trade
    Fill {
        side: OrderSide,
        price: Decimal,
        volume: Decimal,
    },
}

impl Scenario {
    /// Parse a scenario from JSON text.
    pub fn from_json(text: &str) -> SimResult<Self> {
        let scenario: Scenario = serde_json::from_str(text)?;
        if scenario.steps.is_empty() {
            return Err(SimError::Scenario(format!("Scenario '{}' has no steps", scenario.name)));
        }
        Ok(scenario)
    }

    /// Load a scenario file.
    pub fn load(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// The bundled scenario.
    pub fn bundled() -> SimResult<Self> {
        Self::from_json(BUNDLED_SCENARIO)
    }
}

// =============================================================================
// Report
// =============================================================================

/// Outcome of a replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimReport {
    pub scenario: String,
    pub steps: usize,
    /// Fills rejected by the trading gate
    pub gated_fills: usize,
    pub final_position: Decimal,
    pub final_pnl: Decimal,
    /// Commands the router received, in order
    pub commands: Vec<RouterCommand>,
    /// Protective children that fired
    pub protective_exits: usize,
    /// Children still attached at the end
    pub children: usize,
    pub faults: Vec<String>,
    /// Rules still subscribed at the end
    pub live_rules: Vec<String>,
}

// =============================================================================
// Simulator
// =============================================================================

/// Drives one strategy through a scenario.
pub struct Simulator {
    config: Config,
    router: Arc<RecordingRouter>,
    strategy: Arc<Strategy>,
    faults: Arc<Mutex<Vec<String>>>,
    exits: AtomicUsize,
}

impl Simulator {
    /// Build the strategy and install the guard rules:
    /// - P&L below the configured level flattens the position, once
    /// - entering `Stopping` flattens the position
    /// - every fault, including children's, is recorded
    pub fn new(config: Config) -> SimResult<Self> {
        let router = Arc::new(RecordingRouter::new());
        let strategy = Strategy::builder("sim", router.clone())
            .security(config.strategy.security.clone())
            .portfolio(Portfolio::new(config.strategy.portfolio.clone()))
            .volume(config.strategy.default_volume)
            .trading_mode(config.strategy.trading_mode)
            .build();

        let slippage = config.guard.close_slippage;
        strategy
            .when_pnl_less(config.guard.stop_loss_pnl)?
            .named("P&L stop")
            .once()
            .close_position(slippage)?;
        strategy.when_stopping()?.close_position(slippage)?;

        let faults = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&faults);
        strategy
            .when_error(true)?
            .named("record faults")
            .on_activated(move |fault: &StrategyFault| {
                warn!(origin = %fault.origin_name, error = %fault.error, "Fault recorded");
                sink.lock().unwrap_or_else(|e| e.into_inner()).push(fault.to_string());
                Ok(())
            });

        Ok(Self {
            config,
            router,
            strategy,
            faults,
            exits: AtomicUsize::new(0),
        })
    }

    pub fn strategy(&self) -> &Arc<Strategy> {
        &self.strategy
    }

    pub fn router(&self) -> &Arc<RecordingRouter> {
        &self.router
    }

    /// Replay every step and dispose the strategy.
    pub fn run(self, scenario: &Scenario) -> SimResult<SimReport> {
        info!(
            scenario = %scenario.name,
            steps = scenario.steps.len(),
            environment = %self.config.environment,
            "Replaying scenario"
        );

        if let Some(protection) = scenario.protect {
            self.strategy
                .when_new_trade()?
                .named("protect fills")
                .protect(protection.take_profit, protection.stop_loss)?;
        }

        let mut gated_fills = 0;
        for (index, step) in scenario.steps.iter().enumerate() {
            if !self.apply(step)? {
                gated_fills += 1;
                warn!(step = index, "Fill rejected by trading gate");
            }
        }

        let report = SimReport {
            scenario: scenario.name.clone(),
            steps: scenario.steps.len(),
            gated_fills,
            final_position: self.strategy.position(),
            final_pnl: self.strategy.pnl(),
            commands: self.router.commands(),
            protective_exits: self.exits.load(Ordering::SeqCst),
            children: self.strategy.children().len(),
            faults: self.faults.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            live_rules: self.strategy.rules().names(),
        };

        self.strategy.dispose();
        info!(commands = report.commands.len(), position = %report.final_position, "Scenario done");
        Ok(report)
    }

    /// Apply one step. Returns `false` for a fill the gate rejected.
    fn apply(&self, step: &Step) -> SimResult<bool> {
        let strategy = &self.strategy;
        match step {
            Step::Formed { value } => strategy.set_formed(*value)?,
            Step::Online { value } => strategy.set_online(*value)?,
            Step::ProcessState { value } => strategy.set_process_state(*value)?,
            Step::TradingMode { value } => strategy.set_trading_mode(*value)?,
            Step::ErrorState { value } => strategy.set_error_state(*value)?,
            Step::Position { value } => strategy.set_position(*value)?,
            Step::Pnl { value } => strategy.set_pnl(*value)?,
            Step::Price { value } => {
                strategy.set_last_price(Price::new(*value)?)?;
                for child in strategy.children() {
                    if let ChildStrategy::Protective(protective) = child {
                        if let Some(exit) = protective.on_price(*value)? {
                            info!(leg = ?exit.leg, level = %exit.level, "Protective exit");
                            self.exits.fetch_add(1, Ordering::SeqCst);
                            strategy.set_position(
                                strategy.position()
                                    - exit.trade.side.sign() * exit.trade.volume.as_decimal(),
                            )?;
                        }
                    }
                }
            }
            Step::Fill { side, price, volume } => {
                if !is_formed_and_online_and_allow_trading(strategy, TradingMode::Full)? {
                    return Ok(false);
                }
                let order = strategy.create_order(*side, None, Some(*volume))?;
                let order = strategy.register_order(order)?;
                let trade = Trade::new(&order, Price::new(*price)?, Quantity::new(*volume)?);
                strategy.set_position(strategy.position() + side.sign() * *volume)?;
                strategy.process_trade(trade)?;
            }
        }
        Ok(true)
    }
}

// =============================================================================
// Tests
// =============================================================================
