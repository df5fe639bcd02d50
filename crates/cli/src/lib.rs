// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! The `trader` command-line interface.
//!
//! `trader run` loads a TOML config, connects the message bus and runs the standard modules until
//! interrupted. `trader check-config` validates a config without connecting to anything.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]

pub mod config;
pub mod modules;
pub mod opt;

use std::rc::Rc;

use tokio::task::LocalSet;
use trader_common::{
    clock::{Clock, LiveClock},
    logging::init_logging,
    module::ModuleRuntime,
    msgbus::{InMemoryMessageBus, MessageBus},
    store::{EntityStore, InMemoryStore},
};
use trader_execution::{
    algorithm::AlgoEngine, conditional::ConditionalOrderEngine, market::PriceCache,
    placer::OrderPlacer, protection::StopEngine,
};
use trader_infrastructure::redis::msgbus::RedisMessageBus;
use trader_risk::engine::RiskEngine;
use trader_trading::{manager::ModuleManager, sessions::TradingSessions};

use crate::{
    config::TraderConfig,
    modules::{
        AlgoModule, EchoModule, HeartbeatModule, OrderModule, PaperPlacer, SupervisionModule,
    },
    opt::{Commands, ConfigOpt, RunOpt, TraderCli},
};

/// Executes the parsed command.
///
/// # Errors
///
/// Returns an error if the config is invalid or the process cannot start.
pub async fn run(cli: TraderCli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(opt) => run_trader(opt).await,
        Commands::CheckConfig(opt) => check_config(&opt),
    }
}

/// Loads the config named by `opt`, applies environment overrides and validates the result.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the final config is invalid.
pub fn load_config(opt: &ConfigOpt) -> anyhow::Result<TraderConfig> {
    let mut config = match &opt.config {
        Some(path) => TraderConfig::from_file(path)?,
        None => TraderConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

fn check_config(opt: &ConfigOpt) -> anyhow::Result<()> {
    let mut config = load_config(opt)?;
    if config.bus.password.is_some() {
        config.bus.password = Some("********".to_string());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Builds the engines and registers the standard modules on `bus`.
///
/// Orders are paper-placed; there is no exchange gateway in this process.
///
/// # Errors
///
/// Returns an error if two modules share a name.
pub fn build_modules(
    config: &TraderConfig,
    bus: Rc<dyn MessageBus>,
    clock: Rc<dyn Clock>,
    store: Rc<dyn EntityStore>,
) -> anyhow::Result<ModuleManager> {
    let prices = Rc::new(PriceCache::new());
    let placer: Rc<dyn OrderPlacer> = Rc::new(PaperPlacer::new());

    let risk = Rc::new(RiskEngine::new(
        config.risk.clone(),
        store.clone(),
        clock.clone(),
        TradingSessions::new(config.sessions.clone()),
    ));
    let stops = Rc::new(StopEngine::new(
        config.stop.clone(),
        store.clone(),
        clock.clone(),
    ));
    let conditional = Rc::new(ConditionalOrderEngine::new(
        config.conditional.clone(),
        store,
        clock.clone(),
        prices.clone(),
        placer.clone(),
    ));
    let algo = Rc::new(AlgoEngine::new(
        config.algo.clone(),
        clock.clone(),
        prices.clone(),
        placer.clone(),
    ));

    let tz = config.sessions.timezone;
    let runtime = move |name: &str| ModuleRuntime::new(name, bus.clone(), clock.clone(), tz);

    let mut manager = ModuleManager::new();
    manager.register(Rc::new(HeartbeatModule::new(
        runtime(HeartbeatModule::NAME),
        &config.heartbeat.cron,
        &config.bus,
    )))?;
    manager.register(Rc::new(EchoModule::new(
        runtime(EchoModule::NAME),
        config.bus.clone(),
    )))?;
    manager.register(Rc::new(OrderModule::new(
        runtime(OrderModule::NAME),
        config.bus.clone(),
        risk.clone(),
        placer,
    )))?;
    manager.register(Rc::new(SupervisionModule::new(
        runtime(SupervisionModule::NAME),
        config.bus.clone(),
        prices,
        stops,
        conditional,
    )))?;
    manager.register(Rc::new(AlgoModule::new(
        runtime(AlgoModule::NAME),
        config.bus.clone(),
        risk,
        algo,
    )))?;
    Ok(manager)
}

async fn run_trader(opt: RunOpt) -> anyhow::Result<()> {
    let config = load_config(&opt.config)?;
    init_logging(&config.logging)?;

    LocalSet::new()
        .run_until(async move {
            let bus: Rc<dyn MessageBus> = if opt.in_memory {
                log::warn!("Using an in-process message bus");
                Rc::new(InMemoryMessageBus::new())
            } else {
                Rc::new(RedisMessageBus::connect(&config.bus).await?)
            };

            log::warn!("Entity store is in-memory and starts empty");
            let store: Rc<dyn EntityStore> = Rc::new(InMemoryStore::new());
            let manager = build_modules(&config, bus, Rc::new(LiveClock::new()), store)?;

            let started = manager.start_all().await;
            log::info!("Started {started}/{} modules", manager.names().len());

            tokio::signal::ctrl_c().await?;
            log::info!("Interrupted, stopping modules");
            manager.stop_all().await;
            Ok(())
        })
        .await
}
