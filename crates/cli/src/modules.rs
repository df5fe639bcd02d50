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

//! The modules a trader process runs.

use std::{cell::RefCell, rc::Rc, time::Duration};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use trader_common::{
    module::{Module, ModuleRuntime},
    msgbus::{BusConfig, Payload},
    registry::{CallbackRegistry, ChannelEvent, CronTick, RegistryError},
};
use trader_execution::{
    algorithm::AlgoEngine,
    conditional::ConditionalOrderEngine,
    market::{BookTop, PriceCache},
    placer::{OrderPlacer, place_or_log},
    protection::StopEngine,
};
use trader_model::{
    enums::{Direction, OffsetFlag},
    identifiers::{AccountId, InstrumentId},
    order::OrderIntent,
};
use trader_risk::engine::RiskEngine;

fn to_payload<T: Serialize>(value: &T) -> anyhow::Result<Payload> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected a JSON object, was {other}"),
    }
}

fn from_payload<T: DeserializeOwned>(payload: &Payload) -> anyhow::Result<T> {
    Ok(serde_json::from_value(Value::Object(payload.clone()))?)
}

/// An [`OrderPlacer`] which only logs, accepting every order.
#[derive(Debug, Default)]
pub struct PaperPlacer {
    placed: RefCell<Vec<(InstrumentId, Direction, Decimal, u64)>>,
}

impl PaperPlacer {
    /// Creates a new [`PaperPlacer`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn placed(&self) -> Vec<(InstrumentId, Direction, Decimal, u64)> {
        self.placed.borrow().clone()
    }
}

#[async_trait(?Send)]
impl OrderPlacer for PaperPlacer {
    async fn place(
        &self,
        instrument_id: &InstrumentId,
        direction: Direction,
        price: Decimal,
        volume: u64,
    ) -> anyhow::Result<bool> {
        log::info!("[PAPER] {direction} {instrument_id} {volume}@{price}");
        self.placed
            .borrow_mut()
            .push((*instrument_id, direction, price, volume));
        Ok(true)
    }
}

/// Publishes a liveness message on a cron schedule.
#[derive(Debug)]
pub struct HeartbeatModule {
    runtime: ModuleRuntime,
    cron: String,
    channel: String,
}

impl HeartbeatModule {
    pub const NAME: &'static str = "heartbeat";

    #[must_use]
    pub fn new(runtime: ModuleRuntime, cron: &str, bus_config: &BusConfig) -> Self {
        Self {
            runtime,
            cron: cron.to_string(),
            channel: format!("{}:HEARTBEAT", bus_config.channel_prefix),
        }
    }
}

#[async_trait(?Send)]
impl Module for HeartbeatModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn runtime(&self) -> &ModuleRuntime {
        &self.runtime
    }

    fn callbacks(&self) -> Result<CallbackRegistry, RegistryError> {
        let runtime = self.runtime.clone();
        let channel = self.channel.clone();
        CallbackRegistry::builder()
            .on_cron("heartbeat", &self.cron, move |tick| {
                let runtime = runtime.clone();
                let channel = channel.clone();
                async move {
                    let mut payload = Payload::new();
                    payload.insert("module".to_string(), Value::from(runtime.name().as_str()));
                    payload.insert(
                        "scheduled_at".to_string(),
                        Value::from(tick.scheduled_at.to_rfc3339()),
                    );
                    runtime.publish(&channel, &payload).await
                }
            })
            .build()
    }
}

/// Answers every request with its own payload on the matching response channel.
#[derive(Debug)]
pub struct EchoModule {
    runtime: ModuleRuntime,
    bus_config: BusConfig,
}

impl EchoModule {
    pub const NAME: &'static str = "echo";

    #[must_use]
    pub fn new(runtime: ModuleRuntime, bus_config: BusConfig) -> Self {
        Self {
            runtime,
            bus_config,
        }
    }
}

#[async_trait(?Send)]
impl Module for EchoModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn runtime(&self) -> &ModuleRuntime {
        &self.runtime
    }

    fn callbacks(&self) -> Result<CallbackRegistry, RegistryError> {
        let runtime = self.runtime.clone();
        let bus_config = self.bus_config.clone();
        let request_prefix = format!("{}:REQ:", bus_config.channel_prefix);
        CallbackRegistry::builder()
            .on_channel("echo", &bus_config.request_pattern(), move |event| {
                let runtime = runtime.clone();
                let suffix = event
                    .channel
                    .as_str()
                    .strip_prefix(&request_prefix)
                    .unwrap_or(event.channel.as_str())
                    .to_string();
                let channel = bus_config.response_channel(&suffix);
                async move {
                    let mut payload = event.payload;
                    payload.insert("echo".to_string(), Value::Bool(true));
                    runtime.publish(&channel, &payload).await
                }
            })
            .build()
    }
}

/// A market data message on a `MARKET:<instrument>` response channel.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct MarketUpdate {
    instrument: InstrumentId,
    price: Decimal,
    #[serde(flatten)]
    book: Option<BookTop>,
}

/// Feeds prices into the shared cache and sweeps stop and conditional orders on a schedule.
#[derive(Debug)]
pub struct SupervisionModule {
    runtime: ModuleRuntime,
    bus_config: BusConfig,
    prices: Rc<PriceCache>,
    stops: Rc<StopEngine>,
    conditional: Rc<ConditionalOrderEngine>,
}

impl SupervisionModule {
    pub const NAME: &'static str = "supervision";

    #[must_use]
    pub const fn new(
        runtime: ModuleRuntime,
        bus_config: BusConfig,
        prices: Rc<PriceCache>,
        stops: Rc<StopEngine>,
        conditional: Rc<ConditionalOrderEngine>,
    ) -> Self {
        Self {
            runtime,
            bus_config,
            prices,
            stops,
            conditional,
        }
    }
}

#[async_trait(?Send)]
impl Module for SupervisionModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn runtime(&self) -> &ModuleRuntime {
        &self.runtime
    }

    // Stops are checked before conditions when both engines share a schedule
    fn callbacks(&self) -> Result<CallbackRegistry, RegistryError> {
        let prices = self.prices.clone();
        let on_market = move |event: ChannelEvent| {
            let result = from_payload::<MarketUpdate>(&event.payload).map(|update| {
                prices.update_price(update.instrument, update.price);
                if let Some(book) = update.book {
                    prices.update_book(update.instrument, book);
                }
            });
            async move { result }
        };

        let runtime = self.runtime.clone();
        let prices = self.prices.clone();
        let stops = self.stops.clone();
        let stop_channel = self.bus_config.response_channel("STOP");
        let sweep_stops = move |_tick: CronTick| {
            let runtime = runtime.clone();
            let triggers = stops.check_and_trigger(&prices.snapshot());
            let stop_channel = stop_channel.clone();
            async move {
                for trigger in &triggers {
                    runtime.publish(&stop_channel, &to_payload(trigger)?).await?;
                }
                Ok(())
            }
        };

        let conditional = self.conditional.clone();
        let sweep_conditional = move || {
            let dispatched = conditional.sweep_and_dispatch();
            if dispatched > 0 {
                log::info!("Dispatched {dispatched} conditional order(s)");
            }
        };

        let stop_schedule = self.stops.config().check_schedule();
        let conditional_schedule = self.conditional.config().check_schedule();
        let builder = CallbackRegistry::builder().on_channel(
            "market",
            &self.bus_config.response_channel("MARKET:*"),
            on_market,
        );

        if stop_schedule == conditional_schedule {
            builder
                .on_cron("sweep", &stop_schedule, move |tick: CronTick| {
                    let publish = sweep_stops(tick);
                    sweep_conditional();
                    publish
                })
                .build()
        } else {
            builder
                .on_cron("stop_sweep", &stop_schedule, sweep_stops)
                .on_cron("conditional_sweep", &conditional_schedule, move |_tick: CronTick| {
                    sweep_conditional();
                    async { Ok(()) }
                })
                .build()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum AlgoRequestKind {
    Twap,
    Vwap,
    Snapshot,
}

const fn open_offset() -> OffsetFlag {
    OffsetFlag::Open
}

/// A request to run an execution algorithm.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct AlgoRequest {
    algo: AlgoRequestKind,
    account_id: AccountId,
    instrument: InstrumentId,
    direction: Direction,
    #[serde(default = "open_offset")]
    offset: OffsetFlag,
    volume: u64,
    #[serde(default)]
    duration_secs: Option<u64>,
    #[serde(default)]
    price_limit: Option<Decimal>,
}

/// Runs TWAP, VWAP and snapshot requests received on the `REQ:ALGO` channel.
///
/// The parent order is risk checked at its limit, or at the market when no limit is given.
/// Rejected requests are answered on `RSP:ALGO` with the check result and never executed.
#[derive(Debug)]
pub struct AlgoModule {
    runtime: ModuleRuntime,
    bus_config: BusConfig,
    risk: Rc<RiskEngine>,
    engine: Rc<AlgoEngine>,
}

impl AlgoModule {
    pub const NAME: &'static str = "algo";

    #[must_use]
    pub const fn new(
        runtime: ModuleRuntime,
        bus_config: BusConfig,
        risk: Rc<RiskEngine>,
        engine: Rc<AlgoEngine>,
    ) -> Self {
        Self {
            runtime,
            bus_config,
            risk,
            engine,
        }
    }
}

#[async_trait(?Send)]
impl Module for AlgoModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn runtime(&self) -> &ModuleRuntime {
        &self.runtime
    }

    fn callbacks(&self) -> Result<CallbackRegistry, RegistryError> {
        let runtime = self.runtime.clone();
        let risk = self.risk.clone();
        let engine = self.engine.clone();
        let response_channel = self.bus_config.response_channel("ALGO");
        CallbackRegistry::builder()
            .on_channel(
                "algo_request",
                &format!("{}:REQ:ALGO", self.bus_config.channel_prefix),
                move |event| {
                    let runtime = runtime.clone();
                    let risk = risk.clone();
                    let engine = engine.clone();
                    let response_channel = response_channel.clone();
                    async move {
                        let request: AlgoRequest = from_payload(&event.payload)?;
                        let Some(price) = request.price_limit.or_else(|| {
                            engine.market_price(&request.instrument, request.direction)
                        }) else {
                            anyhow::bail!("No price to risk check algo request {request:?}");
                        };

                        let parent = OrderIntent::new(
                            request.account_id,
                            request.instrument,
                            request.direction,
                            request.offset,
                            price,
                            request.volume,
                        );
                        let check = risk.check(&parent);
                        if !check.passed {
                            return runtime
                                .publish(&response_channel, &to_payload(&check)?)
                                .await;
                        }

                        let id = match request.algo {
                            AlgoRequestKind::Twap => {
                                let duration = request.duration_secs.map(Duration::from_secs);
                                engine
                                    .twap(
                                        request.instrument,
                                        request.direction,
                                        request.volume,
                                        duration,
                                        request.price_limit,
                                    )
                                    .await
                            }
                            AlgoRequestKind::Vwap => {
                                engine
                                    .vwap(
                                        request.instrument,
                                        request.direction,
                                        request.volume,
                                        request.price_limit,
                                    )
                                    .await
                            }
                            AlgoRequestKind::Snapshot => {
                                engine
                                    .snapshot(
                                        request.instrument,
                                        request.direction,
                                        request.volume,
                                        request.price_limit,
                                    )
                                    .await
                            }
                        };

                        let Some(order) = id.and_then(|id| engine.status(&id)) else {
                            anyhow::bail!("Rejected algo request {request:?}");
                        };

                        let mut payload = Payload::new();
                        payload.insert("id".to_string(), Value::from(order.id.as_str()));
                        payload.insert("status".to_string(), Value::from(order.status.to_string()));
                        payload.insert(
                            "filled_volume".to_string(),
                            Value::from(order.filled_volume),
                        );
                        runtime.publish(&response_channel, &payload).await
                    }
                },
            )
            .build()
    }
}

/// Gates order requests received on the `REQ:ORDER` channel through the risk engine.
///
/// Accepted orders go to the placer. Every request is answered on `RSP:ORDER` with the check
/// result.
#[derive(Debug)]
pub struct OrderModule {
    runtime: ModuleRuntime,
    bus_config: BusConfig,
    risk: Rc<RiskEngine>,
    placer: Rc<dyn OrderPlacer>,
}

impl OrderModule {
    pub const NAME: &'static str = "order";

    #[must_use]
    pub fn new(
        runtime: ModuleRuntime,
        bus_config: BusConfig,
        risk: Rc<RiskEngine>,
        placer: Rc<dyn OrderPlacer>,
    ) -> Self {
        Self {
            runtime,
            bus_config,
            risk,
            placer,
        }
    }
}

#[async_trait(?Send)]
impl Module for OrderModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn runtime(&self) -> &ModuleRuntime {
        &self.runtime
    }

    fn callbacks(&self) -> Result<CallbackRegistry, RegistryError> {
        let runtime = self.runtime.clone();
        let risk = self.risk.clone();
        let placer = self.placer.clone();
        let response_channel = self.bus_config.response_channel("ORDER");
        CallbackRegistry::builder()
            .on_channel(
                "order_request",
                &format!("{}:REQ:ORDER", self.bus_config.channel_prefix),
                move |event| {
                    let runtime = runtime.clone();
                    let risk = risk.clone();
                    let placer = placer.clone();
                    let response_channel = response_channel.clone();
                    async move {
                        let order: OrderIntent = from_payload(&event.payload)?;
                        let result = risk.check(&order);
                        if result.passed {
                            place_or_log(
                                &*placer,
                                &order.instrument_id,
                                order.direction,
                                order.price,
                                order.volume,
                            )
                            .await;
                        }
                        runtime
                            .publish(&response_channel, &to_payload(&result)?)
                            .await
                    }
                },
            )
            .build()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use std::future::Future;

    use chrono_tz::Asia::Shanghai;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tokio::task::LocalSet;
    use trader_common::{
        clock::TestClock,
        msgbus::{InMemoryMessageBus, MessageBus},
        store::InMemoryStore,
        stubs::{session_time, store},
    };
    use trader_execution::{
        config::{AlgoEngineConfig, ConditionalEngineConfig, StopEngineConfig},
        market::MarketDataProvider,
        conditional::stop_limit_order,
        protection::StopKind,
        stubs::RecordingPlacer,
    };
    use trader_model::identifiers::PositionId;
    use trader_risk::engine::config::RiskEngineConfig;
    use trader_trading::sessions::TradingSessions;
    use ustr::Ustr;

    use super::*;

    async fn run_local<F: Future>(future: F) -> F::Output {
        LocalSet::new().run_until(future).await
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    struct Harness {
        bus: Rc<InMemoryMessageBus>,
        clock: Rc<TestClock>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                bus: Rc::new(InMemoryMessageBus::new()),
                clock: Rc::new(TestClock::new(session_time())),
            }
        }

        fn runtime(&self, name: &str) -> ModuleRuntime {
            ModuleRuntime::new(name, self.bus.clone(), self.clock.clone(), Shanghai)
        }

        fn published_on(&self, channel: &str) -> Vec<Payload> {
            self.bus
                .published()
                .into_iter()
                .filter(|(c, _)| *c == Ustr::from(channel))
                .map(|(_, p)| p)
                .collect()
        }
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_publishes_on_schedule() {
        run_local(async {
            let harness = Harness::new();
            let module = HeartbeatModule::new(
                harness.runtime(HeartbeatModule::NAME),
                "*/10 * * * * *",
                &BusConfig::default(),
            );
            assert!(module.install().await);

            tokio::time::sleep(Duration::from_secs(25)).await;

            let beats = harness.published_on("MSG:CTP:HEARTBEAT");
            assert_eq!(beats.len(), 2);
            assert_eq!(beats[0]["module"], json!("heartbeat"));
            assert_eq!(
                beats[0]["scheduled_at"],
                json!("2024-01-02T02:00:10+00:00")
            );

            module.uninstall().await;
            tokio::time::sleep(Duration::from_secs(30)).await;
            assert_eq!(harness.published_on("MSG:CTP:HEARTBEAT").len(), 2);
        })
        .await;
    }

    #[rstest]
    fn test_heartbeat_rejects_bad_cron() {
        let harness = Harness::new();
        let module = HeartbeatModule::new(
            harness.runtime(HeartbeatModule::NAME),
            "not a cron",
            &BusConfig::default(),
        );
        assert!(module.callbacks().is_err());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_echo_replies_on_response_channel() {
        run_local(async {
            let harness = Harness::new();
            let module = EchoModule::new(harness.runtime(EchoModule::NAME), BusConfig::default());
            assert!(module.install().await);

            harness
                .bus
                .publish("MSG:CTP:REQ:PING", &payload(json!({"seq": 7})))
                .await
                .unwrap();
            settle().await;

            let replies = harness.published_on("MSG:CTP:RSP:PING");
            assert_eq!(replies, vec![payload(json!({"seq": 7, "echo": true}))]);
            module.uninstall().await;
        })
        .await;
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_supervision_feeds_prices_and_fires_stops(store: Rc<InMemoryStore>) {
        run_local(async move {
            let harness = Harness::new();
            let prices = Rc::new(PriceCache::new());
            let placer = Rc::new(RecordingPlacer::new());
            let stops = Rc::new(StopEngine::new(
                StopEngineConfig::default(),
                store.clone(),
                harness.clock.clone(),
            ));
            let conditional = Rc::new(ConditionalOrderEngine::new(
                ConditionalEngineConfig::default(),
                store.clone(),
                harness.clock.clone(),
                prices.clone(),
                placer.clone(),
            ));
            let module = SupervisionModule::new(
                harness.runtime(SupervisionModule::NAME),
                BusConfig::default(),
                prices.clone(),
                stops.clone(),
                conditional.clone(),
            );

            let rb = InstrumentId::new("rb2510");
            let long = PositionId::new("P-LONG-1");
            assert!(stops.register_stop(&long, StopKind::FixedPrice(dec!(95))));
            let order_id = conditional
                .create(stop_limit_order(
                    AccountId::new("SIM-001"),
                    rb,
                    Direction::Long,
                    dec!(96),
                    dec!(95),
                    2,
                ))
                .unwrap();
            assert!(module.install().await);

            harness
                .bus
                .publish(
                    "MSG:CTP:RSP:MARKET:rb2510",
                    &payload(json!({"instrument": "rb2510", "price": "99"})),
                )
                .await
                .unwrap();
            settle().await;
            assert_eq!(prices.last_price(&rb), Some(dec!(99)));

            tokio::time::sleep(Duration::from_millis(1500)).await;
            assert!(harness.published_on("MSG:CTP:RSP:STOP").is_empty());
            assert!(placer.orders().is_empty());

            harness
                .bus
                .publish(
                    "MSG:CTP:RSP:MARKET:rb2510",
                    &payload(json!({
                        "instrument": "rb2510",
                        "price": "94",
                        "bid_price": "93",
                        "bid_volume": 5,
                        "ask_price": "95",
                        "ask_volume": 8,
                    })),
                )
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;

            let fired = harness.published_on("MSG:CTP:RSP:STOP");
            assert_eq!(fired.len(), 1);
            assert_eq!(fired[0]["position_id"], json!("P-LONG-1"));
            assert_eq!(prices.book_top(&rb).unwrap().ask_volume, 8);

            let orders = placer.orders();
            assert_eq!(orders.len(), 1);
            assert_eq!(orders[0].price, dec!(95));
            assert_eq!(conditional.status(&order_id).unwrap().filled_volume, 2);

            module.uninstall().await;
        })
        .await;
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_supervision_sweeps_conditions_on_their_own_interval(store: Rc<InMemoryStore>) {
        run_local(async move {
            let harness = Harness::new();
            let prices = Rc::new(PriceCache::new());
            let placer = Rc::new(RecordingPlacer::new());
            let stops = Rc::new(StopEngine::new(
                StopEngineConfig::default(),
                store.clone(),
                harness.clock.clone(),
            ));
            let conditional = Rc::new(ConditionalOrderEngine::new(
                ConditionalEngineConfig {
                    check_interval_secs: 5,
                    ..ConditionalEngineConfig::default()
                },
                store.clone(),
                harness.clock.clone(),
                prices.clone(),
                placer.clone(),
            ));
            let module = SupervisionModule::new(
                harness.runtime(SupervisionModule::NAME),
                BusConfig::default(),
                prices.clone(),
                stops.clone(),
                conditional.clone(),
            );

            let registry = module.callbacks().unwrap();
            assert_eq!(registry.schedules().len(), 2);

            let rb = InstrumentId::new("rb2510");
            let long = PositionId::new("P-LONG-1");
            assert!(stops.register_stop(&long, StopKind::FixedPrice(dec!(95))));
            conditional
                .create(stop_limit_order(
                    AccountId::new("SIM-001"),
                    rb,
                    Direction::Long,
                    dec!(96),
                    dec!(95),
                    2,
                ))
                .unwrap();
            prices.update_price(rb, dec!(94));
            assert!(module.install().await);

            // Stops are swept every second, conditions only at 10:00:05
            tokio::time::sleep(Duration::from_millis(2500)).await;
            assert_eq!(harness.published_on("MSG:CTP:RSP:STOP").len(), 1);
            assert!(placer.orders().is_empty());

            tokio::time::sleep(Duration::from_secs(3)).await;
            let orders = placer.orders();
            assert_eq!(orders.len(), 1);
            assert_eq!(orders[0].volume, 2);

            module.uninstall().await;
        })
        .await;
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_supervision_ignores_malformed_market_data(store: Rc<InMemoryStore>) {
        run_local(async move {
            let harness = Harness::new();
            let prices = Rc::new(PriceCache::new());
            let module = SupervisionModule::new(
                harness.runtime(SupervisionModule::NAME),
                BusConfig::default(),
                prices.clone(),
                Rc::new(StopEngine::new(
                    StopEngineConfig::default(),
                    store.clone(),
                    harness.clock.clone(),
                )),
                Rc::new(ConditionalOrderEngine::new(
                    ConditionalEngineConfig::default(),
                    store,
                    harness.clock.clone(),
                    prices.clone(),
                    Rc::new(PaperPlacer::new()),
                )),
            );
            assert!(module.install().await);

            harness
                .bus
                .publish(
                    "MSG:CTP:RSP:MARKET:rb2510",
                    &payload(json!({"price": "99"})),
                )
                .await
                .unwrap();
            settle().await;

            assert!(prices.snapshot().is_empty());
            assert!(module.runtime().is_installed());
            module.uninstall().await;
        })
        .await;
    }

    fn algo_module(
        harness: &Harness,
        store: Rc<InMemoryStore>,
        prices: &Rc<PriceCache>,
        placer: Rc<PaperPlacer>,
    ) -> (AlgoModule, Rc<AlgoEngine>) {
        let risk = Rc::new(RiskEngine::new(
            RiskEngineConfig::default(),
            store,
            harness.clock.clone(),
            TradingSessions::default(),
        ));
        let engine = Rc::new(AlgoEngine::new(
            AlgoEngineConfig::default(),
            harness.clock.clone(),
            prices.clone(),
            placer,
        ));
        let module = AlgoModule::new(
            harness.runtime(AlgoModule::NAME),
            BusConfig::default(),
            risk,
            engine.clone(),
        );
        (module, engine)
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_algo_snapshot_request(store: Rc<InMemoryStore>) {
        run_local(async move {
            let harness = Harness::new();
            let prices = Rc::new(PriceCache::new());
            let placer = Rc::new(PaperPlacer::new());
            let (module, engine) = algo_module(&harness, store, &prices, placer.clone());
            assert!(module.install().await);

            let rb = InstrumentId::new("rb2510");
            prices.update_book(
                rb,
                BookTop {
                    bid_price: dec!(3499),
                    bid_volume: 10,
                    ask_price: dec!(3501),
                    ask_volume: 10,
                },
            );

            harness
                .bus
                .publish(
                    "MSG:CTP:REQ:ALGO",
                    &payload(json!({
                        "algo": "SNAPSHOT",
                        "account_id": "SIM-001",
                        "instrument": "rb2510",
                        "direction": "LONG",
                        "volume": 4,
                        "price_limit": "3500",
                    })),
                )
                .await
                .unwrap();
            settle().await;

            assert_eq!(placer.placed(), vec![(rb, Direction::Long, dec!(3500), 4)]);
            let replies = harness.published_on("MSG:CTP:RSP:ALGO");
            assert_eq!(
                replies,
                vec![payload(json!({"id": "ALGO-1", "status": "COMPLETED", "filled_volume": 4}))]
            );

            harness
                .bus
                .publish(
                    "MSG:CTP:REQ:ALGO",
                    &payload(json!({
                        "algo": "TWAP",
                        "account_id": "SIM-001",
                        "instrument": "rb2510",
                        "direction": "LONG",
                        "volume": 0,
                    })),
                )
                .await
                .unwrap();
            settle().await;

            let replies = harness.published_on("MSG:CTP:RSP:ALGO");
            assert_eq!(replies.len(), 2);
            assert_eq!(replies[1]["passed"], json!(false));
            assert_eq!(replies[1]["code"], json!("RISK_005"));
            assert_eq!(engine.len(), 1);
            module.uninstall().await;
        })
        .await;
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_algo_request_denied_by_risk_never_executes(store: Rc<InMemoryStore>) {
        run_local(async move {
            let harness = Harness::new();
            let prices = Rc::new(PriceCache::new());
            let placer = Rc::new(PaperPlacer::new());
            let (module, engine) = algo_module(&harness, store, &prices, placer.clone());
            assert!(module.install().await);

            // Without a limit the parent is checked at the last price, close to the upper limit
            prices.update_price(InstrumentId::new("rb2510"), dec!(3799));
            harness
                .bus
                .publish(
                    "MSG:CTP:REQ:ALGO",
                    &payload(json!({
                        "algo": "TWAP",
                        "account_id": "SIM-001",
                        "instrument": "rb2510",
                        "direction": "LONG",
                        "volume": 10,
                        "duration_secs": 600,
                    })),
                )
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(700)).await;

            let replies = harness.published_on("MSG:CTP:RSP:ALGO");
            assert_eq!(replies.len(), 1);
            assert_eq!(replies[0]["passed"], json!(false));
            assert_eq!(replies[0]["code"], json!("RISK_003"));
            assert!(engine.is_empty());
            assert!(placer.placed().is_empty());
            module.uninstall().await;
        })
        .await;
    }

    #[rstest]
    #[case(json!("3500"), true, None)]
    #[case(json!("3799"), false, Some("RISK_003"))]
    #[tokio::test(start_paused = true)]
    async fn test_order_request_gated_by_risk(
        store: Rc<InMemoryStore>,
        #[case] price: serde_json::Value,
        #[case] passed: bool,
        #[case] code: Option<&'static str>,
    ) {
        run_local(async move {
            let harness = Harness::new();
            let placer = Rc::new(PaperPlacer::new());
            let risk = Rc::new(RiskEngine::new(
                RiskEngineConfig::default(),
                store,
                harness.clock.clone(),
                TradingSessions::default(),
            ));
            let module = OrderModule::new(
                harness.runtime(OrderModule::NAME),
                BusConfig::default(),
                risk.clone(),
                placer.clone(),
            );
            assert!(module.install().await);

            harness
                .bus
                .publish(
                    "MSG:CTP:REQ:ORDER",
                    &payload(json!({
                        "account_id": "SIM-001",
                        "instrument_id": "rb2510",
                        "direction": "LONG",
                        "offset": "OPEN",
                        "price": price,
                        "volume": 1,
                    })),
                )
                .await
                .unwrap();
            settle().await;

            let replies = harness.published_on("MSG:CTP:RSP:ORDER");
            assert_eq!(replies.len(), 1);
            assert_eq!(replies[0]["passed"], json!(passed));
            assert_eq!(replies[0]["code"], json!(code));
            assert_eq!(placer.placed().len(), usize::from(passed));
            assert_eq!(risk.order_count(&InstrumentId::new("rb2510")), usize::from(passed));
            module.uninstall().await;
        })
        .await;
    }
}
