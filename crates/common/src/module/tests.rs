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

use std::{cell::RefCell, future::Future, rc::Rc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Asia::Shanghai;
use rstest::*;
use serde_json::json;
use tokio::{
    sync::mpsc::{self, UnboundedSender},
    task::LocalSet,
};
use ustr::Ustr;

use super::*;
use crate::{
    clock::TestClock,
    msgbus::{
        BusEvent, BusMessage, InMemoryMessageBus, MessageBus, Payload, Subscription,
        SubscriptionId,
    },
    registry::{ChannelEvent, CronTick},
};

fn shanghai(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Shanghai
        .with_ymd_and_hms(2024, 1, 2, h, m, s)
        .unwrap()
        .with_timezone(&Utc)
}

fn payload(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap()
}

async fn run_local<F: Future>(future: F) -> F::Output {
    LocalSet::new().run_until(future).await
}

// Lets every runnable local task make progress
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[derive(Debug)]
struct FailingBus;

#[async_trait(?Send)]
impl MessageBus for FailingBus {
    async fn subscribe(&self, _patterns: &[Ustr]) -> anyhow::Result<Subscription> {
        anyhow::bail!("connection refused")
    }

    async fn unsubscribe(&self, _id: SubscriptionId) -> anyhow::Result<()> {
        Ok(())
    }

    async fn publish(&self, _channel: &str, _payload: &Payload) -> anyhow::Result<()> {
        anyhow::bail!("connection refused")
    }
}

#[derive(Debug, Default)]
struct ManualBus {
    tx: RefCell<Option<UnboundedSender<BusEvent>>>,
}

impl ManualBus {
    fn deliver(&self, pattern: &str, channel: &str, raw: &str) {
        let message = BusMessage {
            pattern: Ustr::from(pattern),
            channel: Ustr::from(channel),
            payload: raw.to_string(),
        };
        self.tx
            .borrow()
            .as_ref()
            .unwrap()
            .send(BusEvent::Message(message))
            .unwrap();
    }
}

#[async_trait(?Send)]
impl MessageBus for ManualBus {
    async fn subscribe(&self, _patterns: &[Ustr]) -> anyhow::Result<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.borrow_mut() = Some(tx);
        Ok(Subscription {
            id: SubscriptionId::new(1),
            events: rx,
        })
    }

    async fn unsubscribe(&self, _id: SubscriptionId) -> anyhow::Result<()> {
        if let Some(tx) = self.tx.borrow_mut().take() {
            let _ = tx.send(BusEvent::Closed);
        }
        Ok(())
    }

    async fn publish(&self, _channel: &str, _payload: &Payload) -> anyhow::Result<()> {
        Ok(())
    }
}

struct Harness {
    bus: InMemoryMessageBus,
    clock: Rc<TestClock>,
    runtime: ModuleRuntime,
}

// Built inside the paused runtime so the clock's instant shares tokio's virtual time base
fn harness() -> Harness {
    let bus = InMemoryMessageBus::new();
    let clock = Rc::new(TestClock::new(shanghai(9, 59, 30)));
    let runtime = ModuleRuntime::new("test", Rc::new(bus.clone()), clock.clone(), Shanghai);
    Harness {
        bus,
        clock,
        runtime,
    }
}

fn tick_recorder(
    ticks: &Rc<RefCell<Vec<CronTick>>>,
) -> impl Fn(CronTick) -> futures::future::Ready<anyhow::Result<()>> + 'static {
    let ticks = ticks.clone();
    move |tick| {
        ticks.borrow_mut().push(tick);
        futures::future::ready(Ok(()))
    }
}

fn event_recorder(
    events: &Rc<RefCell<Vec<ChannelEvent>>>,
) -> impl Fn(ChannelEvent) -> futures::future::Ready<anyhow::Result<()>> + 'static {
    let events = events.clone();
    move |event| {
        events.borrow_mut().push(event);
        futures::future::ready(Ok(()))
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_cron_job_fires_on_schedule_and_rearms() {
    run_local(async {
        let harness = harness();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let registry = CallbackRegistry::builder()
            .on_cron("minutely", "* * * * *", tick_recorder(&ticks))
            .build()
            .unwrap();

        assert!(harness.runtime.install(registry).await);
        assert_eq!(harness.runtime.state(), ModuleState::Installed);
        assert_eq!(harness.runtime.job_count(), 1);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(ticks.borrow().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ticks.borrow().len(), 1);
        assert_eq!(ticks.borrow()[0].scheduled_at, shanghai(10, 0, 0));
        assert_eq!(ticks.borrow()[0].expression.as_str(), "* * * * *");

        tokio::time::sleep(Duration::from_secs(60)).await;
        let scheduled: Vec<_> = ticks.borrow().iter().map(|t| t.scheduled_at).collect();
        assert_eq!(scheduled, vec![shanghai(10, 0, 0), shanghai(10, 1, 0)]);

        harness.runtime.uninstall().await;
    })
    .await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_wall_clock_jump_after_install_does_not_shift_schedule() {
    run_local(async {
        let harness = harness();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let registry = CallbackRegistry::builder()
            .on_cron("minutely", "* * * * *", tick_recorder(&ticks))
            .build()
            .unwrap();
        assert!(harness.runtime.install(registry).await);

        harness.clock.jump_wall(TimeDelta::hours(-1));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(ticks.borrow().len(), 1);
        assert_eq!(ticks.borrow()[0].scheduled_at, shanghai(10, 0, 0));
    })
    .await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_slow_handler_does_not_delay_next_fire() {
    run_local(async {
        let harness = harness();
        let started = Rc::new(RefCell::new(0usize));
        let counter = started.clone();
        let registry = CallbackRegistry::builder()
            .on_cron("slow", "* * * * *", move |_tick| {
                let counter = counter.clone();
                async move {
                    *counter.borrow_mut() += 1;
                    tokio::time::sleep(Duration::from_secs(300)).await;
                    Ok(())
                }
            })
            .build()
            .unwrap();
        assert!(harness.runtime.install(registry).await);

        tokio::time::sleep(Duration::from_secs(151)).await;
        assert_eq!(*started.borrow(), 3);
    })
    .await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_channel_messages_dispatched_to_bound_handler() {
    run_local(async {
        let harness = harness();
        let requests = Rc::new(RefCell::new(Vec::new()));
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let registry = CallbackRegistry::builder()
            .on_channel("on_request", "MSG:CTP:REQ:*", event_recorder(&requests))
            .on_channel("on_tick", "MSG:CTP:RSP:MARKET:*", event_recorder(&ticks))
            .build()
            .unwrap();
        assert!(harness.runtime.install(registry).await);
        assert_eq!(harness.runtime.subscription_count(), 2);
        assert_eq!(harness.bus.subscription_count(), 1);

        harness
            .bus
            .publish("MSG:CTP:REQ:ORDER", &payload(json!({"volume": 2})))
            .await
            .unwrap();
        harness
            .bus
            .publish("MSG:CTP:RSP:MARKET:rb2510", &payload(json!({"price": 3521.0})))
            .await
            .unwrap();
        harness
            .bus
            .publish("MSG:OTHER", &payload(json!({})))
            .await
            .unwrap();
        settle().await;

        let requests = requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].pattern.as_str(), "MSG:CTP:REQ:*");
        assert_eq!(requests[0].channel.as_str(), "MSG:CTP:REQ:ORDER");
        assert_eq!(requests[0].payload, payload(json!({"volume": 2})));

        let ticks = ticks.borrow();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].payload, payload(json!({"price": 3521.0})));
    })
    .await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_failing_and_panicking_handlers_are_isolated() {
    run_local(async {
        let harness = harness();
        let calls = Rc::new(RefCell::new(0usize));
        let counter = calls.clone();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let registry = CallbackRegistry::builder()
            .on_channel("flaky", "REQ:*", move |event| {
                let counter = counter.clone();
                async move {
                    *counter.borrow_mut() += 1;
                    match event.payload.get("mode").and_then(|v| v.as_str()) {
                        Some("error") => anyhow::bail!("store unavailable"),
                        Some("panic") => panic!("unexpected state"),
                        _ => Ok(()),
                    }
                }
            })
            .on_cron("minutely", "* * * * *", tick_recorder(&ticks))
            .build()
            .unwrap();
        assert!(harness.runtime.install(registry).await);

        for mode in ["error", "panic", "ok"] {
            harness
                .bus
                .publish("REQ:X", &payload(json!({"mode": mode})))
                .await
                .unwrap();
        }
        settle().await;
        assert_eq!(*calls.borrow(), 3);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(ticks.borrow().len(), 1);
        assert_eq!(harness.runtime.state(), ModuleState::Installed);
    })
    .await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_undecodable_payload_is_dropped() {
    run_local(async {
        let harness = harness();
        let events = Rc::new(RefCell::new(Vec::new()));
        let registry = CallbackRegistry::builder()
            .on_channel("on_request", "REQ:*", event_recorder(&events))
            .build()
            .unwrap();

        let bus = Rc::new(ManualBus::default());
        let runtime = ModuleRuntime::new("raw", bus.clone(), harness.clock.clone(), Shanghai);
        assert!(runtime.install(registry).await);

        bus.deliver("REQ:*", "REQ:A", "[1,2]");
        bus.deliver("REQ:*", "REQ:A", "{\"ok\":true}");
        settle().await;

        assert_eq!(events.borrow().len(), 1);
        assert_eq!(events.borrow()[0].payload, payload(json!({"ok": true})));
    })
    .await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_uninstall_cancels_timers_and_unsubscribes() {
    run_local(async {
        let harness = harness();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let events = Rc::new(RefCell::new(Vec::new()));
        let registry = CallbackRegistry::builder()
            .on_cron("minutely", "* * * * *", tick_recorder(&ticks))
            .on_channel("on_request", "REQ:*", event_recorder(&events))
            .build()
            .unwrap();
        assert!(harness.runtime.install(registry).await);

        harness.runtime.uninstall().await;
        assert_eq!(harness.runtime.state(), ModuleState::Uninstalled);
        assert_eq!(harness.runtime.job_count(), 0);
        assert_eq!(harness.runtime.subscription_count(), 0);
        assert_eq!(harness.bus.subscription_count(), 0);

        harness
            .bus
            .publish("REQ:A", &payload(json!({})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(ticks.borrow().is_empty());
        assert!(events.borrow().is_empty());

        // Idempotent
        harness.runtime.uninstall().await;
        assert_eq!(harness.runtime.state(), ModuleState::Uninstalled);
    })
    .await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_reinstall_after_uninstall() {
    run_local(async {
        let harness = harness();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let build = || {
            CallbackRegistry::builder()
                .on_cron("minutely", "* * * * *", tick_recorder(&ticks))
                .build()
                .unwrap()
        };

        assert!(harness.runtime.install(build()).await);
        harness.runtime.uninstall().await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        harness.clock.advance(Duration::from_secs(600));
        assert!(harness.runtime.install(build()).await);

        // New anchor is 10:09:30, next fire at 10:10:00
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(ticks.borrow().len(), 1);
        assert_eq!(ticks.borrow()[0].scheduled_at, shanghai(10, 10, 0));
    })
    .await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_install_twice_is_rejected() {
    run_local(async {
        let harness = harness();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let registry = CallbackRegistry::builder()
            .on_cron("minutely", "* * * * *", tick_recorder(&ticks))
            .build()
            .unwrap();

        assert!(harness.runtime.install(registry.clone()).await);
        assert!(!harness.runtime.install(registry).await);
        assert_eq!(harness.runtime.state(), ModuleState::Installed);
        assert_eq!(harness.runtime.job_count(), 1);
    })
    .await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_install_failure_leaves_module_uninstalled() {
    run_local(async {
        let harness = harness();
        let runtime =
            ModuleRuntime::new("broken", Rc::new(FailingBus), harness.clock.clone(), Shanghai);
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let events = Rc::new(RefCell::new(Vec::new()));
        let registry = CallbackRegistry::builder()
            .on_cron("minutely", "* * * * *", tick_recorder(&ticks))
            .on_channel("on_request", "REQ:*", event_recorder(&events))
            .build()
            .unwrap();

        assert!(!runtime.install(registry).await);
        assert_eq!(runtime.state(), ModuleState::Uninstalled);
        assert_eq!(runtime.job_count(), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(ticks.borrow().is_empty());
    })
    .await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_bus_close_stops_read_loop_but_not_timers() {
    run_local(async {
        let harness = harness();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let events = Rc::new(RefCell::new(Vec::new()));
        let registry = CallbackRegistry::builder()
            .on_cron("minutely", "* * * * *", tick_recorder(&ticks))
            .on_channel("on_request", "REQ:*", event_recorder(&events))
            .build()
            .unwrap();
        assert!(harness.runtime.install(registry).await);

        harness.bus.disconnect_all();
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(ticks.borrow().len(), 1);
        // Uninstall tolerates the already closed subscription
        harness.runtime.uninstall().await;
        assert_eq!(harness.runtime.state(), ModuleState::Uninstalled);
    })
    .await;
}

#[derive(Debug)]
struct EchoModule {
    runtime: ModuleRuntime,
    received: Rc<RefCell<Vec<ChannelEvent>>>,
}

#[async_trait(?Send)]
impl Module for EchoModule {
    fn name(&self) -> &str {
        "echo"
    }

    fn runtime(&self) -> &ModuleRuntime {
        &self.runtime
    }

    fn callbacks(&self) -> Result<CallbackRegistry, RegistryError> {
        CallbackRegistry::builder()
            .on_channel("on_request", "MSG:CTP:REQ:*", event_recorder(&self.received))
            .build()
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_module_lifecycle_and_process_event() {
    run_local(async {
        let harness = harness();
        let module = EchoModule {
            runtime: harness.runtime.clone(),
            received: Rc::new(RefCell::new(Vec::new())),
        };

        let event = ChannelEvent {
            pattern: Ustr::from("MSG:CTP:REQ:*"),
            channel: Ustr::from("MSG:CTP:REQ:PING"),
            payload: payload(json!({"seq": 1})),
        };
        assert!(!module.process_event(event.clone()));

        assert!(module.install().await);
        assert!(module.process_event(event.clone()));

        // Unknown pattern falls back to matching the channel
        let rerouted = ChannelEvent {
            pattern: Ustr::from("unknown"),
            ..event.clone()
        };
        assert!(module.process_event(rerouted));
        settle().await;
        assert_eq!(module.received.borrow().len(), 2);

        module.uninstall().await;
        assert!(!module.runtime().is_installed());
    })
    .await;
}
