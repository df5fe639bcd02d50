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

//! The per-module event loop: channel subscriptions, cron timers and dispatch.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt::Debug,
    panic::AssertUnwindSafe,
    rc::{Rc, Weak},
};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::FutureExt;
use indexmap::IndexMap;
use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
use ustr::Ustr;

use super::state::{ModuleState, ModuleTrigger};
use crate::{
    clock::Clock,
    cron::{CronAnchor, CronCursor},
    msgbus::{
        BusEvent, BusMessage, MessageBus, Payload, SubscriptionId, decode_payload,
        matching::is_matching,
    },
    registry::{
        Callback, CallbackRegistry, ChannelEvent, ChannelHandler, CronHandler, CronTick,
        HandlerFuture,
    },
};

struct ChannelSubscription {
    name: Ustr,
    handler: ChannelHandler,
}

struct ScheduledJob {
    name: Ustr,
    cursor: CronCursor,
    timer: Option<JoinHandle<()>>,
    handler: CronHandler,
}

#[derive(Default)]
struct RoutingTables {
    anchor: Option<CronAnchor>,
    channels: IndexMap<Ustr, ChannelSubscription>,
    jobs: IndexMap<Ustr, ScheduledJob>,
    subscription: Option<SubscriptionId>,
    reader: Option<JoinHandle<()>>,
}

struct RuntimeInner {
    name: Ustr,
    bus: Rc<dyn MessageBus>,
    clock: Rc<dyn Clock>,
    tz: Tz,
    state: Cell<ModuleState>,
    generation: Cell<u64>,
    tables: RefCell<RoutingTables>,
}

/// Owns one module's routing tables and drives its callbacks on the current `LocalSet`.
///
/// Cron deadlines are computed once per fire from the anchor captured at install:
/// `deadline = anchor.instant + (next_fire_wall - anchor.wall)`, so later wall-clock adjustments
/// do not shift the schedule. Every handler invocation runs as its own local task; failures and
/// panics are logged at the dispatch boundary and never stop the read loop or other timers.
///
/// Handles are cheap to clone and share the same tables. They must not cross threads.
#[derive(Clone)]
pub struct ModuleRuntime {
    inner: Rc<RuntimeInner>,
}

impl Debug for ModuleRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ModuleRuntime))
            .field("name", &self.inner.name)
            .field("state", &self.inner.state.get())
            .field("tz", &self.inner.tz)
            .finish_non_exhaustive()
    }
}

impl ModuleRuntime {
    /// Creates a new uninstalled [`ModuleRuntime`] evaluating cron schedules in `tz`.
    #[must_use]
    pub fn new(name: &str, bus: Rc<dyn MessageBus>, clock: Rc<dyn Clock>, tz: Tz) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                name: Ustr::from(name),
                bus,
                clock,
                tz,
                state: Cell::new(ModuleState::Uninstalled),
                generation: Cell::new(0),
                tables: RefCell::new(RoutingTables::default()),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> Ustr {
        self.inner.name
    }

    #[must_use]
    pub fn state(&self) -> ModuleState {
        self.inner.state.get()
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.inner.state.get() == ModuleState::Installed
    }

    #[must_use]
    pub fn clock(&self) -> Rc<dyn Clock> {
        self.inner.clock.clone()
    }

    #[must_use]
    pub fn bus(&self) -> Rc<dyn MessageBus> {
        self.inner.bus.clone()
    }

    /// Returns the number of armed cron jobs.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.inner.tables.borrow().jobs.len()
    }

    /// Returns the number of bound channel patterns.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.tables.borrow().channels.len()
    }

    /// Installs the callbacks of `registry`.
    ///
    /// Captures the cron anchor, subscribes to the union of channel patterns, starts the read
    /// loop and arms the first timer of every job. Must be called from within a `LocalSet`.
    ///
    /// Returns `false` (after logging) if the runtime is not uninstalled or any step fails; in
    /// that case the runtime is left uninstalled with nothing subscribed or armed.
    pub async fn install(&self, registry: CallbackRegistry) -> bool {
        let inner = &self.inner;
        if let Err(e) = inner.transition(ModuleTrigger::Install) {
            log::error!("{}: cannot install: {e}", inner.name);
            return false;
        }

        match RuntimeInner::install_callbacks(inner, &registry).await {
            Ok(()) => {
                inner.apply(ModuleTrigger::InstallCompleted);
                log::info!(
                    "{}: installed {} channel pattern(s) and {} cron job(s)",
                    inner.name,
                    self.subscription_count(),
                    self.job_count(),
                );
                true
            }
            Err(e) => {
                log::error!("{}: install failed: {e:#}", inner.name);
                RuntimeInner::release(inner).await;
                inner.apply(ModuleTrigger::InstallFailed);
                false
            }
        }
    }

    /// Unsubscribes all channels, cancels pending timers and clears the routing tables.
    ///
    /// In-flight handler tasks are left to finish. Calling this on an uninstalled runtime is a
    /// no-op.
    pub async fn uninstall(&self) {
        let inner = &self.inner;
        if inner.state.get() == ModuleState::Uninstalled {
            log::debug!("{}: already uninstalled", inner.name);
            return;
        }
        if let Err(e) = inner.transition(ModuleTrigger::Uninstall) {
            log::warn!("{}: cannot uninstall: {e}", inner.name);
            return;
        }

        RuntimeInner::release(inner).await;
        inner.apply(ModuleTrigger::UninstallCompleted);
        log::info!("{}: uninstalled", inner.name);
    }

    /// Dispatches `event` to the handler bound to its pattern (or the first pattern matching its
    /// channel), as if it had arrived from the bus.
    ///
    /// Returns whether a handler was dispatched.
    pub fn process_event(&self, event: ChannelEvent) -> bool {
        if !self.inner.state.get().is_active() {
            log::warn!(
                "{}: ignoring event on {} while {}",
                self.inner.name,
                event.channel,
                self.inner.state.get(),
            );
            return false;
        }
        self.inner.dispatch_channel(event)
    }

    /// Publishes `payload` on `channel` through the runtime's bus.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus fails to publish.
    pub async fn publish(&self, channel: &str, payload: &Payload) -> anyhow::Result<()> {
        self.inner.bus.publish(channel, payload).await
    }
}

impl RuntimeInner {
    fn transition(&self, trigger: ModuleTrigger) -> anyhow::Result<()> {
        let new_state = self.state.get().transition(trigger)?;
        log::debug!("{}: {} -> {new_state}", self.name, self.state.get());
        self.state.set(new_state);
        Ok(())
    }

    fn apply(&self, trigger: ModuleTrigger) {
        if let Err(e) = self.transition(trigger) {
            log::error!("{}: {e}", self.name);
        }
    }

    async fn install_callbacks(
        inner: &Rc<Self>,
        registry: &CallbackRegistry,
    ) -> anyhow::Result<()> {
        let anchor = CronAnchor::capture(inner.clock.as_ref());

        {
            let mut tables = inner.tables.borrow_mut();
            tables.anchor = Some(anchor);

            for descriptor in registry.descriptors() {
                match &descriptor.callback {
                    Callback::Channel { pattern, handler } => {
                        tables.channels.insert(
                            *pattern,
                            ChannelSubscription {
                                name: descriptor.name,
                                handler: handler.clone(),
                            },
                        );
                    }
                    Callback::Cron { schedule, handler } => {
                        tables.jobs.insert(
                            schedule.expression(),
                            ScheduledJob {
                                name: descriptor.name,
                                cursor: CronCursor::new(schedule.clone(), inner.tz, anchor.wall()),
                                timer: None,
                                handler: handler.clone(),
                            },
                        );
                    }
                }
            }
        }

        let patterns = registry.patterns();
        if !patterns.is_empty() {
            let subscription = inner.bus.subscribe(&patterns).await?;
            let reader = tokio::task::spawn_local(read_loop(
                inner.name,
                Rc::downgrade(inner),
                subscription.events,
            ));
            let mut tables = inner.tables.borrow_mut();
            tables.subscription = Some(subscription.id);
            tables.reader = Some(reader);
        }

        let expressions: Vec<Ustr> = inner.tables.borrow().jobs.keys().copied().collect();
        for expression in expressions {
            Self::arm_job(inner, expression);
        }

        Ok(())
    }

    async fn release(inner: &Rc<Self>) {
        inner.generation.set(inner.generation.get() + 1);
        let tables = std::mem::take(&mut *inner.tables.borrow_mut());

        for job in tables.jobs.into_values() {
            if let Some(timer) = job.timer {
                timer.abort();
            }
        }

        if let Some(id) = tables.subscription
            && let Err(e) = inner.bus.unsubscribe(id).await
        {
            log::error!("{}: failed to unsubscribe {id}: {e:#}", inner.name);
            if let Some(reader) = tables.reader {
                reader.abort();
            }
        }
    }

    // Arms the next fire of `expression`; any previously armed timer for it is cancelled first.
    fn arm_job(inner: &Rc<Self>, expression: Ustr) {
        let mut tables = inner.tables.borrow_mut();
        let Some(anchor) = tables.anchor else {
            return;
        };
        let Some(job) = tables.jobs.get_mut(&expression) else {
            return;
        };

        if let Some(stale) = job.timer.take() {
            stale.abort();
        }

        let Some(fire_at) = job.cursor.advance() else {
            log::warn!(
                "{}: schedule '{expression}' has no further fire times",
                inner.name
            );
            return;
        };

        let deadline = anchor.deadline(fire_at);
        let generation = inner.generation.get();
        let runtime = Rc::downgrade(inner);

        job.timer = Some(tokio::task::spawn_local(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = runtime.upgrade() {
                Self::on_timer(&inner, generation, expression, fire_at);
            }
        }));
    }

    fn on_timer(inner: &Rc<Self>, generation: u64, expression: Ustr, fire_at: DateTime<Utc>) {
        if generation != inner.generation.get() || !inner.state.get().is_active() {
            return;
        }

        let (name, handler) = {
            let mut tables = inner.tables.borrow_mut();
            let Some(job) = tables.jobs.get_mut(&expression) else {
                return;
            };
            // The running task is this timer; detach rather than abort it
            job.timer = None;
            (job.name, job.handler.clone())
        };

        Self::arm_job(inner, expression);

        let tick = CronTick {
            expression,
            scheduled_at: fire_at,
        };
        dispatch(inner.name, name, format!("cron '{expression}'"), handler(tick));
    }

    fn route(&self, message: BusMessage) {
        let payload = match decode_payload(&message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!(
                    "{}: dropping undecodable message on {}: {e}",
                    self.name,
                    message.channel
                );
                return;
            }
        };

        self.dispatch_channel(ChannelEvent {
            pattern: message.pattern,
            channel: message.channel,
            payload,
        });
    }

    fn dispatch_channel(&self, event: ChannelEvent) -> bool {
        let found = {
            let tables = self.tables.borrow();
            tables
                .channels
                .get(&event.pattern)
                .or_else(|| {
                    tables
                        .channels
                        .iter()
                        .find(|(pattern, _)| is_matching(&event.channel, pattern))
                        .map(|(_, subscription)| subscription)
                })
                .map(|subscription| (subscription.name, subscription.handler.clone()))
        };

        let Some((name, handler)) = found else {
            log::warn!(
                "{}: no handler bound for {} (pattern {})",
                self.name,
                event.channel,
                event.pattern
            );
            return false;
        };

        let trigger = format!("channel '{}'", event.channel);
        dispatch(self.name, name, trigger, handler(event));
        true
    }
}

async fn read_loop(
    module: Ustr,
    runtime: Weak<RuntimeInner>,
    mut events: UnboundedReceiver<BusEvent>,
) {
    while let Some(event) = events.recv().await {
        let BusEvent::Message(message) = event else {
            break;
        };
        let Some(inner) = runtime.upgrade() else {
            break;
        };
        if inner.state.get().is_active() {
            inner.route(message);
        }
    }

    match runtime.upgrade() {
        Some(inner) if inner.state.get() == ModuleState::Installed => {
            log::warn!("{module}: subscription closed while installed");
        }
        _ => log::debug!("{module}: read loop stopped"),
    }
}

fn dispatch(module: Ustr, handler: Ustr, trigger: String, future: HandlerFuture) {
    tokio::task::spawn_local(async move {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("{module}: handler '{handler}' failed on {trigger}: {e:#}");
            }
            Err(panic) => {
                log::error!(
                    "{module}: handler '{handler}' panicked on {trigger}: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
