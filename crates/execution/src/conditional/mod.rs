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

//! Provides the `ConditionalOrderEngine`.
//!
//! A conditional order waits until its conditions hold within its validity window, then places
//! its order, either at once or as iceberg slices. Every atom of an order is evaluated on each
//! sweep before the results are combined, so the outcome never depends on atom order.

pub mod condition;


use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    rc::Rc,
};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trader_common::{clock::Clock, store::EntityStore};
use trader_model::{
    enums::{Direction, OffsetFlag},
    identifiers::{AccountId, ConditionalOrderId, InstrumentId},
    order::OrderIntent,
};

use self::condition::{Comparison, Condition, ConditionLogic, EvalContext};
use crate::{
    config::ConditionalEngineConfig,
    market::PriceCache,
    placer::{OrderPlacer, place_or_log},
};

/// Slicing parameters for an iceberg order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcebergParams {
    /// The volume revealed per slice.
    pub display_volume: u64,
    /// The volume to place across all slices.
    pub total_volume: u64,
}

/// An order placed once its conditions hold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalOrder {
    pub intent: OrderIntent,
    pub conditions: Vec<Condition>,
    pub logic: ConditionLogic,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub iceberg: Option<IcebergParams>,
}

impl ConditionalOrder {
    /// Creates a new [`ConditionalOrder`] without conditions.
    #[must_use]
    pub fn new(intent: OrderIntent, logic: ConditionLogic) -> Self {
        Self {
            intent,
            conditions: Vec::new(),
            logic,
            valid_from: None,
            valid_until: None,
            iceberg: None,
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn with_validity(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_until = valid_until;
        self
    }

    #[must_use]
    pub fn with_iceberg(mut self, display_volume: u64, total_volume: u64) -> Self {
        self.iceberg = Some(IcebergParams {
            display_volume,
            total_volume,
        });
        self
    }

    /// Returns the volume the order places in total.
    #[must_use]
    pub fn total_volume(&self) -> u64 {
        self.iceberg
            .map_or(self.intent.volume, |iceberg| iceberg.total_volume)
    }

    /// Returns whether `now` lies inside the validity window (both ends inclusive).
    #[must_use]
    pub fn in_window(&self, now: DateTime<Utc>) -> bool {
        self.valid_from.is_none_or(|from| now >= from)
            && self.valid_until.is_none_or(|until| now <= until)
    }

    /// Evaluates every atom, then combines the results. Outside the validity window the order
    /// never holds.
    #[must_use]
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        if !self.in_window(ctx.now) {
            return false;
        }

        let results: Vec<bool> = self
            .conditions
            .iter()
            .map(|condition| condition.evaluate(ctx))
            .collect();
        self.logic.combine(&results)
    }

    /// Returns whether the validity window has ended before `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|until| now > until)
    }
}

/// A stop-limit order closing a position in `position_direction`.
///
/// A long position closes once the price falls to `stop_price`; a short once it rises to it.
#[must_use]
pub fn stop_limit_order(
    account_id: AccountId,
    instrument_id: InstrumentId,
    position_direction: Direction,
    stop_price: Decimal,
    limit_price: Decimal,
    volume: u64,
) -> ConditionalOrder {
    let comparison = match position_direction {
        Direction::Long => Comparison::Le,
        Direction::Short => Comparison::Ge,
    };

    let intent = OrderIntent::new(
        account_id,
        instrument_id,
        position_direction.closing(),
        OffsetFlag::Close,
        limit_price,
        volume,
    );

    ConditionalOrder::new(intent, ConditionLogic::And).with_condition(Condition::Price {
        instrument_id,
        comparison,
        value: stop_price,
    })
}

/// An opening iceberg order revealing `display_volume` at a time.
///
/// It carries no conditions, so it only runs when executed directly.
#[must_use]
pub fn iceberg_order(
    account_id: AccountId,
    instrument_id: InstrumentId,
    direction: Direction,
    price: Decimal,
    total_volume: u64,
    display_volume: u64,
) -> ConditionalOrder {
    let intent = OrderIntent::new(
        account_id,
        instrument_id,
        direction,
        OffsetFlag::Open,
        price,
        display_volume,
    );
    ConditionalOrder::new(intent, ConditionLogic::And).with_iceberg(display_volume, total_volume)
}

/// The engine's view of a registered conditional order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalOrderStatus {
    pub id: ConditionalOrderId,
    pub order: ConditionalOrder,
    pub is_active: bool,
    pub executing: bool,
    pub filled_volume: u64,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
}

impl ConditionalOrderStatus {
    #[must_use]
    pub const fn is_triggered(&self) -> bool {
        self.triggered_at.is_some()
    }

    /// Returns whether the order is still waiting for its conditions.
    #[must_use]
    pub const fn is_monitored(&self) -> bool {
        self.is_active && !self.is_triggered()
    }
}

/// Monitors conditional orders and places them when they trigger.
pub struct ConditionalOrderEngine {
    config: ConditionalEngineConfig,
    store: Rc<dyn EntityStore>,
    clock: Rc<dyn Clock>,
    prices: Rc<PriceCache>,
    placer: Rc<dyn OrderPlacer>,
    orders: RefCell<IndexMap<ConditionalOrderId, ConditionalOrderStatus>>,
    next_id: Cell<u64>,
}

impl Debug for ConditionalOrderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ConditionalOrderEngine))
            .field("config", &self.config)
            .field("orders", &self.orders.borrow().len())
            .finish()
    }
}

impl ConditionalOrderEngine {
    /// Creates a new [`ConditionalOrderEngine`] instance.
    #[must_use]
    pub fn new(
        config: ConditionalEngineConfig,
        store: Rc<dyn EntityStore>,
        clock: Rc<dyn Clock>,
        prices: Rc<PriceCache>,
        placer: Rc<dyn OrderPlacer>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            prices,
            placer,
            orders: RefCell::new(IndexMap::new()),
            next_id: Cell::new(1),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ConditionalEngineConfig {
        &self.config
    }

    /// Records the last price of `instrument_id` for price conditions.
    pub fn update_price(&self, instrument_id: InstrumentId, price: Decimal) {
        self.prices.update_price(instrument_id, price);
    }

    /// Registers `order`, returning its assigned ID.
    ///
    /// Returns `None` if the instrument is unknown or the order is malformed.
    pub fn create(&self, order: ConditionalOrder) -> Option<ConditionalOrderId> {
        let instrument_id = order.intent.instrument_id;
        if self.store.instrument(&instrument_id).is_none() {
            log::error!("Cannot create conditional order: instrument {instrument_id} not found");
            return None;
        }

        if let Some(iceberg) = order.iceberg
            && (iceberg.display_volume == 0 || iceberg.total_volume == 0)
        {
            log::error!("Cannot create iceberg order with {iceberg:?}");
            return None;
        }

        if let (Some(from), Some(until)) = (order.valid_from, order.valid_until)
            && until < from
        {
            log::error!("Cannot create conditional order valid from {from} until {until}");
            return None;
        }

        let seq = self.next_id.get();
        self.next_id.set(seq + 1);
        let id = ConditionalOrderId::new(format!("CO-{instrument_id}-{seq:04}"));

        log::info!(
            "Created conditional order {id}: {} ({} condition(s), {})",
            order.intent,
            order.conditions.len(),
            order.logic,
        );

        let status = ConditionalOrderStatus {
            id,
            order,
            is_active: true,
            executing: false,
            filled_volume: 0,
            created_at: self.clock.utc_now(),
            triggered_at: None,
        };
        self.orders.borrow_mut().insert(id, status);
        Some(id)
    }

    /// Removes the order `id`. An iceberg in progress stops before its next slice.
    pub fn cancel(&self, id: &ConditionalOrderId) -> bool {
        let removed = self.orders.borrow_mut().shift_remove(id).is_some();
        if removed {
            log::info!("Cancelled conditional order {id}");
        }
        removed
    }

    /// Deactivates the order `id` while keeping it visible. An iceberg in progress stops before
    /// its next slice.
    pub fn deactivate(&self, id: &ConditionalOrderId) -> bool {
        match self.orders.borrow_mut().get_mut(id) {
            Some(status) => {
                status.is_active = false;
                log::info!("Deactivated conditional order {id}");
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn status(&self, id: &ConditionalOrderId) -> Option<ConditionalOrderStatus> {
        self.orders.borrow().get(id).cloned()
    }

    /// Returns the orders still waiting for their conditions.
    #[must_use]
    pub fn active(&self) -> Vec<ConditionalOrderStatus> {
        self.orders
            .borrow()
            .values()
            .filter(|s| s.is_monitored())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.borrow().is_empty()
    }

    /// Evaluates `order` at the engine's current data.
    #[must_use]
    pub fn evaluate(&self, order: &ConditionalOrder, now: DateTime<Utc>) -> bool {
        let ctx = EvalContext {
            now,
            prices: &*self.prices,
            store: &*self.store,
            drawdown_lookback: self.config.drawdown_lookback,
        };
        order.evaluate(&ctx)
    }

    /// Purges finished and expired orders, then marks and returns the orders which now trigger.
    ///
    /// An order which triggered on an earlier sweep is purged once it is no longer executing.
    pub fn sweep(&self) -> Vec<ConditionalOrderStatus> {
        let now = self.clock.utc_now();
        let mut orders = self.orders.borrow_mut();

        orders.retain(|id, status| {
            if status.is_triggered() && !status.executing {
                log::debug!("Purging triggered conditional order {id}");
                return false;
            }
            if !status.is_triggered() && status.order.is_expired(now) {
                log::info!("Conditional order {id} expired");
                return false;
            }
            true
        });

        let mut triggered = Vec::new();
        for (id, status) in orders.iter_mut() {
            if !status.is_monitored() || !self.evaluate(&status.order, now) {
                continue;
            }

            status.triggered_at = Some(now);
            log::info!("Conditional order {id} triggered: {}", status.order.intent);
            triggered.push(status.clone());
        }

        triggered
    }

    /// Sweeps, then executes each triggered order as its own local task.
    ///
    /// Must be called from within a `tokio::task::LocalSet`.
    pub fn sweep_and_dispatch(self: &Rc<Self>) -> usize {
        let triggered = self.sweep();
        for status in &triggered {
            let engine = self.clone();
            let id = status.id;
            tokio::task::spawn_local(async move {
                engine.execute(&id).await;
            });
        }
        triggered.len()
    }

    /// Places the order `id`, slicing it when it is an iceberg.
    ///
    /// Marks the order triggered if a sweep has not already. Returns whether the full volume was
    /// placed.
    pub async fn execute(&self, id: &ConditionalOrderId) -> bool {
        let Some(order) = self.begin_execution(id) else {
            log::error!("Cannot execute conditional order {id}: not found, inactive or running");
            return false;
        };

        let placed = match order.iceberg {
            Some(iceberg) => self.run_iceberg(id, &order.intent, iceberg).await,
            None => {
                let intent = &order.intent;
                let accepted = place_or_log(
                    &*self.placer,
                    &intent.instrument_id,
                    intent.direction,
                    intent.price,
                    intent.volume,
                )
                .await;
                if accepted {
                    self.record_fill(id, intent.volume);
                }
                accepted
            }
        };

        if let Some(status) = self.orders.borrow_mut().get_mut(id) {
            status.executing = false;
        }
        placed
    }

    fn begin_execution(&self, id: &ConditionalOrderId) -> Option<ConditionalOrder> {
        let mut orders = self.orders.borrow_mut();
        let status = orders.get_mut(id)?;
        if !status.is_active || status.executing {
            return None;
        }

        status.executing = true;
        if status.triggered_at.is_none() {
            status.triggered_at = Some(self.clock.utc_now());
        }
        Some(status.order.clone())
    }

    fn is_live(&self, id: &ConditionalOrderId) -> bool {
        self.orders.borrow().get(id).is_some_and(|s| s.is_active)
    }

    fn record_fill(&self, id: &ConditionalOrderId, volume: u64) {
        if let Some(status) = self.orders.borrow_mut().get_mut(id) {
            status.filled_volume += volume;
        }
    }

    async fn run_iceberg(
        &self,
        id: &ConditionalOrderId,
        intent: &OrderIntent,
        iceberg: IcebergParams,
    ) -> bool {
        let interval = self.config.iceberg_interval();
        let mut remaining = iceberg.total_volume;

        log::info!(
            "Executing iceberg {id}: {} total, {} displayed",
            iceberg.total_volume,
            iceberg.display_volume
        );

        while remaining > 0 {
            if !self.is_live(id) {
                log::warn!("Iceberg {id} deactivated, abandoning {remaining} remaining");
                return false;
            }

            let volume = iceberg.display_volume.min(remaining);
            let accepted = place_or_log(
                &*self.placer,
                &intent.instrument_id,
                intent.direction,
                intent.price,
                volume,
            )
            .await;

            if !accepted {
                log::error!("Iceberg {id} slice of {volume} rejected, abandoning {remaining} remaining");
                return false;
            }

            self.record_fill(id, volume);
            remaining -= volume;

            if remaining > 0 {
                tokio::time::sleep(interval).await;
            }
        }

        log::info!("Iceberg {id} complete");
        true
    }
}
