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

//! Provides the `AlgoEngine` for sliced algorithmic execution.
//!
//! Three algorithms are supported:
//!
//! - **TWAP**: equal slices paced evenly across a time window.
//! - **VWAP**: slices proportional to a historical volume profile, one bucket per interval.
//!   Falls back to TWAP when no profile is available.
//! - **Snapshot**: a single placement of the full size at the touch.
//!
//! Each placement is clipped to the order's optional price limit. An order's status only moves
//! forward, except that cancellation is terminal from any non-terminal status.

pub mod slicing;


use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    rc::Rc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tokio::time::Instant;
use trader_common::clock::Clock;
use trader_model::{
    enums::Direction,
    identifiers::{AlgoOrderId, InstrumentId},
};

use self::slicing::{clip_price, twap_slices, vwap_slices};
use crate::{
    config::AlgoEngineConfig,
    market::MarketDataProvider,
    placer::{OrderPlacer, place_or_log},
};

/// The longest accepted TWAP window.
pub const MAX_TWAP_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// The algorithm driving an [`AlgoOrder`], with its own parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgoKind {
    /// Evenly paced slices across `duration`.
    Twap { duration: Duration },
    /// Slices following the last `lookback` buckets of the volume profile.
    Vwap { lookback: usize },
    /// One placement at the touch.
    Snapshot,
}

impl AlgoKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Twap { .. } => "TWAP",
            Self::Vwap { .. } => "VWAP",
            Self::Snapshot => "SNAPSHOT",
        }
    }
}

/// The execution status of an [`AlgoOrder`].
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Display,
    Hash,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlgoStatus {
    #[default]
    Pending,
    Running,
    /// Finished having placed only part of the volume.
    Partial,
    Completed,
    Cancelled,
    /// Finished without placing anything.
    Failed,
}

impl AlgoStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Partial | Self::Completed | Self::Cancelled | Self::Failed
        )
    }

    /// Moves the status to `next`.
    ///
    /// # Errors
    ///
    /// Returns an error if the move is not forward, or the status is already terminal.
    pub fn transition(self, next: Self) -> anyhow::Result<Self> {
        let valid = matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Partial | Self::Completed)
                | (Self::Pending | Self::Running, Self::Failed | Self::Cancelled)
        );
        if !valid {
            anyhow::bail!("Invalid algo status transition {self} -> {next}");
        }
        Ok(next)
    }

    /// Returns the status a run finishes with after placing `filled` of `total` lots.
    #[must_use]
    pub const fn from_fill(filled: u64, total: u64) -> Self {
        if filled >= total {
            Self::Completed
        } else if filled > 0 {
            Self::Partial
        } else {
            Self::Failed
        }
    }
}

/// An order executed by the [`AlgoEngine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlgoOrder {
    pub id: AlgoOrderId,
    pub kind: AlgoKind,
    pub instrument_id: InstrumentId,
    pub direction: Direction,
    pub total_volume: u64,
    /// The placed volume, never above `total_volume`.
    pub filled_volume: u64,
    pub price_limit: Option<Decimal>,
    pub status: AlgoStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl AlgoOrder {
    /// Returns the filled fraction of the total volume.
    #[must_use]
    pub fn fill_ratio(&self) -> Decimal {
        if self.total_volume == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.filled_volume) / Decimal::from(self.total_volume)
    }

    #[must_use]
    pub const fn remaining_volume(&self) -> u64 {
        self.total_volume - self.filled_volume
    }
}

/// Executes TWAP, VWAP and snapshot orders through an [`OrderPlacer`].
pub struct AlgoEngine {
    config: AlgoEngineConfig,
    clock: Rc<dyn Clock>,
    market: Rc<dyn MarketDataProvider>,
    placer: Rc<dyn OrderPlacer>,
    orders: RefCell<IndexMap<AlgoOrderId, AlgoOrder>>,
    next_id: Cell<u64>,
}

impl Debug for AlgoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(AlgoEngine))
            .field("config", &self.config)
            .field("orders", &self.orders.borrow().len())
            .finish()
    }
}

impl AlgoEngine {
    /// Creates a new [`AlgoEngine`] instance.
    #[must_use]
    pub fn new(
        config: AlgoEngineConfig,
        clock: Rc<dyn Clock>,
        market: Rc<dyn MarketDataProvider>,
        placer: Rc<dyn OrderPlacer>,
    ) -> Self {
        Self {
            config,
            clock,
            market,
            placer,
            orders: RefCell::new(IndexMap::new()),
            next_id: Cell::new(1),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AlgoEngineConfig {
        &self.config
    }

    /// Registers a pending order, returning its ID.
    ///
    /// Returns `None` for a zero volume, or a TWAP window that is empty or longer than
    /// [`MAX_TWAP_WINDOW`].
    pub fn create(
        &self,
        kind: AlgoKind,
        instrument_id: InstrumentId,
        direction: Direction,
        total_volume: u64,
        price_limit: Option<Decimal>,
    ) -> Option<AlgoOrderId> {
        if total_volume == 0 {
            log::error!("Cannot create {} order for {instrument_id}: zero volume", kind.name());
            return None;
        }
        if let AlgoKind::Twap { duration } = kind
            && duration.is_zero()
        {
            log::error!("Cannot create TWAP order for {instrument_id}: empty window");
            return None;
        }
        if let AlgoKind::Twap { duration } = kind
            && duration > MAX_TWAP_WINDOW
        {
            log::error!(
                "Cannot create TWAP order for {instrument_id}: window {}s exceeds {}s",
                duration.as_secs(),
                MAX_TWAP_WINDOW.as_secs()
            );
            return None;
        }

        let seq = self.next_id.get();
        self.next_id.set(seq + 1);
        let id = AlgoOrderId::new(format!("ALGO-{seq}"));

        let order = AlgoOrder {
            id,
            kind,
            instrument_id,
            direction,
            total_volume,
            filled_volume: 0,
            price_limit,
            status: AlgoStatus::Pending,
            created_at: self.clock.utc_now(),
            started_at: None,
            finished_at: None,
        };
        self.orders.borrow_mut().insert(id, order);
        Some(id)
    }

    /// Creates and runs a TWAP order to completion, over the default window if none is given.
    pub async fn twap(
        &self,
        instrument_id: InstrumentId,
        direction: Direction,
        volume: u64,
        duration: Option<Duration>,
        price_limit: Option<Decimal>,
    ) -> Option<AlgoOrderId> {
        let duration = duration.unwrap_or_else(|| self.config.default_duration());
        let kind = AlgoKind::Twap { duration };
        self.create_and_execute(kind, instrument_id, direction, volume, price_limit)
            .await
    }

    /// Creates and runs a VWAP order to completion.
    pub async fn vwap(
        &self,
        instrument_id: InstrumentId,
        direction: Direction,
        volume: u64,
        price_limit: Option<Decimal>,
    ) -> Option<AlgoOrderId> {
        let kind = AlgoKind::Vwap {
            lookback: self.config.vwap_lookback,
        };
        self.create_and_execute(kind, instrument_id, direction, volume, price_limit)
            .await
    }

    /// Creates and runs a snapshot order.
    pub async fn snapshot(
        &self,
        instrument_id: InstrumentId,
        direction: Direction,
        volume: u64,
        price_limit: Option<Decimal>,
    ) -> Option<AlgoOrderId> {
        self.create_and_execute(
            AlgoKind::Snapshot,
            instrument_id,
            direction,
            volume,
            price_limit,
        )
        .await
    }

    async fn create_and_execute(
        &self,
        kind: AlgoKind,
        instrument_id: InstrumentId,
        direction: Direction,
        volume: u64,
        price_limit: Option<Decimal>,
    ) -> Option<AlgoOrderId> {
        let id = self.create(kind, instrument_id, direction, volume, price_limit)?;
        self.execute(&id).await;
        Some(id)
    }

    /// Runs the pending order `id`, returning whether it completed.
    pub async fn execute(&self, id: &AlgoOrderId) -> bool {
        let Some(order) = self.begin(id) else {
            log::error!("Cannot execute algo order {id}: not found or not pending");
            return false;
        };

        log::info!(
            "Starting {} {id}: {} {} x{}{}",
            order.kind.name(),
            order.direction,
            order.instrument_id,
            order.total_volume,
            order
                .price_limit
                .map(|limit| format!(" limit {limit}"))
                .unwrap_or_default(),
        );

        match order.kind {
            AlgoKind::Twap { duration } => self.run_twap(&order, duration).await,
            AlgoKind::Vwap { lookback } => self.run_vwap(&order, lookback).await,
            AlgoKind::Snapshot => self.run_snapshot(&order).await,
        }

        self.finish(id) == AlgoStatus::Completed
    }

    /// Cancels the order `id`. A running order stops before its next slice.
    pub fn cancel(&self, id: &AlgoOrderId) -> bool {
        let mut orders = self.orders.borrow_mut();
        let Some(order) = orders.get_mut(id) else {
            return false;
        };

        match order.status.transition(AlgoStatus::Cancelled) {
            Ok(status) => {
                order.status = status;
                log::info!(
                    "Cancelled algo order {id} at {}/{}",
                    order.filled_volume,
                    order.total_volume
                );
                true
            }
            Err(e) => {
                log::warn!("Cannot cancel algo order {id}: {e}");
                false
            }
        }
    }

    /// Returns the price a `direction` order would meet now: the touch when a book is known,
    /// otherwise the last price.
    #[must_use]
    pub fn market_price(
        &self,
        instrument_id: &InstrumentId,
        direction: Direction,
    ) -> Option<Decimal> {
        self.market
            .book_top(instrument_id)
            .map(|book| book.touch_price(direction))
            .or_else(|| self.market.last_price(instrument_id))
    }

    #[must_use]
    pub fn status(&self, id: &AlgoOrderId) -> Option<AlgoOrder> {
        self.orders.borrow().get(id).cloned()
    }

    #[must_use]
    pub fn orders(&self) -> Vec<AlgoOrder> {
        self.orders.borrow().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.borrow().is_empty()
    }

    fn begin(&self, id: &AlgoOrderId) -> Option<AlgoOrder> {
        let mut orders = self.orders.borrow_mut();
        let order = orders.get_mut(id)?;
        order.status = order.status.transition(AlgoStatus::Running).ok()?;
        order.started_at = Some(self.clock.loop_now());
        Some(order.clone())
    }

    fn finish(&self, id: &AlgoOrderId) -> AlgoStatus {
        let mut orders = self.orders.borrow_mut();
        let Some(order) = orders.get_mut(id) else {
            return AlgoStatus::Failed;
        };

        order.finished_at = Some(self.clock.loop_now());
        if order.status == AlgoStatus::Running {
            let next = AlgoStatus::from_fill(order.filled_volume, order.total_volume);
            if let Ok(status) = order.status.transition(next) {
                order.status = status;
            }
        }

        log::info!(
            "{} {id} finished {}: {}/{}",
            order.kind.name(),
            order.status,
            order.filled_volume,
            order.total_volume
        );
        order.status
    }

    fn is_running(&self, id: &AlgoOrderId) -> bool {
        self.orders
            .borrow()
            .get(id)
            .is_some_and(|o| o.status == AlgoStatus::Running)
    }

    fn record_fill(&self, id: &AlgoOrderId, volume: u64) {
        if let Some(order) = self.orders.borrow_mut().get_mut(id) {
            order.filled_volume = (order.filled_volume + volume).min(order.total_volume);
        }
    }

    // Places one slice at the last price, or at the limit when no price is known.
    async fn place_slice(&self, order: &AlgoOrder, volume: u64) -> bool {
        let Some(reference) = self
            .market
            .last_price(&order.instrument_id)
            .or(order.price_limit)
        else {
            log::warn!("{}: no price for {}, skipping slice", order.id, order.instrument_id);
            return false;
        };

        let price = clip_price(order.direction, reference, order.price_limit);
        let accepted = place_or_log(
            &*self.placer,
            &order.instrument_id,
            order.direction,
            price,
            volume,
        )
        .await;

        if accepted {
            self.record_fill(&order.id, volume);
        }
        accepted
    }

    async fn run_twap(&self, order: &AlgoOrder, duration: Duration) {
        let slices = twap_slices(
            order.total_volume,
            duration.as_secs(),
            self.config.slice_interval_secs,
        );
        let Some(deadline) = self.clock.loop_now().checked_add(duration) else {
            log::error!("TWAP {}: window {}s out of range", order.id, duration.as_secs());
            return;
        };
        let pause = duration / u32::try_from(slices.len()).unwrap_or(u32::MAX).max(1);

        for (i, volume) in slices.iter().enumerate() {
            if !self.is_running(&order.id) {
                break;
            }
            if self.clock.loop_now() >= deadline {
                log::warn!("TWAP {}: window elapsed after {i} slice(s)", order.id);
                break;
            }

            let accepted = self.place_slice(order, *volume).await;
            log::info!(
                "TWAP {} [{}/{}]: {volume} {}",
                order.id,
                i + 1,
                slices.len(),
                if accepted { "placed" } else { "failed" },
            );

            if i + 1 < slices.len() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    async fn run_vwap(&self, order: &AlgoOrder, lookback: usize) {
        let profile = self.market.volume_profile(&order.instrument_id, lookback);
        let Some(slices) = vwap_slices(order.total_volume, &profile) else {
            log::warn!("VWAP {}: no volume profile, falling back to TWAP", order.id);
            self.run_twap(order, self.config.default_duration()).await;
            return;
        };

        let interval = self.config.slice_interval();
        for (i, volume) in slices.iter().enumerate() {
            if !self.is_running(&order.id) {
                break;
            }

            if *volume > 0 {
                let accepted = self.place_slice(order, *volume).await;
                log::info!(
                    "VWAP {} bucket {}/{}: {volume} {}",
                    order.id,
                    i + 1,
                    slices.len(),
                    if accepted { "placed" } else { "failed" },
                );
            }

            if i + 1 < slices.len() {
                tokio::time::sleep(interval).await;
            }
        }
    }

    async fn run_snapshot(&self, order: &AlgoOrder) {
        let Some(book) = self.market.book_top(&order.instrument_id) else {
            log::warn!("Snapshot {}: no book for {}", order.id, order.instrument_id);
            return;
        };

        if order.total_volume > book.opposing_volume(order.direction) {
            log::info!(
                "Snapshot {}: {} exceeds visible depth {}, sending full size at the touch",
                order.id,
                order.total_volume,
                book.opposing_volume(order.direction)
            );
        }

        let price = clip_price(
            order.direction,
            book.touch_price(order.direction),
            order.price_limit,
        );
        let accepted = place_or_log(
            &*self.placer,
            &order.instrument_id,
            order.direction,
            price,
            order.total_volume,
        )
        .await;

        if accepted {
            self.record_fill(&order.id, order.total_volume);
        }
    }
}
