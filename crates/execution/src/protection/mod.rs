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

//! Provides the protective order `StopEngine`.
//!
//! Each open position may carry at most one protective order, either a stop-loss or a
//! take-profit. Registering again for the same position replaces the previous order entirely.
//! The engine is polled with a price snapshot and reports trigger records; it never places
//! orders itself.


use std::{cell::RefCell, fmt::Debug, rc::Rc};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use trader_common::{clock::Clock, store::EntityStore};
use trader_model::{
    enums::Direction,
    identifiers::{InstrumentId, PositionId},
};

use crate::{
    config::StopEngineConfig,
    trailing::{TrailingOffset, trailing_stop_price, update_extreme},
};

/// Whether a protective order limits a loss or locks in a profit.
#[derive(
    Copy, Clone, Debug, Display, Hash, PartialEq, Eq, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtectionSide {
    StopLoss,
    TakeProfit,
}

/// How the trigger level of a protective order is defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopKind {
    /// A fixed trigger price.
    FixedPrice(Decimal),
    /// A fraction away from the entry price, fixed at registration.
    ///
    /// `None` uses the configured default for the side.
    Percentage(Option<Decimal>),
    /// A stop following the most favorable price seen. Stop-loss only.
    Trailing(TrailingOffset),
    /// A multiple of the average true range away from the entry price, fixed at registration.
    Atr { atr: Decimal, multiple: Decimal },
    /// Exit once the wall clock reaches the given time, whatever the price.
    Time(DateTime<Utc>),
}

impl StopKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FixedPrice(_) => "FIXED_PRICE",
            Self::Percentage(_) => "PERCENTAGE",
            Self::Trailing(_) => "TRAILING",
            Self::Atr { .. } => "ATR",
            Self::Time(_) => "TIME",
        }
    }
}

/// The live trigger rule derived from a [`StopKind`] at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopRule {
    Threshold(Decimal),
    Trailing {
        offset: TrailingOffset,
        extreme: Decimal,
    },
    Time(DateTime<Utc>),
}

/// A protective order attached to one position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopOrder {
    pub position_id: PositionId,
    pub instrument_id: InstrumentId,
    /// The direction of the protected position.
    pub direction: Direction,
    pub side: ProtectionSide,
    pub kind: StopKind,
    pub rule: StopRule,
    pub tick_size: Decimal,
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StopOrder {
    /// Returns the current trigger price, or `None` for a time exit.
    #[must_use]
    pub fn stop_price(&self) -> Option<Decimal> {
        match self.rule {
            StopRule::Threshold(price) => Some(price),
            StopRule::Trailing { offset, extreme } => Some(trailing_stop_price(
                self.direction,
                offset,
                extreme,
                self.tick_size,
            )),
            StopRule::Time(_) => None,
        }
    }

    /// Returns the most favorable price seen by a trailing stop.
    #[must_use]
    pub const fn extreme(&self) -> Option<Decimal> {
        match self.rule {
            StopRule::Trailing { extreme, .. } => Some(extreme),
            _ => None,
        }
    }

    // Updates the trailing extreme then returns whether the order should fire
    fn observe(&mut self, price: Option<Decimal>, now: DateTime<Utc>) -> bool {
        match self.rule {
            StopRule::Time(exit_at) => now >= exit_at,
            StopRule::Threshold(threshold) => {
                price.is_some_and(|p| crosses(self.side, self.direction, p, threshold))
            }
            StopRule::Trailing { offset, extreme } => {
                let Some(price) = price else {
                    return false;
                };

                let extreme_new = update_extreme(self.direction, extreme, price);
                if extreme_new != extreme {
                    self.rule = StopRule::Trailing {
                        offset,
                        extreme: extreme_new,
                    };
                    self.updated_at = now;
                }

                let stop = trailing_stop_price(self.direction, offset, extreme_new, self.tick_size);
                crosses(self.side, self.direction, price, stop)
            }
        }
    }
}

/// Reports a protective order which fired during a sweep.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopTrigger {
    pub position_id: PositionId,
    pub instrument_id: InstrumentId,
    pub direction: Direction,
    pub side: ProtectionSide,
    pub kind: StopKind,
    pub current_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub triggered_at: DateTime<Utc>,
}

// Returns +1 when the trigger sits above the entry, -1 when below
fn trigger_sign(side: ProtectionSide, direction: Direction) -> Decimal {
    match (side, direction) {
        (ProtectionSide::StopLoss, Direction::Long)
        | (ProtectionSide::TakeProfit, Direction::Short) => Decimal::NEGATIVE_ONE,
        (ProtectionSide::StopLoss, Direction::Short)
        | (ProtectionSide::TakeProfit, Direction::Long) => Decimal::ONE,
    }
}

fn crosses(side: ProtectionSide, direction: Direction, price: Decimal, threshold: Decimal) -> bool {
    if trigger_sign(side, direction).is_sign_negative() {
        price <= threshold
    } else {
        price >= threshold
    }
}

/// Supervises stop-loss and take-profit orders for open positions.
pub struct StopEngine {
    config: StopEngineConfig,
    store: Rc<dyn EntityStore>,
    clock: Rc<dyn Clock>,
    orders: RefCell<IndexMap<PositionId, StopOrder>>,
}

impl Debug for StopEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(StopEngine))
            .field("config", &self.config)
            .field("orders", &self.orders.borrow().len())
            .finish()
    }
}

impl StopEngine {
    /// Creates a new [`StopEngine`] instance.
    #[must_use]
    pub fn new(
        config: StopEngineConfig,
        store: Rc<dyn EntityStore>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            orders: RefCell::new(IndexMap::new()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &StopEngineConfig {
        &self.config
    }

    /// Registers a stop-loss for `position_id`, replacing any existing protective order.
    ///
    /// Returns `false` if the position is unknown or closed, or the parameters are invalid.
    pub fn register_stop(&self, position_id: &PositionId, kind: StopKind) -> bool {
        self.register(position_id, ProtectionSide::StopLoss, kind)
    }

    /// Registers a take-profit for `position_id`, replacing any existing protective order.
    ///
    /// Returns `false` if the position is unknown or closed, the parameters are invalid, or
    /// `kind` is a trailing stop.
    pub fn register_take_profit(&self, position_id: &PositionId, kind: StopKind) -> bool {
        self.register(position_id, ProtectionSide::TakeProfit, kind)
    }

    fn register(&self, position_id: &PositionId, side: ProtectionSide, kind: StopKind) -> bool {
        let Some(position) = self.store.position(position_id).filter(|p| p.is_open()) else {
            log::error!("Cannot register {side}: position {position_id} not found or closed");
            return false;
        };

        let Some(instrument) = self.store.instrument(&position.instrument_id) else {
            log::error!(
                "Cannot register {side}: instrument {} not found",
                position.instrument_id
            );
            return false;
        };

        let entry = position.avg_open_price;
        let sign = trigger_sign(side, position.direction);

        let (kind, rule) = match kind {
            StopKind::FixedPrice(price) => (kind, StopRule::Threshold(price)),
            StopKind::Percentage(pct) => {
                let pct = pct.unwrap_or(match side {
                    ProtectionSide::StopLoss => self.config.default_stop_loss_pct,
                    ProtectionSide::TakeProfit => self.config.default_take_profit_pct,
                });
                if pct <= Decimal::ZERO {
                    log::error!("Cannot register {side} for {position_id}: invalid percentage {pct}");
                    return false;
                }
                let threshold = entry * (Decimal::ONE + sign * pct);
                (StopKind::Percentage(Some(pct)), StopRule::Threshold(threshold))
            }
            StopKind::Atr { atr, multiple } => {
                if atr <= Decimal::ZERO || multiple <= Decimal::ZERO {
                    log::error!("Cannot register {side} for {position_id}: invalid ATR {atr} x {multiple}");
                    return false;
                }
                (kind, StopRule::Threshold(entry + sign * atr * multiple))
            }
            StopKind::Trailing(offset) => {
                if side == ProtectionSide::TakeProfit {
                    log::error!("Trailing take-profit is not supported for {position_id}");
                    return false;
                }
                (
                    kind,
                    StopRule::Trailing {
                        offset,
                        extreme: entry,
                    },
                )
            }
            StopKind::Time(exit_at) => (kind, StopRule::Time(exit_at)),
        };

        let now = self.clock.utc_now();
        let order = StopOrder {
            position_id: *position_id,
            instrument_id: position.instrument_id,
            direction: position.direction,
            side,
            kind,
            rule,
            tick_size: instrument.tick_size,
            triggered: false,
            created_at: now,
            updated_at: now,
        };

        log::info!(
            "Registered {side} {} for {position_id} ({} {}), stop_price={:?}",
            kind.name(),
            position.direction,
            position.instrument_id,
            order.stop_price(),
        );

        if let Some(previous) = self.orders.borrow_mut().insert(*position_id, order) {
            log::debug!(
                "Replaced {} {} for {position_id}",
                previous.side,
                previous.kind.name()
            );
        }
        true
    }

    /// Removes the protective order for `position_id`, returning whether one existed.
    pub fn cancel(&self, position_id: &PositionId) -> bool {
        let removed = self.orders.borrow_mut().shift_remove(position_id).is_some();
        if removed {
            log::info!("Cancelled protective order for {position_id}");
        }
        removed
    }

    /// Returns the protective order for `position_id`.
    #[must_use]
    pub fn status(&self, position_id: &PositionId) -> Option<StopOrder> {
        self.orders.borrow().get(position_id).cloned()
    }

    /// Returns every protective order in registration order.
    #[must_use]
    pub fn all(&self) -> Vec<StopOrder> {
        self.orders.borrow().values().cloned().collect()
    }

    /// Removes every protective order, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut orders = self.orders.borrow_mut();
        let count = orders.len();
        orders.clear();
        log::info!("Cleared {count} protective order(s)");
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.borrow().is_empty()
    }

    /// Checks every protective order against `prices` and returns the ones which fired.
    ///
    /// Orders which fired on a previous sweep are dropped first, as are orders whose position has
    /// closed (without firing). An order fires at most once.
    pub fn check_and_trigger(&self, prices: &AHashMap<InstrumentId, Decimal>) -> Vec<StopTrigger> {
        let now = self.clock.utc_now();
        let mut triggers = Vec::new();
        let mut orders = self.orders.borrow_mut();

        orders.retain(|position_id, order| {
            if order.triggered {
                log::debug!("Removing fired {} for {position_id}", order.side);
                return false;
            }

            let is_open = self
                .store
                .position(position_id)
                .is_some_and(|p| p.is_open());
            if !is_open {
                log::info!(
                    "Position {position_id} closed externally, discarding {}",
                    order.side
                );
                return false;
            }

            let price = prices.get(&order.instrument_id).copied();
            if order.observe(price, now) {
                order.triggered = true;
                order.updated_at = now;

                let trigger = StopTrigger {
                    position_id: *position_id,
                    instrument_id: order.instrument_id,
                    direction: order.direction,
                    side: order.side,
                    kind: order.kind,
                    current_price: price,
                    stop_price: order.stop_price(),
                    triggered_at: now,
                };
                log::warn!(
                    "{} triggered: {} {} @{:?} (stop {:?})",
                    trigger.side,
                    trigger.instrument_id,
                    trigger.direction,
                    trigger.current_price,
                    trigger.stop_price,
                );
                triggers.push(trigger);
            }
            true
        });

        triggers
    }
}
