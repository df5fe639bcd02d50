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

//! Condition atoms and their evaluation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use trader_common::store::EntityStore;
use trader_model::identifiers::InstrumentId;

use crate::market::MarketDataProvider;

/// A comparison between an observed value and a threshold.
#[derive(Copy, Clone, Debug, Display, Hash, PartialEq, Eq, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    /// Returns whether `observed` compares to `threshold` as required.
    #[must_use]
    pub fn holds<T: PartialOrd>(self, observed: &T, threshold: &T) -> bool {
        match self {
            Self::Gt => observed > threshold,
            Self::Ge => observed >= threshold,
            Self::Lt => observed < threshold,
            Self::Le => observed <= threshold,
        }
    }
}

/// How the atoms of a conditional order combine.
#[derive(Copy, Clone, Debug, Default, Display, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionLogic {
    #[default]
    And,
    Or,
}

impl ConditionLogic {
    /// Combines already evaluated atoms. An empty set never holds.
    #[must_use]
    pub fn combine(self, results: &[bool]) -> bool {
        if results.is_empty() {
            return false;
        }
        match self {
            Self::And => results.iter().all(|r| *r),
            Self::Or => results.iter().any(|r| *r),
        }
    }
}

/// A single trigger condition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// The last price of an instrument.
    Price {
        instrument_id: InstrumentId,
        comparison: Comparison,
        value: Decimal,
    },
    /// The wall clock.
    Time {
        comparison: Comparison,
        at: DateTime<Utc>,
    },
    /// The summed open volume in an instrument.
    PositionVolume {
        instrument_id: InstrumentId,
        comparison: Comparison,
        volume: u64,
    },
    /// The summed open profit, for one instrument or across all positions.
    Profit {
        instrument_id: Option<InstrumentId>,
        comparison: Comparison,
        value: Decimal,
    },
    /// The drop from the best recent closed-trade profit to the current open profit.
    Drawdown {
        instrument_id: InstrumentId,
        comparison: Comparison,
        value: Decimal,
    },
}

/// The data a condition is evaluated against.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub now: DateTime<Utc>,
    pub prices: &'a dyn MarketDataProvider,
    pub store: &'a dyn EntityStore,
    pub drawdown_lookback: usize,
}

impl std::fmt::Debug for EvalContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(EvalContext))
            .field("now", &self.now)
            .field("drawdown_lookback", &self.drawdown_lookback)
            .finish()
    }
}

impl Condition {
    /// Evaluates the condition. Missing data never satisfies a condition.
    #[must_use]
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            Self::Price {
                instrument_id,
                comparison,
                value,
            } => ctx
                .prices
                .last_price(instrument_id)
                .is_some_and(|price| comparison.holds(&price, value)),
            Self::Time { comparison, at } => comparison.holds(&ctx.now, at),
            Self::PositionVolume {
                instrument_id,
                comparison,
                volume,
            } => {
                let open: u64 = ctx
                    .store
                    .open_positions(Some(instrument_id))
                    .iter()
                    .map(|p| p.volume)
                    .sum();
                comparison.holds(&open, volume)
            }
            Self::Profit {
                instrument_id,
                comparison,
                value,
            } => {
                let profit: Decimal = ctx
                    .store
                    .open_positions(instrument_id.as_ref())
                    .iter()
                    .map(|p| p.profit)
                    .sum();
                comparison.holds(&profit, value)
            }
            Self::Drawdown {
                instrument_id,
                comparison,
                value,
            } => drawdown(ctx.store, instrument_id, ctx.drawdown_lookback)
                .is_some_and(|dd| comparison.holds(&dd, value)),
        }
    }
}

/// Calculates the drawdown of the open position in `instrument_id`.
///
/// The drawdown is the best profit among the last `lookback` closed trades less the current open
/// profit. It is zero when no closed trade was profitable. Returns `None` when nothing is open in
/// the instrument or fewer than two closed trades are known.
#[must_use]
pub fn drawdown(
    store: &dyn EntityStore,
    instrument_id: &InstrumentId,
    lookback: usize,
) -> Option<Decimal> {
    let positions = store.open_positions(Some(instrument_id));
    if positions.is_empty() {
        return None;
    }

    let trades = store.closed_trades(instrument_id, lookback);
    if trades.len() < 2 {
        return None;
    }

    let max_profit = trades
        .iter()
        .map(|t| t.profit)
        .fold(Decimal::ZERO, Decimal::max);
    if max_profit <= Decimal::ZERO {
        return Some(Decimal::ZERO);
    }

    let current: Decimal = positions.iter().map(|p| p.profit).sum();
    Some(max_profit - current)
}
