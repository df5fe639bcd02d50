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

//! Trailing stop calculations.
//!
//! A trailing stop tracks the most favorable price seen since registration (the extreme) and sits
//! a fixed offset behind it. The extreme only ever improves, so the stop only ever tightens.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trader_model::enums::Direction;

/// The distance between a trailing stop and the extreme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrailingOffset {
    /// An absolute price distance.
    Price(Decimal),
    /// A fraction of the extreme (`0.01` is one percent).
    Fraction(Decimal),
    /// A number of minimum price increments.
    Ticks(u32),
}

impl TrailingOffset {
    /// Returns the absolute distance for the current `extreme`.
    #[must_use]
    pub fn distance(&self, extreme: Decimal, tick_size: Decimal) -> Decimal {
        match self {
            Self::Price(offset) => *offset,
            Self::Fraction(fraction) => extreme * fraction,
            Self::Ticks(ticks) => Decimal::from(*ticks) * tick_size,
        }
    }
}

/// Returns the extreme after observing `price` for a position in `direction`.
#[must_use]
pub fn update_extreme(direction: Direction, extreme: Decimal, price: Decimal) -> Decimal {
    match direction {
        Direction::Long => extreme.max(price),
        Direction::Short => extreme.min(price),
    }
}

/// Calculates the stop price protecting a position in `direction` from the current `extreme`.
#[must_use]
pub fn trailing_stop_price(
    direction: Direction,
    offset: TrailingOffset,
    extreme: Decimal,
    tick_size: Decimal,
) -> Decimal {
    let distance = offset.distance(extreme, tick_size);
    match direction {
        Direction::Long => extreme - distance,
        Direction::Short => extreme + distance,
    }
}
