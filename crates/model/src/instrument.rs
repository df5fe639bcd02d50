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

//! Tradable futures contract definition.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identifiers::InstrumentId;

/// The default maximum volume of a single order when the exchange does not publish one.
pub const DEFAULT_MAX_ORDER_VOLUME: u64 = 500;

/// Represents a tradable futures contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// The contract code.
    pub id: InstrumentId,
    /// The listing exchange code.
    pub exchange: String,
    /// If the contract is currently listed and tradable.
    pub is_trading: bool,
    /// If the contract trades in the night session.
    pub night_trade: bool,
    /// The minimum price increment.
    pub tick_size: Decimal,
    /// The upper daily price limit, when published.
    pub upper_limit: Option<Decimal>,
    /// The lower daily price limit, when published.
    pub lower_limit: Option<Decimal>,
    /// The margin reserved per lot.
    pub margin_per_unit: Decimal,
    /// The maximum volume of a single order.
    pub max_order_volume: u64,
    /// The maximum total volume per account and direction.
    pub max_position: u64,
}

impl Instrument {
    /// Creates a new tradable [`Instrument`] without price limits.
    #[must_use]
    pub fn new(
        id: InstrumentId,
        exchange: impl Into<String>,
        tick_size: Decimal,
        margin_per_unit: Decimal,
        max_position: u64,
    ) -> Self {
        Self {
            id,
            exchange: exchange.into(),
            is_trading: true,
            night_trade: false,
            tick_size,
            upper_limit: None,
            lower_limit: None,
            margin_per_unit,
            max_order_volume: DEFAULT_MAX_ORDER_VOLUME,
            max_position,
        }
    }

    /// Returns the instrument with the given daily price limits.
    #[must_use]
    pub fn with_limits(mut self, lower: Decimal, upper: Decimal) -> Self {
        self.lower_limit = Some(lower);
        self.upper_limit = Some(upper);
        self
    }

    /// Returns the instrument flagged for night session trading.
    #[must_use]
    pub fn with_night_trade(mut self, night_trade: bool) -> Self {
        self.night_trade = night_trade;
        self
    }

    /// Returns the margin required to hold `volume` lots.
    #[must_use]
    pub fn margin_for(&self, volume: u64) -> Decimal {
        Decimal::from(volume) * self.margin_per_unit
    }
}
