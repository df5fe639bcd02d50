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

//! Open futures position as tracked by the entity store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    enums::Direction,
    identifiers::{AccountId, InstrumentId, PositionId},
};

/// Represents an open position in a single instrument and direction.
///
/// A position with zero volume is treated as closed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub direction: Direction,
    pub volume: u64,
    pub avg_open_price: Decimal,
    /// The current unrealized profit, refreshed externally.
    pub profit: Decimal,
}

impl Position {
    /// Creates a new [`Position`] with zero profit.
    #[must_use]
    pub fn new(
        id: PositionId,
        account_id: AccountId,
        instrument_id: InstrumentId,
        direction: Direction,
        volume: u64,
        avg_open_price: Decimal,
    ) -> Self {
        Self {
            id,
            account_id,
            instrument_id,
            direction,
            volume,
            avg_open_price,
            profit: Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.volume > 0
    }

    #[must_use]
    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }
}
