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

//! The order a strategy wants placed, before any risk check.

use std::fmt::Display;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    enums::{Direction, OffsetFlag},
    identifiers::{AccountId, InstrumentId},
};

/// Represents a desired limit order for one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub account_id: AccountId,
    pub instrument_id: InstrumentId,
    pub direction: Direction,
    pub offset: OffsetFlag,
    pub price: Decimal,
    pub volume: u64,
}

impl OrderIntent {
    #[must_use]
    pub fn new(
        account_id: AccountId,
        instrument_id: InstrumentId,
        direction: Direction,
        offset: OffsetFlag,
        price: Decimal,
        volume: u64,
    ) -> Self {
        Self {
            account_id,
            instrument_id,
            direction,
            offset,
            price,
            volume,
        }
    }

    /// Returns whether the order opens (or adds to) a position.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.offset.is_open()
    }

    /// Returns a copy of the order with a different volume.
    #[must_use]
    pub fn with_volume(&self, volume: u64) -> Self {
        Self {
            volume,
            ..self.clone()
        }
    }
}

impl Display for OrderIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {}@{} ({})",
            self.direction,
            self.offset,
            self.instrument_id,
            self.volume,
            self.price,
            self.account_id,
        )
    }
}
