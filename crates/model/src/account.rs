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

//! Trading account balances.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identifiers::AccountId;

/// Represents a trading account's capital.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// The total account equity.
    pub balance: Decimal,
    /// The capital not reserved as margin.
    pub available: Decimal,
}

impl Account {
    #[must_use]
    pub fn new(id: AccountId, balance: Decimal, available: Decimal) -> Self {
        Self {
            id,
            balance,
            available,
        }
    }

    /// Returns the fraction of the balance currently reserved, or `None` for a zero balance.
    #[must_use]
    pub fn utilization(&self) -> Option<Decimal> {
        if self.balance > Decimal::ZERO {
            Some((self.balance - self.available) / self.balance)
        } else {
            None
        }
    }
}
