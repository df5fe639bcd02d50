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

//! Identifiers for instruments, accounts, positions and supervised orders.

mod macros;

use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ustr::Ustr;

use self::macros::identifier;

identifier!(
    /// Identifies a tradable contract by its exchange code (e.g. `rb2510`).
    InstrumentId
);

identifier!(
    /// Identifies a trading account.
    AccountId
);

identifier!(
    /// Identifies an open position held in the entity store.
    PositionId
);

identifier!(
    /// Identifies a conditional order supervised by the conditional order engine.
    ConditionalOrderId
);

identifier!(
    /// Identifies an algorithmic (TWAP/VWAP/snapshot) execution.
    AlgoOrderId
);
