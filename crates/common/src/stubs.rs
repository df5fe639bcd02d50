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

//! Type stubs to facilitate testing.

use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Asia::Shanghai;
use rstest::fixture;
use trader_model::{
    account::Account,
    instrument::Instrument,
    position::Position,
    stubs::{account, instrument_au, instrument_rb, position_long, position_short},
};

use crate::{clock::TestClock, store::InMemoryStore};

/// Tuesday 2024-01-02 10:00:00 in Shanghai, inside the day session.
#[must_use]
pub fn session_time() -> DateTime<Utc> {
    Shanghai
        .with_ymd_and_hms(2024, 1, 2, 10, 0, 0)
        .single()
        .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc))
}

#[fixture]
pub fn test_clock() -> Rc<TestClock> {
    Rc::new(TestClock::new(session_time()))
}

/// A store holding both stub instruments, the stub account and a long and a short position.
#[fixture]
pub fn store(
    instrument_rb: Instrument,
    instrument_au: Instrument,
    account: Account,
    position_long: Position,
    position_short: Position,
) -> Rc<InMemoryStore> {
    let store = InMemoryStore::new();
    store.add_instrument(instrument_rb);
    store.add_instrument(instrument_au);
    store.add_account(account);
    store.upsert_position(position_long);
    store.upsert_position(position_short);
    Rc::new(store)
}
