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

use rstest::fixture;
use rust_decimal_macros::dec;

use crate::{
    account::Account,
    enums::Direction,
    identifiers::{AccountId, InstrumentId, PositionId},
    instrument::Instrument,
    position::Position,
};

#[fixture]
pub fn account_id() -> AccountId {
    AccountId::new("SIM-001")
}

/// Rebar futures with daily limits of 3200/3800 and a 3,500 margin per lot.
#[fixture]
pub fn instrument_rb() -> Instrument {
    Instrument::new(
        InstrumentId::new("rb2510"),
        "SHFE",
        dec!(1),
        dec!(3_500),
        100,
    )
    .with_limits(dec!(3_200), dec!(3_800))
}

/// Gold futures trading in the night session, without published limits.
#[fixture]
pub fn instrument_au() -> Instrument {
    Instrument::new(
        InstrumentId::new("au2512"),
        "SHFE",
        dec!(0.02),
        dec!(60_000),
        20,
    )
    .with_night_trade(true)
}

#[fixture]
pub fn account(account_id: AccountId) -> Account {
    Account::new(account_id, dec!(1_000_000), dec!(900_000))
}

#[fixture]
pub fn position_long(account_id: AccountId, instrument_rb: Instrument) -> Position {
    Position::new(
        PositionId::new("P-LONG-1"),
        account_id,
        instrument_rb.id,
        Direction::Long,
        2,
        dec!(100),
    )
}

#[fixture]
pub fn position_short(account_id: AccountId, instrument_rb: Instrument) -> Position {
    Position::new(
        PositionId::new("P-SHORT-1"),
        account_id,
        instrument_rb.id,
        Direction::Short,
        2,
        dec!(100),
    )
}
