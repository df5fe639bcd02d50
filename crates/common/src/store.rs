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

//! The entity store contract and an in-memory implementation.
//!
//! Instruments, positions, accounts and closed trades live in an external store; the control plane
//! only reads them (and records closed trades). [`InMemoryStore`] backs tests and paper runs.

use std::{cell::RefCell, fmt::Debug};

use ahash::AHashMap;
use indexmap::IndexMap;
use trader_model::{
    account::Account,
    enums::Direction,
    identifiers::{AccountId, InstrumentId, PositionId},
    instrument::Instrument,
    position::Position,
    trade::Trade,
};

/// Read access to trading entities, plus trade recording.
pub trait EntityStore: Debug {
    /// Returns the instrument for `id`.
    fn instrument(&self, id: &InstrumentId) -> Option<Instrument>;

    /// Returns the position for `id`.
    fn position(&self, id: &PositionId) -> Option<Position>;

    /// Returns the summed open volume for an account, instrument and direction.
    fn position_volume(
        &self,
        account_id: &AccountId,
        instrument_id: &InstrumentId,
        direction: Direction,
    ) -> u64;

    /// Returns open positions, optionally restricted to one instrument.
    fn open_positions(&self, instrument_id: Option<&InstrumentId>) -> Vec<Position>;

    /// Returns the account for `id`.
    fn account(&self, id: &AccountId) -> Option<Account>;

    /// Records a closed trade.
    fn record_trade(&self, trade: Trade);

    /// Returns up to `limit` most recently closed trades for `instrument_id`, newest first.
    fn closed_trades(&self, instrument_id: &InstrumentId, limit: usize) -> Vec<Trade>;
}

#[derive(Debug, Default)]
struct StoreInner {
    instruments: AHashMap<InstrumentId, Instrument>,
    positions: IndexMap<PositionId, Position>,
    accounts: AHashMap<AccountId, Account>,
    trades: Vec<Trade>,
}

/// A single-threaded in-memory [`EntityStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RefCell<StoreInner>,
}

impl InMemoryStore {
    /// Creates a new empty [`InMemoryStore`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_instrument(&self, instrument: Instrument) {
        self.inner
            .borrow_mut()
            .instruments
            .insert(instrument.id, instrument);
    }

    pub fn add_account(&self, account: Account) {
        self.inner.borrow_mut().accounts.insert(account.id, account);
    }

    /// Inserts or replaces `position`.
    pub fn upsert_position(&self, position: Position) {
        self.inner
            .borrow_mut()
            .positions
            .insert(position.id, position);
    }

    /// Removes the position `id`, returning it if present.
    pub fn remove_position(&self, id: &PositionId) -> Option<Position> {
        self.inner.borrow_mut().positions.shift_remove(id)
    }

    /// Applies `f` to the position `id`, returning whether it exists.
    pub fn update_position(&self, id: &PositionId, f: impl FnOnce(&mut Position)) -> bool {
        match self.inner.borrow_mut().positions.get_mut(id) {
            Some(position) => {
                f(position);
                true
            }
            None => false,
        }
    }
}

impl EntityStore for InMemoryStore {
    fn instrument(&self, id: &InstrumentId) -> Option<Instrument> {
        self.inner.borrow().instruments.get(id).cloned()
    }

    fn position(&self, id: &PositionId) -> Option<Position> {
        self.inner.borrow().positions.get(id).cloned()
    }

    fn position_volume(
        &self,
        account_id: &AccountId,
        instrument_id: &InstrumentId,
        direction: Direction,
    ) -> u64 {
        self.inner
            .borrow()
            .positions
            .values()
            .filter(|p| {
                p.account_id == *account_id
                    && p.instrument_id == *instrument_id
                    && p.direction == direction
            })
            .map(|p| p.volume)
            .sum()
    }

    fn open_positions(&self, instrument_id: Option<&InstrumentId>) -> Vec<Position> {
        self.inner
            .borrow()
            .positions
            .values()
            .filter(|p| p.is_open())
            .filter(|p| instrument_id.is_none_or(|id| p.instrument_id == *id))
            .cloned()
            .collect()
    }

    fn account(&self, id: &AccountId) -> Option<Account> {
        self.inner.borrow().accounts.get(id).cloned()
    }

    fn record_trade(&self, trade: Trade) {
        self.inner.borrow_mut().trades.push(trade);
    }

    fn closed_trades(&self, instrument_id: &InstrumentId, limit: usize) -> Vec<Trade> {
        let mut trades: Vec<Trade> = self
            .inner
            .borrow()
            .trades
            .iter()
            .filter(|t| t.instrument_id == *instrument_id)
            .cloned()
            .collect();
        trades.sort_by(|a, b| b.closed_at.cmp(&a.closed_at));
        trades.truncate(limit);
        trades
    }
}
