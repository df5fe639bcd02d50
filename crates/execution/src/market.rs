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

//! Market data contract consumed by the engines, and a cache implementing it.

use std::{cell::RefCell, fmt::Debug};

use ahash::AHashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trader_model::{enums::Direction, identifiers::InstrumentId};

/// The best bid and ask with their visible volumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookTop {
    pub bid_price: Decimal,
    pub bid_volume: u64,
    pub ask_price: Decimal,
    pub ask_volume: u64,
}

impl BookTop {
    /// Returns the price an aggressive order in `direction` would trade at.
    #[must_use]
    pub const fn touch_price(&self, direction: Direction) -> Decimal {
        match direction {
            Direction::Long => self.ask_price,
            Direction::Short => self.bid_price,
        }
    }

    /// Returns the visible volume on the side an order in `direction` would trade against.
    #[must_use]
    pub const fn opposing_volume(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Long => self.ask_volume,
            Direction::Short => self.bid_volume,
        }
    }
}

/// Read-only price data, refreshed outside the control plane.
pub trait MarketDataProvider: Debug {
    /// Returns the last trade price for `instrument_id`.
    fn last_price(&self, instrument_id: &InstrumentId) -> Option<Decimal>;

    /// Returns the top of the order book for `instrument_id`.
    fn book_top(&self, instrument_id: &InstrumentId) -> Option<BookTop>;

    /// Returns up to `lookback` historical volume buckets for `instrument_id`, oldest first.
    fn volume_profile(&self, instrument_id: &InstrumentId, lookback: usize) -> Vec<Decimal>;
}

#[derive(Debug, Default)]
struct CacheInner {
    prices: AHashMap<InstrumentId, Decimal>,
    books: AHashMap<InstrumentId, BookTop>,
    profiles: AHashMap<InstrumentId, Vec<Decimal>>,
}

/// The last known market state per instrument.
#[derive(Debug, Default)]
pub struct PriceCache {
    inner: RefCell<CacheInner>,
}

impl PriceCache {
    /// Creates a new empty [`PriceCache`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_price(&self, instrument_id: InstrumentId, price: Decimal) {
        self.inner.borrow_mut().prices.insert(instrument_id, price);
    }

    pub fn update_book(&self, instrument_id: InstrumentId, book: BookTop) {
        self.inner.borrow_mut().books.insert(instrument_id, book);
    }

    pub fn set_volume_profile(&self, instrument_id: InstrumentId, buckets: Vec<Decimal>) {
        self.inner.borrow_mut().profiles.insert(instrument_id, buckets);
    }

    /// Returns a copy of every last price.
    #[must_use]
    pub fn snapshot(&self) -> AHashMap<InstrumentId, Decimal> {
        self.inner.borrow().prices.clone()
    }
}

impl MarketDataProvider for PriceCache {
    fn last_price(&self, instrument_id: &InstrumentId) -> Option<Decimal> {
        self.inner.borrow().prices.get(instrument_id).copied()
    }

    fn book_top(&self, instrument_id: &InstrumentId) -> Option<BookTop> {
        self.inner.borrow().books.get(instrument_id).copied()
    }

    fn volume_profile(&self, instrument_id: &InstrumentId, lookback: usize) -> Vec<Decimal> {
        self.inner
            .borrow()
            .profiles
            .get(instrument_id)
            .map(|buckets| {
                let skip = buckets.len().saturating_sub(lookback);
                buckets[skip..].to_vec()
            })
            .unwrap_or_default()
    }
}
