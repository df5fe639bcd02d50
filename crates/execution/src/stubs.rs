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

use std::{cell::RefCell, rc::Rc};

use ahash::AHashSet;
use async_trait::async_trait;
use rstest::fixture;
use rust_decimal::Decimal;
use trader_model::{enums::Direction, identifiers::InstrumentId};

use crate::{market::PriceCache, placer::OrderPlacer};

/// An order seen by a [`RecordingPlacer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacedOrder {
    pub instrument_id: InstrumentId,
    pub direction: Direction,
    pub price: Decimal,
    pub volume: u64,
    pub accepted: bool,
}

/// An [`OrderPlacer`] which records every call and accepts unless told otherwise.
#[derive(Debug, Default)]
pub struct RecordingPlacer {
    orders: RefCell<Vec<PlacedOrder>>,
    rejected_calls: RefCell<AHashSet<usize>>,
    failed_calls: RefCell<AHashSet<usize>>,
}

impl RecordingPlacer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `call`th placement (zero based) return `Ok(false)`.
    pub fn reject_call(&self, call: usize) {
        self.rejected_calls.borrow_mut().insert(call);
    }

    /// Makes the `call`th placement (zero based) return an error.
    pub fn fail_call(&self, call: usize) {
        self.failed_calls.borrow_mut().insert(call);
    }

    #[must_use]
    pub fn orders(&self) -> Vec<PlacedOrder> {
        self.orders.borrow().clone()
    }

    /// Returns the volumes of every placement, accepted or not.
    #[must_use]
    pub fn volumes(&self) -> Vec<u64> {
        self.orders.borrow().iter().map(|o| o.volume).collect()
    }
}

#[async_trait(?Send)]
impl OrderPlacer for RecordingPlacer {
    async fn place(
        &self,
        instrument_id: &InstrumentId,
        direction: Direction,
        price: Decimal,
        volume: u64,
    ) -> anyhow::Result<bool> {
        let call = self.orders.borrow().len();
        let failed = self.failed_calls.borrow().contains(&call);
        let accepted = !failed && !self.rejected_calls.borrow().contains(&call);

        self.orders.borrow_mut().push(PlacedOrder {
            instrument_id: *instrument_id,
            direction,
            price,
            volume,
            accepted,
        });

        if failed {
            anyhow::bail!("gateway unavailable");
        }
        Ok(accepted)
    }
}

#[fixture]
pub fn placer() -> Rc<RecordingPlacer> {
    Rc::new(RecordingPlacer::new())
}

#[fixture]
pub fn price_cache() -> Rc<PriceCache> {
    Rc::new(PriceCache::new())
}
