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

//! The order placement contract.
//!
//! Engines never reach an exchange themselves. A caller supplies an [`OrderPlacer`] which may
//! route through the risk gate, a broker API, or a paper account.

use std::fmt::Debug;

use async_trait::async_trait;
use rust_decimal::Decimal;
use trader_model::{enums::Direction, identifiers::InstrumentId};

/// Places a single limit order.
#[async_trait(?Send)]
pub trait OrderPlacer: Debug {
    /// Places `volume` lots of `instrument_id` at `price`, returning whether the order was accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the order could not be sent at all.
    async fn place(
        &self,
        instrument_id: &InstrumentId,
        direction: Direction,
        price: Decimal,
        volume: u64,
    ) -> anyhow::Result<bool>;
}

/// Places an order and folds a placement error into a failed slice.
pub async fn place_or_log(
    placer: &dyn OrderPlacer,
    instrument_id: &InstrumentId,
    direction: Direction,
    price: Decimal,
    volume: u64,
) -> bool {
    match placer.place(instrument_id, direction, price, volume).await {
        Ok(accepted) => accepted,
        Err(e) => {
            log::error!("Failed to place {direction} {instrument_id} {volume}@{price}: {e:#}");
            false
        }
    }
}
