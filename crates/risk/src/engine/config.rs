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

//! Provides a configuration for `RiskEngine` instances.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Configuration for `RiskEngine` instances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskEngineConfig {
    /// The maximum fraction of the balance which may be reserved as margin.
    pub max_position_ratio: Decimal,
    /// The maximum fraction of the balance a single opening order may reserve.
    pub max_single_order_ratio: Decimal,
    /// The maximum number of accepted orders per instrument within the rate window.
    pub max_order_per_minute: usize,
    /// The fraction of the order price kept clear of the daily price limits.
    pub price_limit_buffer: Decimal,
    /// The length of the rate window in seconds.
    pub rate_window_secs: u64,
}

impl RiskEngineConfig {
    #[must_use]
    pub const fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }
}

impl Default for RiskEngineConfig {
    /// Creates a new default [`RiskEngineConfig`] instance.
    fn default() -> Self {
        Self {
            max_position_ratio: dec!(0.95),
            max_single_order_ratio: dec!(0.1),
            max_order_per_minute: 30,
            price_limit_buffer: dec!(0.001),
            rate_window_secs: 60,
        }
    }
}
