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

//! Configurations for the order supervision engines.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Returns whether `secs` is a sweep interval that fires evenly within each minute.
#[must_use]
pub const fn is_even_interval(secs: u64) -> bool {
    secs > 0 && secs < 60 && 60 % secs == 0
}

/// Returns a six-field cron expression firing every `secs` seconds.
///
/// Intervals are clamped to 1-59 seconds. Only intervals accepted by [`is_even_interval`] fire
/// at a constant pace, since the seconds field restarts at each minute.
#[must_use]
pub fn every_secs_expression(secs: u64) -> String {
    format!("*/{} * * * * *", secs.clamp(1, 59))
}

/// Configuration for `StopEngine` instances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopEngineConfig {
    /// The stop-loss fraction used when a percentage stop is registered without one.
    pub default_stop_loss_pct: Decimal,
    /// The take-profit fraction used when a percentage target is registered without one.
    pub default_take_profit_pct: Decimal,
    /// The interval between sweeps in seconds.
    pub check_interval_secs: u64,
}

impl StopEngineConfig {
    /// Returns the cron expression for the periodic stop sweep.
    #[must_use]
    pub fn check_schedule(&self) -> String {
        every_secs_expression(self.check_interval_secs)
    }
}

impl Default for StopEngineConfig {
    /// Creates a new default [`StopEngineConfig`] instance.
    fn default() -> Self {
        Self {
            default_stop_loss_pct: dec!(0.02),
            default_take_profit_pct: dec!(0.05),
            check_interval_secs: 1,
        }
    }
}

/// Configuration for `ConditionalOrderEngine` instances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionalEngineConfig {
    /// The interval between condition sweeps in seconds.
    pub check_interval_secs: u64,
    /// The pause between iceberg slices in seconds.
    pub iceberg_interval_secs: u64,
    /// The number of closed trades considered for drawdown.
    pub drawdown_lookback: usize,
}

impl ConditionalEngineConfig {
    /// Returns the cron expression for the periodic condition sweep.
    #[must_use]
    pub fn check_schedule(&self) -> String {
        every_secs_expression(self.check_interval_secs)
    }

    #[must_use]
    pub const fn iceberg_interval(&self) -> Duration {
        Duration::from_secs(self.iceberg_interval_secs)
    }
}

impl Default for ConditionalEngineConfig {
    /// Creates a new default [`ConditionalEngineConfig`] instance.
    fn default() -> Self {
        Self {
            check_interval_secs: 1,
            iceberg_interval_secs: 1,
            drawdown_lookback: 20,
        }
    }
}

/// Configuration for `AlgoEngine` instances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgoEngineConfig {
    /// The execution window used when none is given.
    pub default_duration_secs: u64,
    /// The target spacing between TWAP slices and between VWAP buckets, in seconds.
    pub slice_interval_secs: u64,
    /// The number of historical buckets requested for a VWAP profile.
    pub vwap_lookback: usize,
}

impl AlgoEngineConfig {
    #[must_use]
    pub const fn default_duration(&self) -> Duration {
        Duration::from_secs(self.default_duration_secs)
    }

    #[must_use]
    pub const fn slice_interval(&self) -> Duration {
        Duration::from_secs(self.slice_interval_secs)
    }
}

impl Default for AlgoEngineConfig {
    /// Creates a new default [`AlgoEngineConfig`] instance.
    fn default() -> Self {
        Self {
            default_duration_secs: 3600,
            slice_interval_secs: 60,
            vwap_lookback: 20,
        }
    }
}
