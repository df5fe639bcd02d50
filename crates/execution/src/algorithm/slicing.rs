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

//! Volume slicing and price clipping for algorithmic execution.

use rust_decimal::{Decimal, prelude::ToPrimitive};
use trader_model::enums::Direction;

/// Divides `numerator` by `denominator`, rounding half to even.
const fn div_round_half_even(numerator: u64, denominator: u64) -> u64 {
    let quotient = numerator / denominator;
    let twice_remainder = (numerator % denominator) * 2;
    if twice_remainder > denominator || (twice_remainder == denominator && quotient % 2 == 1) {
        quotient + 1
    } else {
        quotient
    }
}

/// Splits `total` lots into TWAP slices over `duration_secs`, one slice per `interval_secs`.
///
/// Every slice carries the rounded per-slice volume; the slice count is then reduced so the
/// slices never exceed `total`, and the last slice absorbs any remainder.
#[must_use]
pub fn twap_slices(total: u64, duration_secs: u64, interval_secs: u64) -> Vec<u64> {
    if total == 0 {
        return Vec::new();
    }

    let num_slices = (duration_secs / interval_secs.max(1)).max(1);
    let per_slice = div_round_half_even(total, num_slices).max(1);
    let count = total / per_slice;

    let mut slices = vec![per_slice; count as usize];
    if let Some(last) = slices.last_mut() {
        *last += total - per_slice * count;
    }
    slices
}

/// Allocates `total` lots across the buckets of a historical volume `profile`.
///
/// Each bucket receives the lots needed to bring the cumulative allocation up to its cumulative
/// share of the profile, so rounding never drifts; the final bucket takes whatever is left.
/// Negative buckets weigh nothing. Returns `None` when the profile carries no volume.
#[must_use]
pub fn vwap_slices(total: u64, profile: &[Decimal]) -> Option<Vec<u64>> {
    let weights: Vec<Decimal> = profile.iter().map(|v| (*v).max(Decimal::ZERO)).collect();
    let profile_total: Decimal = weights.iter().sum();
    if profile_total <= Decimal::ZERO {
        return None;
    }

    let total_dec = Decimal::from(total);
    let mut cumulative = Decimal::ZERO;
    let mut allocated = 0u64;
    let mut slices = Vec::with_capacity(weights.len());

    for (i, weight) in weights.iter().enumerate() {
        cumulative += weight;
        let target = if i + 1 == weights.len() {
            total
        } else {
            (total_dec * cumulative / profile_total)
                .floor()
                .to_u64()
                .unwrap_or(total)
                .min(total)
        };
        let slice = target.saturating_sub(allocated);
        allocated += slice;
        slices.push(slice);
    }

    Some(slices)
}

/// Clips `price` to an optional limit: a buy never pays above it, a sell never receives below it.
#[must_use]
pub fn clip_price(direction: Direction, price: Decimal, limit: Option<Decimal>) -> Decimal {
    match (direction, limit) {
        (Direction::Long, Some(limit)) => price.min(limit),
        (Direction::Short, Some(limit)) => price.max(limit),
        (_, None) => price,
    }
}
