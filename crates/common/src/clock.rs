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

//! Real-time and static `Clock` implementations.
//!
//! A clock exposes two readings: the wall clock (used to anchor cron schedules) and the loop's
//! monotonic clock (used to arm timers). Keeping both behind one trait lets tests drive the
//! scheduling maths without waiting on real time.

use std::{cell::Cell, fmt::Debug, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// Represents a source of wall-clock and monotonic time.
pub trait Clock: Debug {
    /// Returns the current date and time as a timezone-aware `DateTime<UTC>`.
    fn utc_now(&self) -> DateTime<Utc>;

    /// Returns the current reading of the event loop's monotonic clock.
    fn loop_now(&self) -> Instant;
}

/// A real-time clock which uses system time and the tokio monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveClock;

impl LiveClock {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for LiveClock {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn loop_now(&self) -> Instant {
        Instant::now()
    }
}

/// A static test clock.
///
/// Stores the current wall time and monotonic instant internally; both only move when advanced.
/// The wall time may also be jumped on its own to simulate NTP corrections or DST changes.
#[derive(Debug)]
pub struct TestClock {
    wall: Cell<DateTime<Utc>>,
    instant: Cell<Instant>,
}

impl TestClock {
    /// Creates a new [`TestClock`] at `wall`, anchored to the current monotonic instant.
    #[must_use]
    pub fn new(wall: DateTime<Utc>) -> Self {
        Self {
            wall: Cell::new(wall),
            instant: Cell::new(Instant::now()),
        }
    }

    /// Advances both the wall and monotonic readings by `delta`.
    ///
    /// # Panics
    ///
    /// Panics if `delta` exceeds the representable wall-clock range.
    pub fn advance(&self, delta: Duration) {
        let wall_delta = TimeDelta::from_std(delta).expect("delta out of range");
        self.wall.set(self.wall.get() + wall_delta);
        self.instant.set(self.instant.get() + delta);
    }

    /// Moves the wall reading only, leaving the monotonic clock untouched.
    pub fn jump_wall(&self, delta: TimeDelta) {
        self.wall.set(self.wall.get() + delta);
    }

    /// Sets the wall reading only.
    pub fn set_wall(&self, wall: DateTime<Utc>) {
        self.wall.set(wall);
    }
}

impl Clock for TestClock {
    fn utc_now(&self) -> DateTime<Utc> {
        self.wall.get()
    }

    fn loop_now(&self) -> Instant {
        self.instant.get()
    }
}
