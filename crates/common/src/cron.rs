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

//! Cron schedule parsing and wall-clock to monotonic translation.
//!
//! Schedules are evaluated against the wall clock in a configured timezone, but timers are armed
//! on the loop's monotonic clock. An [`CronAnchor`] captured once at install time relates the two,
//! so later wall-clock adjustments do not move already computed deadlines.

use std::{fmt::Display, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::time::Instant;
use ustr::Ustr;

use crate::clock::Clock;

const DAY_NAMES: [&str; 8] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// A parsed cron schedule.
///
/// Accepts classic five-field crontab expressions (`min hour dom month dow`, with `0`/`7` for
/// Sunday) as well as six or seven field expressions with a leading seconds field.
#[derive(Clone, Debug)]
pub struct CronSchedule {
    expression: Ustr,
    schedule: cron::Schedule,
}

impl CronSchedule {
    /// Parses a cron `expression`.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression has the wrong number of fields or any field is invalid.
    pub fn parse(expression: &str) -> anyhow::Result<Self> {
        let normalized = normalize_expression(expression)?;
        let schedule = cron::Schedule::from_str(&normalized)
            .map_err(|e| anyhow::anyhow!("invalid cron expression '{expression}': {e}"))?;

        Ok(Self {
            expression: Ustr::from(expression.trim()),
            schedule,
        })
    }

    /// Returns the expression as originally supplied.
    #[must_use]
    pub fn expression(&self) -> Ustr {
        self.expression
    }

    /// Returns the first fire time strictly after `after`, evaluated in `tz`.
    #[must_use]
    pub fn next_after(&self, after: &DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&tz);
        self.schedule
            .after(&local)
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// The (wall-clock, monotonic) pair all deadlines of one install are derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CronAnchor {
    wall: DateTime<Utc>,
    instant: Instant,
}

impl CronAnchor {
    #[must_use]
    pub const fn new(wall: DateTime<Utc>, instant: Instant) -> Self {
        Self { wall, instant }
    }

    /// Captures both readings from `clock`.
    #[must_use]
    pub fn capture(clock: &dyn Clock) -> Self {
        Self::new(clock.utc_now(), clock.loop_now())
    }

    #[must_use]
    pub const fn wall(&self) -> DateTime<Utc> {
        self.wall
    }

    #[must_use]
    pub const fn instant(&self) -> Instant {
        self.instant
    }

    /// Translates a wall-clock fire time into a deadline on the monotonic clock.
    ///
    /// Fire times before the anchor map to the anchor instant itself.
    #[must_use]
    pub fn deadline(&self, fire_at: DateTime<Utc>) -> Instant {
        let delta = (fire_at - self.wall).to_std().unwrap_or(Duration::ZERO);
        self.instant + delta
    }
}

/// Iterator state for one scheduled job: the last wall-clock fire time handed out.
#[derive(Clone, Debug)]
pub struct CronCursor {
    schedule: CronSchedule,
    tz: Tz,
    last: DateTime<Utc>,
}

impl CronCursor {
    /// Creates a new [`CronCursor`] starting at `start` (exclusive).
    #[must_use]
    pub const fn new(schedule: CronSchedule, tz: Tz, start: DateTime<Utc>) -> Self {
        Self {
            schedule,
            tz,
            last: start,
        }
    }

    #[must_use]
    pub const fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    /// Returns the next wall-clock fire time and moves the cursor past it.
    pub fn advance(&mut self) -> Option<DateTime<Utc>> {
        let next = self.schedule.next_after(&self.last, self.tz)?;
        self.last = next;
        Some(next)
    }
}

/// Returns the delay from `wall` until the next fire of `schedule`.
#[must_use]
pub fn next_fire_delay(schedule: &CronSchedule, wall: DateTime<Utc>, tz: Tz) -> Option<Duration> {
    let next = schedule.next_after(&wall, tz)?;
    (next - wall).to_std().ok()
}

fn normalize_expression(expression: &str) -> anyhow::Result<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.len() {
        5 => Ok(format!(
            "0 {} {} {} {} {}",
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            normalize_day_of_week(fields[4]),
        )),
        6 | 7 => Ok(fields.join(" ")),
        n => anyhow::bail!("invalid cron expression '{expression}': expected 5, 6 or 7 fields, was {n}"),
    }
}

// Crontab numbers Sunday as 0 (or 7); names are unambiguous for the parser.
fn normalize_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|item| {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (item, None),
            };
            let range = range
                .split('-')
                .map(|token| {
                    token
                        .parse::<usize>()
                        .ok()
                        .and_then(|n| DAY_NAMES.get(n).copied())
                        .unwrap_or(token)
                })
                .collect::<Vec<_>>()
                .join("-");
            match step {
                Some(step) => format!("{range}/{step}"),
                None => range,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
