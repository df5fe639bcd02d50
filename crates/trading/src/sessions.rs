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

//! Provides utilities for determining futures trading session times.
//!
//! The day session runs Monday to Friday between the configured open and close in the exchange
//! timezone (by default 08:00-15:00 Asia/Shanghai). Instruments flagged for night trading are
//! considered tradable at any time on a weekday.

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

const DAY_OPEN: NaiveTime = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
const DAY_CLOSE: NaiveTime = NaiveTime::from_hms_opt(15, 0, 0).unwrap();

/// Configuration for the trading session calendar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// The exchange timezone.
    pub timezone: Tz,
    /// The local day session open (inclusive).
    pub day_open: NaiveTime,
    /// The local day session close (exclusive).
    pub day_close: NaiveTime,
}

impl Default for SessionConfig {
    /// Creates a new default [`SessionConfig`] instance.
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Shanghai,
            day_open: DAY_OPEN,
            day_close: DAY_CLOSE,
        }
    }
}

/// A weekday session calendar in a single exchange timezone.
#[derive(Clone, Debug)]
pub struct TradingSessions {
    config: SessionConfig,
}

impl TradingSessions {
    #[must_use]
    pub const fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.config.timezone
    }

    /// Converts a UTC timestamp to exchange local time.
    #[must_use]
    pub fn local_from_utc(&self, time_now: DateTime<Utc>) -> DateTime<Tz> {
        self.config
            .timezone
            .from_utc_datetime(&time_now.naive_utc())
    }

    /// Returns whether `time_now` falls on a Saturday or Sunday in exchange time.
    #[must_use]
    pub fn is_weekend(&self, time_now: DateTime<Utc>) -> bool {
        matches!(
            self.local_from_utc(time_now).weekday(),
            Weekday::Sat | Weekday::Sun
        )
    }

    /// Returns whether `time_now` is inside the day session.
    #[must_use]
    pub fn in_day_session(&self, time_now: DateTime<Utc>) -> bool {
        let local = self.local_from_utc(time_now).time();
        !self.is_weekend(time_now) && local >= self.config.day_open && local < self.config.day_close
    }

    /// Returns whether an instrument may trade at `time_now`.
    #[must_use]
    pub fn is_trading_time(&self, time_now: DateTime<Utc>, night_trade: bool) -> bool {
        if self.is_weekend(time_now) {
            return false;
        }
        night_trade || self.in_day_session(time_now)
    }
}

impl Default for TradingSessions {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Asia::Shanghai;
    use rstest::rstest;

    use super::*;

    fn shanghai(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        // January 2024: the 1st is a Monday
        Shanghai
            .with_ymd_and_hms(2024, 1, day, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[rstest]
    #[case(shanghai(2, 10, 0), false, true)]
    #[case(shanghai(2, 8, 0), false, true)]
    #[case(shanghai(2, 7, 59), false, false)]
    #[case(shanghai(2, 14, 59), false, true)]
    #[case(shanghai(2, 15, 0), false, false)]
    #[case(shanghai(2, 21, 30), false, false)]
    #[case(shanghai(2, 21, 30), true, true)]
    #[case(shanghai(6, 10, 0), false, false)]
    #[case(shanghai(6, 10, 0), true, false)]
    #[case(shanghai(7, 21, 0), true, false)]
    fn test_is_trading_time(
        #[case] time_now: DateTime<Utc>,
        #[case] night_trade: bool,
        #[case] expected: bool,
    ) {
        let sessions = TradingSessions::default();
        assert_eq!(sessions.is_trading_time(time_now, night_trade), expected);
    }

    #[rstest]
    fn test_session_config_serde() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"timezone": "Asia/Tokyo", "day_open": "09:00:00"}"#)
                .unwrap();
        assert_eq!(config.timezone, chrono_tz::Asia::Tokyo);
        assert_eq!(config.day_open, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(config.day_close, DAY_CLOSE);
    }
}
