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

//! Provides a pre-trade `RiskEngine`.
//!
//! Every order passes through an ordered pipeline of checks. The first failing check returns its
//! specific [`RiskCode`], and nothing after it runs, so a rejected order never consumes rate
//! capacity.

pub mod config;

#[cfg(test)]
mod tests;

use std::{cell::RefCell, fmt::Debug, rc::Rc};

use config::RiskEngineConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use trader_common::{clock::Clock, store::EntityStore};
use trader_model::{
    account::Account, enums::Direction, identifiers::InstrumentId, instrument::Instrument,
    order::OrderIntent,
};
use trader_trading::sessions::TradingSessions;

use crate::throttler::RateWindow;

/// The reason an order was rejected.
#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    Hash,
    PartialEq,
    Eq,
    AsRefStr,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum RiskCode {
    /// The order would take the position above the instrument maximum.
    #[strum(serialize = "RISK_001")]
    #[serde(rename = "RISK_001")]
    PositionLimit,
    /// The account cannot fund the required margin.
    #[strum(serialize = "RISK_002")]
    #[serde(rename = "RISK_002")]
    MarginInsufficient,
    /// The price is too close to a daily price limit.
    #[strum(serialize = "RISK_003")]
    #[serde(rename = "RISK_003")]
    PriceLimit,
    /// The instrument is unknown or not trading.
    #[strum(serialize = "RISK_004")]
    #[serde(rename = "RISK_004")]
    InstrumentStatus,
    /// The volume is zero or too large.
    #[strum(serialize = "RISK_005")]
    #[serde(rename = "RISK_005")]
    OrderSize,
    /// Too many orders were accepted for the instrument within the rate window.
    #[strum(serialize = "RISK_006")]
    #[serde(rename = "RISK_006")]
    RateLimit,
    /// The instrument is outside its trading session.
    #[strum(serialize = "RISK_007")]
    #[serde(rename = "RISK_007")]
    TradingTime,
}

/// The outcome of a risk check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCheckResult {
    pub passed: bool,
    pub message: String,
    pub code: Option<RiskCode>,
}

impl RiskCheckResult {
    #[must_use]
    pub fn pass() -> Self {
        Self {
            passed: true,
            message: "Risk check passed".to_string(),
            code: None,
        }
    }

    #[must_use]
    pub fn reject(code: RiskCode, message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            code: Some(code),
        }
    }
}

type CheckOutcome<T> = Result<T, RiskCheckResult>;

/// Validates orders against instrument, session, capital and rate limits.
pub struct RiskEngine {
    config: RiskEngineConfig,
    store: Rc<dyn EntityStore>,
    clock: Rc<dyn Clock>,
    sessions: TradingSessions,
    throttler: RefCell<RateWindow<InstrumentId>>,
}

impl Debug for RiskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(RiskEngine))
            .field("config", &self.config)
            .finish()
    }
}

impl RiskEngine {
    /// Creates a new [`RiskEngine`] instance.
    #[must_use]
    pub fn new(
        config: RiskEngineConfig,
        store: Rc<dyn EntityStore>,
        clock: Rc<dyn Clock>,
        sessions: TradingSessions,
    ) -> Self {
        let throttler = RateWindow::new(config.max_order_per_minute, config.rate_window());
        Self {
            config,
            store,
            clock,
            sessions,
            throttler: RefCell::new(throttler),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RiskEngineConfig {
        &self.config
    }

    /// Returns the number of orders counted for `instrument_id` in the current window.
    #[must_use]
    pub fn order_count(&self, instrument_id: &InstrumentId) -> usize {
        let mut throttler = self.throttler.borrow_mut();
        throttler.prune(self.clock.loop_now());
        throttler.count(instrument_id)
    }

    /// Clears the rate window for one instrument, or for all instruments when `None`.
    pub fn reset_rate_limit(&self, instrument_id: Option<&InstrumentId>) {
        let mut throttler = self.throttler.borrow_mut();
        match instrument_id {
            Some(id) => throttler.reset(id),
            None => throttler.reset_all(),
        }
    }

    /// Runs the full check pipeline for `order`.
    ///
    /// An accepted order is counted against the instrument's rate window.
    pub fn check(&self, order: &OrderIntent) -> RiskCheckResult {
        match self.run_checks(order) {
            Ok(()) => {
                log::debug!("Order {order} passed risk checks");
                RiskCheckResult::pass()
            }
            Err(rejection) => {
                if let Some(code) = rejection.code {
                    log::warn!("Order {order} DENIED: [{code}] {}", rejection.message);
                }
                rejection
            }
        }
    }

    fn run_checks(&self, order: &OrderIntent) -> CheckOutcome<()> {
        let instrument = self.check_instrument_status(&order.instrument_id)?;
        self.check_trading_time(&instrument)?;
        self.check_price_limit(&instrument, order)?;
        self.check_order_size(&instrument, order.volume)?;

        if order.is_open() {
            let account = self.check_position_limit(&instrument, order)?;
            self.check_margin(&instrument, &account, order.volume)?;
        }

        self.check_rate_limit(&order.instrument_id)
    }

    fn check_instrument_status(&self, instrument_id: &InstrumentId) -> CheckOutcome<Instrument> {
        match self.store.instrument(instrument_id) {
            Some(instrument) if instrument.is_trading => Ok(instrument),
            Some(_) => Err(RiskCheckResult::reject(
                RiskCode::InstrumentStatus,
                format!("Instrument {instrument_id} is not trading"),
            )),
            None => Err(RiskCheckResult::reject(
                RiskCode::InstrumentStatus,
                format!("Instrument {instrument_id} not found"),
            )),
        }
    }

    fn check_trading_time(&self, instrument: &Instrument) -> CheckOutcome<()> {
        let time_now = self.clock.utc_now();

        if self.sessions.is_weekend(time_now) {
            return Err(RiskCheckResult::reject(
                RiskCode::TradingTime,
                "Market closed for the weekend",
            ));
        }

        if !self
            .sessions
            .is_trading_time(time_now, instrument.night_trade)
        {
            return Err(RiskCheckResult::reject(
                RiskCode::TradingTime,
                format!("{} is outside its trading session", instrument.id),
            ));
        }

        Ok(())
    }

    fn check_price_limit(&self, instrument: &Instrument, order: &OrderIntent) -> CheckOutcome<()> {
        let buffer = order.price * self.config.price_limit_buffer;

        match order.direction {
            Direction::Long => {
                if let Some(upper) = instrument.upper_limit
                    && order.price >= upper - buffer
                {
                    return Err(RiskCheckResult::reject(
                        RiskCode::PriceLimit,
                        format!("Buy price {} is at or near the upper limit {upper}", order.price),
                    ));
                }
            }
            Direction::Short => {
                if let Some(lower) = instrument.lower_limit
                    && order.price <= lower + buffer
                {
                    return Err(RiskCheckResult::reject(
                        RiskCode::PriceLimit,
                        format!("Sell price {} is at or near the lower limit {lower}", order.price),
                    ));
                }
            }
        }

        Ok(())
    }

    fn check_order_size(&self, instrument: &Instrument, volume: u64) -> CheckOutcome<()> {
        if volume == 0 {
            return Err(RiskCheckResult::reject(
                RiskCode::OrderSize,
                "Order volume must be positive",
            ));
        }

        if volume > instrument.max_order_volume {
            return Err(RiskCheckResult::reject(
                RiskCode::OrderSize,
                format!(
                    "Order volume {volume} exceeds the maximum {}",
                    instrument.max_order_volume
                ),
            ));
        }

        Ok(())
    }

    fn check_position_limit(
        &self,
        instrument: &Instrument,
        order: &OrderIntent,
    ) -> CheckOutcome<Account> {
        let current =
            self.store
                .position_volume(&order.account_id, &instrument.id, order.direction);

        if current.saturating_add(order.volume) > instrument.max_position {
            return Err(RiskCheckResult::reject(
                RiskCode::PositionLimit,
                format!(
                    "Position {current} + {} exceeds the limit {}",
                    order.volume, instrument.max_position
                ),
            ));
        }

        let Some(account) = self.store.account(&order.account_id) else {
            return Err(RiskCheckResult::reject(
                RiskCode::MarginInsufficient,
                format!("Account {} not found", order.account_id),
            ));
        };

        let required = instrument.margin_for(order.volume);
        if account.available - required < Decimal::ZERO {
            return Err(RiskCheckResult::reject(
                RiskCode::MarginInsufficient,
                format!(
                    "Available {} is below the required margin {required}",
                    account.available
                ),
            ));
        }

        Ok(account)
    }

    fn check_margin(
        &self,
        instrument: &Instrument,
        account: &Account,
        volume: u64,
    ) -> CheckOutcome<()> {
        let required = instrument.margin_for(volume);

        if required > account.available {
            return Err(RiskCheckResult::reject(
                RiskCode::MarginInsufficient,
                format!(
                    "Required margin {required} exceeds available {}",
                    account.available
                ),
            ));
        }

        let single_order_cap = account.balance * self.config.max_single_order_ratio;
        if required > single_order_cap {
            return Err(RiskCheckResult::reject(
                RiskCode::OrderSize,
                format!("Required margin {required} exceeds the single order cap {single_order_cap}"),
            ));
        }

        match account.utilization() {
            Some(ratio) if ratio <= self.config.max_position_ratio => Ok(()),
            Some(ratio) => Err(RiskCheckResult::reject(
                RiskCode::MarginInsufficient,
                format!(
                    "Capital utilization {ratio} exceeds the maximum {}",
                    self.config.max_position_ratio
                ),
            )),
            None => Err(RiskCheckResult::reject(
                RiskCode::MarginInsufficient,
                format!("Account {} has no balance", account.id),
            )),
        }
    }

    fn check_rate_limit(&self, instrument_id: &InstrumentId) -> CheckOutcome<()> {
        let now = self.clock.loop_now();
        self.throttler
            .borrow_mut()
            .try_acquire(*instrument_id, now)
            .map(|_| ())
            .map_err(|count| {
                RiskCheckResult::reject(
                    RiskCode::RateLimit,
                    format!(
                        "{count} orders for {instrument_id} within {}s, limit is {}",
                        self.config.rate_window_secs, self.config.max_order_per_minute
                    ),
                )
            })
    }
}
