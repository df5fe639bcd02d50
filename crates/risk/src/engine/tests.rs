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

use std::{rc::Rc, str::FromStr, time::Duration};

use chrono::TimeDelta;
use rstest::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use trader_common::{
    clock::TestClock,
    store::InMemoryStore,
    stubs::{store, test_clock},
};
use trader_model::{
    account::Account,
    enums::{Direction, OffsetFlag},
    identifiers::{AccountId, InstrumentId},
    instrument::Instrument,
    order::OrderIntent,
    stubs::{instrument_au, instrument_rb},
};
use trader_trading::sessions::TradingSessions;

use super::{RiskCheckResult, RiskCode, RiskEngine, config::RiskEngineConfig};

fn engine_with(
    config: RiskEngineConfig,
    store: &Rc<InMemoryStore>,
    clock: &Rc<TestClock>,
) -> RiskEngine {
    RiskEngine::new(
        config,
        store.clone(),
        clock.clone(),
        TradingSessions::default(),
    )
}

fn order(
    instrument: &Instrument,
    direction: Direction,
    offset: OffsetFlag,
    price: Decimal,
    volume: u64,
) -> OrderIntent {
    OrderIntent::new(
        AccountId::new("SIM-001"),
        instrument.id,
        direction,
        offset,
        price,
        volume,
    )
}

fn buy_open(instrument: &Instrument, price: Decimal, volume: u64) -> OrderIntent {
    order(instrument, Direction::Long, OffsetFlag::Open, price, volume)
}

fn assert_rejected(result: &RiskCheckResult, code: RiskCode) {
    assert!(!result.passed, "expected {code}, was passed");
    assert_eq!(result.code, Some(code), "{}", result.message);
}

#[rstest]
fn test_order_within_limits_passes(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    instrument_rb: Instrument,
) {
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);

    let result = engine.check(&buy_open(&instrument_rb, dec!(3500), 2));

    assert_eq!(result, RiskCheckResult::pass());
    assert_eq!(engine.order_count(&instrument_rb.id), 1);
}

#[rstest]
fn test_unknown_instrument_rejected(store: Rc<InMemoryStore>, test_clock: Rc<TestClock>) {
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);
    let unknown = Instrument::new(InstrumentId::new("xx9999"), "SHFE", dec!(1), dec!(1), 1);

    let result = engine.check(&buy_open(&unknown, dec!(100), 1));

    assert_rejected(&result, RiskCode::InstrumentStatus);
}

#[rstest]
fn test_delisted_instrument_rejected(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    mut instrument_rb: Instrument,
) {
    instrument_rb.is_trading = false;
    store.add_instrument(instrument_rb.clone());
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);

    let result = engine.check(&buy_open(&instrument_rb, dec!(3500), 1));

    assert_rejected(&result, RiskCode::InstrumentStatus);
}

#[rstest]
#[case::saturday(TimeDelta::days(4), false)]
#[case::before_open(TimeDelta::hours(-3), false)]
#[case::night_session(TimeDelta::hours(11), false)]
#[case::day_session(TimeDelta::hours(2), true)]
fn test_trading_time(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    instrument_rb: Instrument,
    #[case] offset_from_session: TimeDelta,
    #[case] expected: bool,
) {
    test_clock.jump_wall(offset_from_session);
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);

    let result = engine.check(&buy_open(&instrument_rb, dec!(3500), 1));

    assert_eq!(result.passed, expected, "{}", result.message);
    if !expected {
        assert_rejected(&result, RiskCode::TradingTime);
    }
}

#[rstest]
fn test_night_trade_instrument_accepted_in_evening(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    instrument_au: Instrument,
) {
    test_clock.jump_wall(TimeDelta::hours(11));
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);

    let result = engine.check(&order(
        &instrument_au,
        Direction::Short,
        OffsetFlag::Close,
        dec!(480),
        1,
    ));

    assert!(result.passed, "{}", result.message);

    test_clock.jump_wall(TimeDelta::days(4));
    let result = engine.check(&order(
        &instrument_au,
        Direction::Short,
        OffsetFlag::Close,
        dec!(480),
        1,
    ));
    assert_rejected(&result, RiskCode::TradingTime);
}

// Upper limit sits 0.05% and 0.2% of the price above a 4000 buy
#[rstest]
#[case::inside_buffer("4002", false)]
#[case::outside_buffer("4008", true)]
#[case::at_limit("4000", false)]
fn test_buy_price_limit_buffer(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    instrument_rb: Instrument,
    #[case] upper: &str,
    #[case] expected: bool,
) {
    let upper = Decimal::from_str(upper).unwrap();
    let instrument = instrument_rb.with_limits(dec!(3000), upper);
    store.add_instrument(instrument.clone());
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);

    let result = engine.check(&buy_open(&instrument, dec!(4000), 1));

    assert_eq!(result.passed, expected, "{}", result.message);
    if !expected {
        assert_rejected(&result, RiskCode::PriceLimit);
    }
}

#[rstest]
#[case::at_buffer(dec!(3203), false)]
#[case::clear_of_buffer(dec!(3210), true)]
fn test_sell_price_limit_buffer(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    instrument_rb: Instrument,
    #[case] price: Decimal,
    #[case] expected: bool,
) {
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);

    let result = engine.check(&order(
        &instrument_rb,
        Direction::Short,
        OffsetFlag::Open,
        price,
        1,
    ));

    assert_eq!(result.passed, expected, "{}", result.message);
    if !expected {
        assert_rejected(&result, RiskCode::PriceLimit);
    }
}

#[rstest]
fn test_buy_ignores_lower_limit(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    instrument_rb: Instrument,
) {
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);

    let result = engine.check(&buy_open(&instrument_rb, dec!(3200), 1));

    assert!(result.passed, "{}", result.message);
}

#[rstest]
#[case::zero(0)]
#[case::above_max(501)]
fn test_order_size_rejected(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    instrument_rb: Instrument,
    #[case] volume: u64,
) {
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);

    let result = engine.check(&order(
        &instrument_rb,
        Direction::Long,
        OffsetFlag::Close,
        dec!(3500),
        volume,
    ));

    assert_rejected(&result, RiskCode::OrderSize);
}

#[rstest]
fn test_position_limit_counts_existing_volume(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    instrument_rb: Instrument,
) {
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);

    // Two lots already held long against a limit of 100
    let result = engine.check(&buy_open(&instrument_rb, dec!(3500), 99));
    assert_rejected(&result, RiskCode::PositionLimit);

    let result = engine.check(&buy_open(&instrument_rb, dec!(3500), 98));
    assert_ne!(result.code, Some(RiskCode::PositionLimit));
}

#[rstest]
fn test_missing_account_is_margin_insufficient(
    test_clock: Rc<TestClock>,
    instrument_rb: Instrument,
) {
    let store = Rc::new(InMemoryStore::new());
    store.add_instrument(instrument_rb.clone());
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);

    let result = engine.check(&buy_open(&instrument_rb, dec!(3500), 1));

    assert_rejected(&result, RiskCode::MarginInsufficient);
}

#[rstest]
#[case::naive_available(dec!(1_000_000), dec!(5_000), RiskCode::MarginInsufficient)]
#[case::utilization(dec!(1_000_000), dec!(40_000), RiskCode::MarginInsufficient)]
#[case::single_order_cap(dec!(60_000), dec!(60_000), RiskCode::OrderSize)]
fn test_capital_checks(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    instrument_rb: Instrument,
    #[case] balance: Decimal,
    #[case] available: Decimal,
    #[case] code: RiskCode,
) {
    store.add_account(Account::new(AccountId::new("SIM-001"), balance, available));
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);

    // Two lots reserve 7,000
    let result = engine.check(&buy_open(&instrument_rb, dec!(3500), 2));

    assert_rejected(&result, code);
}

#[rstest]
fn test_closing_order_skips_capital_checks(test_clock: Rc<TestClock>, instrument_rb: Instrument) {
    let store = Rc::new(InMemoryStore::new());
    store.add_instrument(instrument_rb.clone());
    let engine = engine_with(RiskEngineConfig::default(), &store, &test_clock);

    let result = engine.check(&order(
        &instrument_rb,
        Direction::Short,
        OffsetFlag::Close,
        dec!(3500),
        200,
    ));

    assert!(result.passed, "{}", result.message);
}

#[rstest]
fn test_failed_check_does_not_consume_rate_capacity(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    instrument_rb: Instrument,
) {
    let config = RiskEngineConfig {
        max_order_per_minute: 1,
        ..Default::default()
    };
    let engine = engine_with(config, &store, &test_clock);

    assert_rejected(
        &engine.check(&buy_open(&instrument_rb, dec!(3500), 0)),
        RiskCode::OrderSize,
    );
    assert_rejected(
        &engine.check(&buy_open(&instrument_rb, dec!(3799), 1)),
        RiskCode::PriceLimit,
    );
    assert_rejected(
        &engine.check(&buy_open(&instrument_rb, dec!(3500), 99)),
        RiskCode::PositionLimit,
    );
    assert_eq!(engine.order_count(&instrument_rb.id), 0);

    assert!(engine.check(&buy_open(&instrument_rb, dec!(3500), 1)).passed);
    assert_eq!(engine.order_count(&instrument_rb.id), 1);
}

#[rstest]
fn test_rate_limit_window(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    instrument_rb: Instrument,
    instrument_au: Instrument,
) {
    let limit = 5;
    let config = RiskEngineConfig {
        max_order_per_minute: limit,
        ..Default::default()
    };
    let engine = engine_with(config, &store, &test_clock);
    let buy = buy_open(&instrument_rb, dec!(3500), 1);

    for i in 0..limit {
        let result = engine.check(&buy);
        assert!(result.passed, "order {i}: {}", result.message);
        test_clock.advance(Duration::from_secs(5));
    }

    let result = engine.check(&buy);
    assert_rejected(&result, RiskCode::RateLimit);

    // Other instruments keep their own window
    let gold = order(
        &instrument_au,
        Direction::Long,
        OffsetFlag::Close,
        dec!(480),
        1,
    );
    assert!(engine.check(&gold).passed);

    // The first order was accepted 25s ago
    test_clock.advance(Duration::from_secs(34));
    assert_rejected(&engine.check(&buy), RiskCode::RateLimit);

    test_clock.advance(Duration::from_secs(1));
    assert!(engine.check(&buy).passed);
    assert_eq!(engine.order_count(&instrument_rb.id), limit);
}

#[rstest]
fn test_reset_rate_limit(
    store: Rc<InMemoryStore>,
    test_clock: Rc<TestClock>,
    instrument_rb: Instrument,
) {
    let config = RiskEngineConfig {
        max_order_per_minute: 1,
        ..Default::default()
    };
    let engine = engine_with(config, &store, &test_clock);
    let buy = buy_open(&instrument_rb, dec!(3500), 1);

    assert!(engine.check(&buy).passed);
    assert_rejected(&engine.check(&buy), RiskCode::RateLimit);

    engine.reset_rate_limit(Some(&instrument_rb.id));
    assert!(engine.check(&buy).passed);

    engine.reset_rate_limit(None);
    assert_eq!(engine.order_count(&instrument_rb.id), 0);
}

#[rstest]
#[case(RiskCode::PositionLimit, "RISK_001")]
#[case(RiskCode::MarginInsufficient, "RISK_002")]
#[case(RiskCode::PriceLimit, "RISK_003")]
#[case(RiskCode::InstrumentStatus, "RISK_004")]
#[case(RiskCode::OrderSize, "RISK_005")]
#[case(RiskCode::RateLimit, "RISK_006")]
#[case(RiskCode::TradingTime, "RISK_007")]
fn test_risk_code_serialization(#[case] code: RiskCode, #[case] expected: &str) {
    assert_eq!(code.to_string(), expected);
    assert_eq!(RiskCode::from_str(expected).unwrap(), code);
    assert_eq!(
        serde_json::to_string(&code).unwrap(),
        format!("\"{expected}\"")
    );
}

#[rstest]
fn test_config_deserializes_partial_toml_values() {
    let config: RiskEngineConfig =
        serde_json::from_str(r#"{"max_order_per_minute": 10, "price_limit_buffer": 0.002}"#)
            .unwrap();

    assert_eq!(config.max_order_per_minute, 10);
    assert_eq!(config.price_limit_buffer, dec!(0.002));
    assert_eq!(config.max_position_ratio, dec!(0.95));
    assert_eq!(config.rate_window(), Duration::from_secs(60));
}
