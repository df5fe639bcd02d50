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

//! Order supervision engines for the futures trading control plane.
//!
//! Once the risk gate accepts a trade, the engines in this crate take over:
//!
//! - [`protection::StopEngine`] watches open positions for stop-loss, take-profit, trailing, ATR
//!   and time exits.
//! - [`conditional::ConditionalOrderEngine`] fires orders when combinations of price, time,
//!   position and drawdown conditions hold, and drives iceberg slicing.
//! - [`algorithm::AlgoEngine`] slices large orders over time (TWAP, VWAP) or fires them at the
//!   touch (snapshot).
//!
//! None of the engines talk to an exchange. Orders leave through an [`placer::OrderPlacer`]
//! supplied by the caller, and prices come from a [`market::MarketDataProvider`].
//!
//! # Feature flags
//!
//! - `stubs`: Enables type stubs (`rstest` fixtures) for use in testing scenarios.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod algorithm;
pub mod conditional;
pub mod config;
pub mod market;
pub mod placer;
pub mod protection;
pub mod trailing;

#[cfg(any(test, feature = "stubs"))]
pub mod stubs;
