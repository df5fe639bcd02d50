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

//! Common componentry for the futures trading control plane.
//!
//! The `trader-common` crate provides the foundation every trading module runs on:
//!
//! - [`clock`]: wall-clock and monotonic time sources.
//! - [`cron`]: cron parsing and wall-clock to monotonic deadline translation.
//! - [`msgbus`]: the message bus contract and an in-memory implementation.
//! - [`registry`]: explicit channel/cron callback registration.
//! - [`module`]: the module lifecycle trait and its runtime.
//! - [`store`]: the entity store contract.
//! - [`logging`]: process logger initialization.
//!
//! # Feature flags
//!
//! - `stubs`: Enables type stubs for use in testing scenarios.

#![warn(rustc::all)]
#![deny(unsafe_code)]
#![deny(nonstandard_style)]
#![deny(missing_debug_implementations)]
#![deny(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod clock;
pub mod cron;
pub mod logging;
pub mod module;
pub mod msgbus;
pub mod registry;
pub mod store;

#[cfg(any(test, feature = "stubs"))]
pub mod stubs;
