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

//! Domain model for the futures trading control plane.
//!
//! The `trader-model` crate defines the value types shared by the runtime, the risk gate and the
//! order supervision engines: directions and offsets, identifiers, instruments, order intents,
//! positions, accounts and closed trades.
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

pub mod account;
pub mod enums;
pub mod identifiers;
pub mod instrument;
pub mod order;
pub mod position;
pub mod trade;

#[cfg(any(test, feature = "stubs"))]
pub mod stubs;
