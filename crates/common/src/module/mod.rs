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

//! Module lifecycle: the [`Module`] trait and the [`ModuleRuntime`] that drives it.
//!
//! A strategy implements [`Module`] and is handed a [`ModuleRuntime`] at construction. The
//! runtime owns the module's routing tables exclusively; the strategy only declares callbacks.

pub mod runtime;
pub mod state;

#[cfg(test)]
mod tests;

use std::fmt::Debug;

use async_trait::async_trait;
use chrono_tz::Tz;

pub use self::{
    runtime::ModuleRuntime,
    state::{ModuleState, ModuleTrigger},
};
use crate::registry::{CallbackRegistry, ChannelEvent, RegistryError};

/// The timezone cron schedules are evaluated in unless configured otherwise.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Shanghai;

/// A unit of strategy logic driven by a [`ModuleRuntime`].
#[async_trait(?Send)]
pub trait Module: Debug {
    /// Returns the module name.
    fn name(&self) -> &str;

    /// Returns the runtime injected at construction.
    fn runtime(&self) -> &ModuleRuntime;

    /// Declares the module's channel handlers and cron jobs.
    ///
    /// # Errors
    ///
    /// Returns an error if the declared callbacks are inconsistent.
    fn callbacks(&self) -> Result<CallbackRegistry, RegistryError>;

    /// Installs the module's callbacks on its runtime, returning whether it is now installed.
    async fn install(&self) -> bool {
        match self.callbacks() {
            Ok(registry) => self.runtime().install(registry).await,
            Err(e) => {
                log::error!("{}: invalid callbacks: {e}", self.name());
                false
            }
        }
    }

    /// Uninstalls the module from its runtime.
    async fn uninstall(&self) {
        self.runtime().uninstall().await;
    }

    /// Dispatches `event` through the module's routing table.
    fn process_event(&self, event: ChannelEvent) -> bool {
        self.runtime().process_event(event)
    }
}
