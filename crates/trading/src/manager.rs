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

//! Orchestration of several modules in one process.

use std::{cell::RefCell, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;
use serde_json::Value;
use trader_common::module::{Module, ModuleState};
use ustr::Ustr;

/// Owns a set of named modules and starts or stops them together.
///
/// Also carries a shared context map modules may use to publish values to one another.
#[derive(Debug, Default)]
pub struct ModuleManager {
    modules: IndexMap<Ustr, Rc<dyn Module>>,
    shared: RefCell<AHashMap<String, Value>>,
}

impl ModuleManager {
    /// Creates a new empty [`ModuleManager`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `module` under its name.
    ///
    /// # Errors
    ///
    /// Returns an error if a module with the same name is already registered.
    pub fn register(&mut self, module: Rc<dyn Module>) -> anyhow::Result<()> {
        let name = Ustr::from(module.name());
        anyhow::ensure!(
            !self.modules.contains_key(&name),
            "Module '{name}' already registered"
        );
        self.modules.insert(name, module);
        log::info!("Registered module '{name}'");
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Rc<dyn Module>> {
        self.modules.get(&Ustr::from(name)).cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<Ustr> {
        self.modules.keys().copied().collect()
    }

    /// Installs the module `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the module is unknown or fails to install.
    pub async fn start(&self, name: &str) -> anyhow::Result<()> {
        let module = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Module '{name}' not registered"))?;
        if module.runtime().is_installed() {
            log::warn!("Module '{name}' already running");
            return Ok(());
        }
        anyhow::ensure!(module.install().await, "Module '{name}' failed to install");
        Ok(())
    }

    /// Uninstalls the module `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the module is unknown.
    pub async fn stop(&self, name: &str) -> anyhow::Result<()> {
        let module = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Module '{name}' not registered"))?;
        module.uninstall().await;
        Ok(())
    }

    /// Starts every registered module, returning how many are running afterwards.
    pub async fn start_all(&self) -> usize {
        for name in self.names() {
            if let Err(e) = self.start(&name).await {
                log::error!("{e}");
            }
        }
        self.modules
            .values()
            .filter(|m| m.runtime().is_installed())
            .count()
    }

    /// Stops every registered module in reverse registration order.
    pub async fn stop_all(&self) {
        for module in self.modules.values().rev() {
            module.uninstall().await;
        }
    }

    /// Returns the lifecycle state of each module, in registration order.
    #[must_use]
    pub fn status(&self) -> IndexMap<Ustr, ModuleState> {
        self.modules
            .iter()
            .map(|(name, module)| (*name, module.runtime().state()))
            .collect()
    }

    pub fn set_shared(&self, key: &str, value: Value) {
        self.shared.borrow_mut().insert(key.to_string(), value);
    }

    #[must_use]
    pub fn get_shared(&self, key: &str) -> Option<Value> {
        self.shared.borrow().get(key).cloned()
    }

    pub fn remove_shared(&self, key: &str) -> Option<Value> {
        self.shared.borrow_mut().remove(key)
    }
}
