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

//! Module lifecycle state machine.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// The lifecycle state of a module runtime.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
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
#[strum(ascii_case_insensitive)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleState {
    #[default]
    Uninstalled,
    Installing,
    Installed,
    Uninstalling,
}

/// A trigger which moves a [`ModuleState`].
#[derive(Copy, Clone, Debug, Display, Hash, PartialEq, Eq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ModuleTrigger {
    Install,
    InstallCompleted,
    InstallFailed,
    Uninstall,
    UninstallCompleted,
}

impl ModuleState {
    /// Transition the state machine with the module `trigger`.
    ///
    /// # Errors
    ///
    /// Returns an error if `trigger` is invalid for the current state.
    pub fn transition(self, trigger: ModuleTrigger) -> anyhow::Result<Self> {
        let new_state = match (self, trigger) {
            (Self::Uninstalled, ModuleTrigger::Install) => Self::Installing,
            (Self::Installing, ModuleTrigger::InstallCompleted) => Self::Installed,
            (Self::Installing, ModuleTrigger::InstallFailed) => Self::Uninstalled,
            (Self::Installed, ModuleTrigger::Uninstall) => Self::Uninstalling,
            (Self::Uninstalling, ModuleTrigger::UninstallCompleted) => Self::Uninstalled,
            _ => anyhow::bail!("Invalid state trigger {self} -> {trigger}"),
        };
        Ok(new_state)
    }

    /// Returns whether timers and messages should still be dispatched.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Installing | Self::Installed)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ModuleState::Uninstalled, ModuleTrigger::Install, ModuleState::Installing)]
    #[case(ModuleState::Installing, ModuleTrigger::InstallCompleted, ModuleState::Installed)]
    #[case(ModuleState::Installing, ModuleTrigger::InstallFailed, ModuleState::Uninstalled)]
    #[case(ModuleState::Installed, ModuleTrigger::Uninstall, ModuleState::Uninstalling)]
    #[case(ModuleState::Uninstalling, ModuleTrigger::UninstallCompleted, ModuleState::Uninstalled)]
    fn test_valid_transitions(
        #[case] state: ModuleState,
        #[case] trigger: ModuleTrigger,
        #[case] expected: ModuleState,
    ) {
        assert_eq!(state.transition(trigger).unwrap(), expected);
    }

    #[rstest]
    #[case(ModuleState::Installed, ModuleTrigger::Install)]
    #[case(ModuleState::Installing, ModuleTrigger::Install)]
    #[case(ModuleState::Uninstalled, ModuleTrigger::Uninstall)]
    #[case(ModuleState::Installing, ModuleTrigger::Uninstall)]
    #[case(ModuleState::Uninstalling, ModuleTrigger::InstallCompleted)]
    fn test_invalid_transitions(#[case] state: ModuleState, #[case] trigger: ModuleTrigger) {
        let err = state.transition(trigger).unwrap_err();
        assert!(err.to_string().starts_with("Invalid state trigger"));
    }

    #[rstest]
    fn test_is_active() {
        assert!(!ModuleState::Uninstalled.is_active());
        assert!(ModuleState::Installing.is_active());
        assert!(ModuleState::Installed.is_active());
        assert!(!ModuleState::Uninstalling.is_active());
    }
}
