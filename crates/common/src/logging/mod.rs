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

//! The logging setup for trader processes.
//!
//! Library code logs through the `log` facade; infrastructure code logs through `tracing`.
//! [`init_logging`] installs a single `tracing` subscriber which also captures `log` records.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

pub const RECV: &str = "<--";
pub const SEND: &str = "-->";

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Configuration for the process logger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// The filter directive, e.g. `info` or `info,trader_risk=debug`.
    /// Overridden by the `RUST_LOG` environment variable when set.
    pub level: String,
    /// If ANSI colors are written.
    pub colors: bool,
    /// If the log target (module path) is written.
    pub targets: bool,
}

impl Default for LoggingConfig {
    /// Creates a new default [`LoggingConfig`] instance.
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            colors: true,
            targets: true,
        }
    }
}

/// Returns whether the process logger has been initialized.
pub fn logging_is_initialized() -> bool {
    LOGGING_INITIALIZED.load(Ordering::Relaxed)
}

/// Initializes the process logger from `config`.
///
/// # Errors
///
/// Returns an error if:
/// - The level directive is invalid.
/// - A global logger has already been installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.colors)
        .with_target(config.targets)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    LOGGING_INITIALIZED.store(true, Ordering::Relaxed);
    log::debug!("Logging initialized with '{}'", config.level);
    Ok(())
}
