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

//! The process configuration, loaded from TOML.

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trader_common::{cron::CronSchedule, logging::LoggingConfig, msgbus::BusConfig};
use trader_execution::{
    algorithm::MAX_TWAP_WINDOW,
    config::{AlgoEngineConfig, ConditionalEngineConfig, StopEngineConfig, is_even_interval},
};
use trader_risk::engine::config::RiskEngineConfig;
use trader_trading::sessions::SessionConfig;

/// An error loading or validating a [`TraderConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid cron expression '{expression}' for {field}: {reason}")]
    InvalidCron {
        field: &'static str,
        expression: String,
        reason: String,
    },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Configuration for the heartbeat module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// The cron expression the heartbeat fires on.
    pub cron: String,
}

impl Default for HeartbeatConfig {
    /// Creates a new default [`HeartbeatConfig`] instance.
    fn default() -> Self {
        Self {
            cron: "* * * * *".to_string(),
        }
    }
}

/// The configuration of a trader process.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraderConfig {
    pub risk: RiskEngineConfig,
    pub stop: StopEngineConfig,
    pub conditional: ConditionalEngineConfig,
    pub algo: AlgoEngineConfig,
    pub sessions: SessionConfig,
    pub bus: BusConfig,
    pub logging: LoggingConfig,
    pub heartbeat: HeartbeatConfig,
}

impl TraderConfig {
    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this config, or fails validation.
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(raw).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Overrides the Redis connection from `REDIS_HOST`, `REDIS_PORT`, `REDIS_USERNAME` and
    /// `REDIS_PASSWORD` when set.
    ///
    /// # Errors
    ///
    /// Returns an error if `REDIS_PORT` is not a port number.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("REDIS_HOST") {
            self.bus.host = Some(host);
        }
        if let Ok(port) = std::env::var("REDIS_PORT") {
            let port = port.parse().map_err(|e| ConfigError::InvalidValue {
                field: "REDIS_PORT",
                reason: format!("{e}"),
            })?;
            self.bus.port = Some(port);
        }
        if let Ok(username) = std::env::var("REDIS_USERNAME") {
            self.bus.username = Some(username);
        }
        if let Ok(password) = std::env::var("REDIS_PASSWORD") {
            self.bus.password = Some(password);
        }
        Ok(())
    }

    /// Checks ratios, limits and every cron expression the process will schedule.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ratio("risk.max_position_ratio", self.risk.max_position_ratio)?;
        check_ratio("risk.max_single_order_ratio", self.risk.max_single_order_ratio)?;
        check_ratio("risk.price_limit_buffer", self.risk.price_limit_buffer)?;
        check_ratio("stop.default_stop_loss_pct", self.stop.default_stop_loss_pct)?;
        check_ratio(
            "stop.default_take_profit_pct",
            self.stop.default_take_profit_pct,
        )?;

        if self.risk.max_order_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                field: "risk.max_order_per_minute",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.risk.rate_window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "risk.rate_window_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.sessions.day_close <= self.sessions.day_open {
            return Err(ConfigError::InvalidValue {
                field: "sessions.day_close",
                reason: format!(
                    "{} is not after day_open {}",
                    self.sessions.day_close, self.sessions.day_open
                ),
            });
        }

        check_interval("stop.check_interval_secs", self.stop.check_interval_secs)?;
        check_interval(
            "conditional.check_interval_secs",
            self.conditional.check_interval_secs,
        )?;
        if self.algo.default_duration().is_zero()
            || self.algo.default_duration() > MAX_TWAP_WINDOW
        {
            return Err(ConfigError::InvalidValue {
                field: "algo.default_duration_secs",
                reason: format!("must be within 1..={}", MAX_TWAP_WINDOW.as_secs()),
            });
        }

        check_cron("heartbeat.cron", &self.heartbeat.cron)?;
        Ok(())
    }
}

fn check_ratio(field: &'static str, value: Decimal) -> Result<(), ConfigError> {
    if value <= Decimal::ZERO || value > Decimal::ONE {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("{value} is not within (0, 1]"),
        });
    }
    Ok(())
}

fn check_interval(field: &'static str, secs: u64) -> Result<(), ConfigError> {
    if !is_even_interval(secs) {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("{secs} is not a divisor of 60 below 60"),
        });
    }
    Ok(())
}

fn check_cron(field: &'static str, expression: &str) -> Result<(), ConfigError> {
    CronSchedule::parse(expression)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidCron {
            field,
            expression: expression.to_string(),
            reason: e.to_string(),
        })
}
