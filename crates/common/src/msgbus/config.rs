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

//! Configuration for message bus connections.

use serde::{Deserialize, Serialize};

/// Configuration for the message bus backing connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// The bus host address. If `None`, the typical default should be used.
    pub host: Option<String>,
    /// The bus port. If `None`, the typical default should be used.
    pub port: Option<u16>,
    /// The account username for the connection.
    pub username: Option<String>,
    /// The account password for the connection.
    pub password: Option<String>,
    /// If the connection should be SSL-enabled.
    pub ssl: bool,
    /// The timeout (in seconds) to wait for a new connection.
    pub connection_timeout: u16,
    /// The timeout (in seconds) to wait for a response.
    pub response_timeout: u16,
    /// The number of retry attempts with exponential backoff for connection attempts.
    pub number_of_retries: usize,
    /// The base value for exponential backoff calculation.
    pub exponent_base: u64,
    /// The maximum delay between retry attempts (in seconds).
    pub max_delay: u64,
    /// The multiplication factor for retry delay calculation.
    pub factor: u64,
    /// The prefix of request/response channels, e.g. `MSG:CTP`.
    pub channel_prefix: String,
}

impl Default for BusConfig {
    /// Creates a new default [`BusConfig`] instance.
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            username: None,
            password: None,
            ssl: false,
            connection_timeout: 20,
            response_timeout: 20,
            number_of_retries: 100,
            exponent_base: 2,
            max_delay: 1000,
            factor: 2,
            channel_prefix: "MSG:CTP".to_string(),
        }
    }
}

impl BusConfig {
    /// Returns the request channel pattern, e.g. `MSG:CTP:REQ:*`.
    #[must_use]
    pub fn request_pattern(&self) -> String {
        format!("{}:REQ:*", self.channel_prefix)
    }

    /// Returns the response channel for `suffix`, e.g. `MSG:CTP:RSP:MARKET:rb2510`.
    #[must_use]
    pub fn response_channel(&self, suffix: &str) -> String {
        format!("{}:RSP:{suffix}", self.channel_prefix)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    fn test_default_bus_config() {
        let config = BusConfig::default();
        assert_eq!(config.host, None);
        assert_eq!(config.port, None);
        assert!(!config.ssl);
        assert_eq!(config.connection_timeout, 20);
        assert_eq!(config.request_pattern(), "MSG:CTP:REQ:*");
        assert_eq!(
            config.response_channel("MARKET:rb2510"),
            "MSG:CTP:RSP:MARKET:rb2510"
        );
    }

    #[rstest]
    fn test_deserialize_partial_bus_config() {
        let config: BusConfig = serde_json::from_str(
            r#"{"host": "redis.local", "port": 6380, "channel_prefix": "MSG:SIM"}"#,
        )
        .unwrap();
        assert_eq!(config.host.as_deref(), Some("redis.local"));
        assert_eq!(config.port, Some(6380));
        assert_eq!(config.number_of_retries, 100);
        assert_eq!(config.request_pattern(), "MSG:SIM:REQ:*");
    }
}
