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

//! Redis connection helpers and the Redis backed [`msgbus::RedisMessageBus`].

pub mod msgbus;

use std::time::Duration;

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use semver::Version;
use trader_common::msgbus::BusConfig;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 6379;

/// The oldest supported server version.
const MIN_SERVER_VERSION: Version = Version::new(6, 2, 0);

// Keeps the first and last two characters of longer passwords
fn redact(password: &str) -> String {
    match password.len() {
        0..=4 => password.to_string(),
        n => format!("{}...{}", &password[..2], &password[n - 2..]),
    }
}

/// Builds the connection URL for `config`, returning it together with a copy safe for logging.
///
/// A password may be given without a username (`:pass@`), but not the reverse.
///
/// # Errors
///
/// Returns an error if a username is configured without a password.
pub fn get_redis_url(config: &BusConfig) -> anyhow::Result<(String, String)> {
    let scheme = if config.ssl { "rediss" } else { "redis" };
    let host = config.host.as_deref().unwrap_or(DEFAULT_HOST);
    let port = config.port.unwrap_or(DEFAULT_PORT);
    let username = config.username.as_deref().unwrap_or_default();
    let password = config.password.as_deref().unwrap_or_default();

    if password.is_empty() {
        if !username.is_empty() {
            anyhow::bail!(
                "Redis username supplied without password, supply a password or omit the username"
            );
        }
        let url = format!("{scheme}://{host}:{port}");
        return Ok((url.clone(), url));
    }

    let url = format!("{scheme}://{username}:{password}@{host}:{port}");
    let redacted = format!("{scheme}://{username}:{}@{host}:{port}", redact(password));
    Ok((url, redacted))
}

/// Opens a Redis client for `config`.
///
/// # Errors
///
/// Returns an error if the URL is invalid.
pub fn create_redis_client(config: &BusConfig) -> anyhow::Result<redis::Client> {
    let (url, redacted) = get_redis_url(config)?;
    tracing::debug!("Opening Redis client for {redacted}");
    Ok(redis::Client::open(url)?)
}

// Retries back off as `rand(0 .. factor * exponent_base ^ attempt)`, capped at `max_delay`
fn manager_config(config: &BusConfig) -> ConnectionManagerConfig {
    ConnectionManagerConfig::new()
        .set_number_of_retries(config.number_of_retries)
        .set_exponent_base(config.exponent_base)
        .set_factor(config.factor)
        .set_max_delay(config.max_delay.saturating_mul(1000))
        .set_connection_timeout(Duration::from_secs(config.connection_timeout.into()))
        .set_response_timeout(Duration::from_secs(config.response_timeout.into()))
}

/// Opens a reconnecting connection named `con_name` and logs the server version.
///
/// Servers older than 6.2 are logged as unsupported but still returned.
///
/// # Errors
///
/// Returns an error if the connection cannot be established or the server version cannot be read.
pub async fn create_redis_connection(
    con_name: &str,
    client: &redis::Client,
    config: &BusConfig,
) -> anyhow::Result<ConnectionManager> {
    let mut con = client
        .get_connection_manager_with_config(manager_config(config))
        .await?;

    let version = get_redis_version(&mut con).await?;
    if version < MIN_SERVER_VERSION {
        tracing::error!(
            "{con_name}: Redis v{version} is below the minimum supported v{MIN_SERVER_VERSION}"
        );
    } else {
        tracing::info!("{con_name}: connected to Redis v{version}");
    }

    Ok(con)
}

/// Reads the server version from `INFO server`.
///
/// # Errors
///
/// Returns an error if the command fails or reports no parseable version.
pub async fn get_redis_version(con: &mut ConnectionManager) -> anyhow::Result<Version> {
    let info: String = redis::cmd("INFO").arg("server").query_async(con).await?;
    match info
        .lines()
        .find_map(|line| line.strip_prefix("redis_version:"))
    {
        Some(raw) => parse_redis_version(raw.trim()),
        None => anyhow::bail!("Redis INFO reported no version"),
    }
}

// Accepts partial versions such as `7` or `6.2`
fn parse_redis_version(raw: &str) -> anyhow::Result<Version> {
    let mut parts = [0u64; 3];
    for (slot, component) in parts.iter_mut().zip(raw.split('.')) {
        *slot = component.parse()?;
    }
    Ok(Version::new(parts[0], parts[1], parts[2]))
}
