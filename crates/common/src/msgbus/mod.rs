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

//! The message bus contract consumed by the module runtime.
//!
//! A bus delivers `(pattern, channel, payload)` events for pattern subscriptions. Payloads are
//! structured key-value maps which are encoded to JSON text on the wire and decoded on receipt.

pub mod config;
pub mod matching;
pub mod memory;

use std::fmt::{Debug, Display};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use ustr::Ustr;

pub use self::{config::BusConfig, memory::InMemoryMessageBus};

/// A structured message payload.
pub type Payload = Map<String, Value>;

/// Encodes `payload` to its wire representation.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_payload(payload: &Payload) -> anyhow::Result<String> {
    Ok(serde_json::to_string(payload)?)
}

/// Decodes a wire representation back into a [`Payload`].
///
/// # Errors
///
/// Returns an error if `raw` is not a JSON object.
pub fn decode_payload(raw: &str) -> anyhow::Result<Payload> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("payload is not an object: {other}"),
    }
}

/// Identifies one subscription made against a bus.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SUB-{}", self.0)
    }
}

/// A message received for a pattern subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusMessage {
    /// The subscribed pattern which matched.
    pub pattern: Ustr,
    /// The concrete channel the message was published on.
    pub channel: Ustr,
    /// The encoded payload.
    pub payload: String,
}

/// An event delivered on a subscription stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    Message(BusMessage),
    /// The subscription was closed; no further events follow.
    Closed,
}

/// An active subscription and its event stream.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: UnboundedReceiver<BusEvent>,
}

/// A publish/subscribe message bus.
#[async_trait(?Send)]
pub trait MessageBus: Debug {
    /// Subscribes to all `patterns` on one stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    async fn subscribe(&self, patterns: &[Ustr]) -> anyhow::Result<Subscription>;

    /// Closes the subscription `id`, delivering [`BusEvent::Closed`] to its stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription is unknown or the bus fails to unsubscribe.
    async fn unsubscribe(&self, id: SubscriptionId) -> anyhow::Result<()>;

    /// Publishes `payload` on `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or delivery fails.
    async fn publish(&self, channel: &str, payload: &Payload) -> anyhow::Result<()>;
}
