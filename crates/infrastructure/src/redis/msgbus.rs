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

//! A [`MessageBus`] over Redis pub/sub.
//!
//! Publishing goes through a shared [`ConnectionManager`], which reconnects on its own. Each
//! subscription holds a dedicated pub/sub connection read by a local forwarding task; when that
//! connection drops, the subscriber receives [`BusEvent::Closed`].

use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
};

use ahash::AHashMap;
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{ConnectionManager, PubSub};
use tokio::{
    sync::mpsc::{self, UnboundedSender},
    task::JoinHandle,
};
use trader_common::{
    logging::{RECV, SEND},
    msgbus::{
        BusConfig, BusEvent, BusMessage, MessageBus, Payload, Subscription, SubscriptionId,
        encode_payload,
    },
};
use ustr::Ustr;

use super::{create_redis_client, create_redis_connection};

#[derive(Debug)]
struct ActiveSubscription {
    patterns: Vec<Ustr>,
    tx: UnboundedSender<BusEvent>,
    task: JoinHandle<()>,
}

/// A Redis backed [`MessageBus`].
///
/// Subscribing spawns a local task, so it must be called from within a `tokio::task::LocalSet`.
pub struct RedisMessageBus {
    client: redis::Client,
    con: ConnectionManager,
    next_id: Cell<u64>,
    subscriptions: RefCell<AHashMap<SubscriptionId, ActiveSubscription>>,
}

impl Debug for RedisMessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(RedisMessageBus))
            .field("subscriptions", &self.subscriptions.borrow().len())
            .finish()
    }
}

impl RedisMessageBus {
    /// Connects to the Redis server described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the server cannot be reached.
    pub async fn connect(config: &BusConfig) -> anyhow::Result<Self> {
        let client = create_redis_client(config)?;
        let con = create_redis_connection("msgbus", &client, config).await?;

        Ok(Self {
            client,
            con,
            next_id: Cell::new(0),
            subscriptions: RefCell::new(AHashMap::new()),
        })
    }

    /// Returns the number of open subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }
}

impl Drop for RedisMessageBus {
    fn drop(&mut self) {
        for (_, subscription) in self.subscriptions.get_mut().drain() {
            subscription.task.abort();
        }
    }
}

#[async_trait(?Send)]
impl MessageBus for RedisMessageBus {
    async fn subscribe(&self, patterns: &[Ustr]) -> anyhow::Result<Subscription> {
        anyhow::ensure!(!patterns.is_empty(), "no patterns to subscribe to");

        let mut pubsub = self.client.get_async_pubsub().await?;
        for pattern in patterns {
            pubsub.psubscribe(pattern.as_str()).await?;
        }

        let id = SubscriptionId::new(self.next_id.get() + 1);
        self.next_id.set(id.value());

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::task::spawn_local(forward_messages(id, pubsub, tx.clone()));
        self.subscriptions.borrow_mut().insert(
            id,
            ActiveSubscription {
                patterns: patterns.to_vec(),
                tx,
                task,
            },
        );
        tracing::info!("Subscribed {id} to {patterns:?}");

        Ok(Subscription { id, events: rx })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> anyhow::Result<()> {
        let subscription = self
            .subscriptions
            .borrow_mut()
            .remove(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown subscription {id}"))?;

        // Dropping the pub/sub connection ends the server side subscription
        subscription.task.abort();
        let _ = subscription.tx.send(BusEvent::Closed);
        tracing::info!("Unsubscribed {id} from {:?}", subscription.patterns);
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &Payload) -> anyhow::Result<()> {
        let encoded = encode_payload(payload)?;
        let mut con = self.con.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(&encoded)
            .query_async(&mut con)
            .await?;
        tracing::trace!("{SEND} {channel} ({receivers} receiver(s))");
        Ok(())
    }
}

async fn forward_messages(id: SubscriptionId, pubsub: PubSub, tx: UnboundedSender<BusEvent>) {
    let mut messages = pubsub.into_on_message();

    while let Some(msg) = messages.next().await {
        match decode_message(&msg) {
            Ok(message) => {
                tracing::trace!("{RECV} {id} {}", message.channel);
                if tx.send(BusEvent::Message(message)).is_err() {
                    tracing::debug!("{id}: subscriber dropped, stopping");
                    return;
                }
            }
            Err(e) => {
                tracing::error!(
                    "{id}: dropping unreadable message on {}: {e}",
                    msg.get_channel_name()
                );
            }
        }
    }

    tracing::warn!("{id}: redis subscription connection closed");
    let _ = tx.send(BusEvent::Closed);
}

fn decode_message(msg: &redis::Msg) -> anyhow::Result<BusMessage> {
    let channel = Ustr::from(msg.get_channel_name());
    let pattern = msg
        .get_pattern::<String>()
        .map_or(channel, |p| Ustr::from(&p));
    let payload: String = msg.get_payload()?;

    Ok(BusMessage {
        pattern,
        channel,
        payload,
    })
}
