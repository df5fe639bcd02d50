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

//! An in-process message bus with Redis pattern semantics.

use std::{cell::RefCell, rc::Rc};

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::mpsc::{self, UnboundedSender};
use ustr::Ustr;

use super::{
    BusEvent, BusMessage, MessageBus, Payload, Subscription, SubscriptionId, encode_payload,
    matching::is_matching,
};

#[derive(Debug)]
struct Subscriber {
    patterns: Vec<Ustr>,
    tx: UnboundedSender<BusEvent>,
}

#[derive(Debug, Default)]
struct InMemoryBusInner {
    next_id: u64,
    subscribers: IndexMap<SubscriptionId, Subscriber>,
    published: Vec<(Ustr, Payload)>,
}

/// A single-threaded message bus delivering to local subscribers.
///
/// A message is delivered once per matching pattern of each subscription, as Redis does for
/// `PSUBSCRIBE`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMessageBus {
    inner: Rc<RefCell<InMemoryBusInner>>,
}

impl InMemoryMessageBus {
    /// Creates a new [`InMemoryMessageBus`] instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of open subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Returns all messages published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<(Ustr, Payload)> {
        self.inner.borrow().published.clone()
    }

    /// Closes every subscription, as a dropped connection would.
    pub fn disconnect_all(&self) {
        let mut inner = self.inner.borrow_mut();
        for (_, subscriber) in inner.subscribers.drain(..) {
            let _ = subscriber.tx.send(BusEvent::Closed);
        }
    }
}

#[async_trait(?Send)]
impl MessageBus for InMemoryMessageBus {
    async fn subscribe(&self, patterns: &[Ustr]) -> anyhow::Result<Subscription> {
        anyhow::ensure!(!patterns.is_empty(), "no patterns to subscribe to");

        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = SubscriptionId::new(inner.next_id);
        inner.subscribers.insert(
            id,
            Subscriber {
                patterns: patterns.to_vec(),
                tx,
            },
        );
        log::debug!("Subscribed {id} to {patterns:?}");

        Ok(Subscription { id, events: rx })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> anyhow::Result<()> {
        let subscriber = self
            .inner
            .borrow_mut()
            .subscribers
            .shift_remove(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown subscription {id}"))?;
        let _ = subscriber.tx.send(BusEvent::Closed);
        log::debug!("Unsubscribed {id}");
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &Payload) -> anyhow::Result<()> {
        let encoded = encode_payload(payload)?;
        let channel = Ustr::from(channel);

        let mut inner = self.inner.borrow_mut();
        inner.published.push((channel, payload.clone()));

        for subscriber in inner.subscribers.values() {
            for pattern in &subscriber.patterns {
                if is_matching(&channel, pattern) {
                    let message = BusMessage {
                        pattern: *pattern,
                        channel,
                        payload: encoded.clone(),
                    };
                    if subscriber.tx.send(BusEvent::Message(message)).is_err() {
                        log::debug!("Subscriber stream for {pattern} already dropped");
                    }
                }
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::msgbus::decode_payload;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn test_publish_delivers_per_matching_pattern() {
        let bus = InMemoryMessageBus::new();
        let mut sub = bus
            .subscribe(&[Ustr::from("MSG:*"), Ustr::from("MSG:CTP:*"), Ustr::from("OTHER")])
            .await
            .unwrap();

        bus.publish("MSG:CTP:REQ:rb2510", &payload(json!({"price": 1})))
            .await
            .unwrap();

        let first = sub.events.recv().await.unwrap();
        let second = sub.events.recv().await.unwrap();
        let BusEvent::Message(first) = first else {
            panic!("expected message")
        };
        let BusEvent::Message(second) = second else {
            panic!("expected message")
        };
        assert_eq!(first.pattern.as_str(), "MSG:*");
        assert_eq!(second.pattern.as_str(), "MSG:CTP:*");
        assert_eq!(first.channel.as_str(), "MSG:CTP:REQ:rb2510");
        assert_eq!(
            decode_payload(&first.payload).unwrap(),
            payload(json!({"price": 1}))
        );
        assert!(sub.events.try_recv().is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn test_unsubscribe_closes_stream() {
        let bus = InMemoryMessageBus::new();
        let mut sub = bus.subscribe(&[Ustr::from("A")]).await.unwrap();
        assert_eq!(bus.subscription_count(), 1);

        bus.unsubscribe(sub.id).await.unwrap();

        assert_eq!(sub.events.recv().await, Some(BusEvent::Closed));
        assert_eq!(bus.subscription_count(), 0);
        assert!(bus.unsubscribe(sub.id).await.is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn test_subscribe_requires_patterns() {
        let bus = InMemoryMessageBus::new();
        assert!(bus.subscribe(&[]).await.is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn test_disconnect_all_closes_every_stream() {
        let bus = InMemoryMessageBus::new();
        let mut a = bus.subscribe(&[Ustr::from("A")]).await.unwrap();
        let mut b = bus.subscribe(&[Ustr::from("B")]).await.unwrap();

        bus.disconnect_all();

        assert_eq!(a.events.recv().await, Some(BusEvent::Closed));
        assert_eq!(b.events.recv().await, Some(BusEvent::Closed));
        assert_eq!(bus.subscription_count(), 0);
    }
}
