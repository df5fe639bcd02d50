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

//! Explicit registration of module callbacks.
//!
//! A module declares each of its handlers once, at construction, as either a channel handler
//! (bound to a message bus pattern) or a cron job (bound to a schedule). The resulting
//! [`CallbackRegistry`] is immutable and is consumed by the module runtime at install time.

use std::{fmt::Debug, future::Future, rc::Rc};

use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use futures::{FutureExt, future::LocalBoxFuture};
use strum::Display;
use ustr::Ustr;

use crate::{cron::CronSchedule, msgbus::Payload};

/// The future returned by every registered handler.
pub type HandlerFuture = LocalBoxFuture<'static, anyhow::Result<()>>;

/// A handler invoked for each message on a subscribed pattern.
pub type ChannelHandler = Rc<dyn Fn(ChannelEvent) -> HandlerFuture>;

/// A handler invoked on each fire of a cron schedule.
pub type CronHandler = Rc<dyn Fn(CronTick) -> HandlerFuture>;

/// A decoded message delivered to a channel handler.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelEvent {
    /// The pattern the handler is bound to.
    pub pattern: Ustr,
    /// The concrete channel the message arrived on.
    pub channel: Ustr,
    pub payload: Payload,
}

/// A cron fire delivered to a cron handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CronTick {
    /// The schedule expression which fired.
    pub expression: Ustr,
    /// The wall-clock time this fire was scheduled for.
    pub scheduled_at: DateTime<Utc>,
}

/// The kind of trigger a callback is bound to.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase")]
pub enum TriggerKind {
    Channel,
    Cron,
}

/// A handler together with the trigger it is bound to.
#[derive(Clone)]
pub enum Callback {
    Channel {
        pattern: Ustr,
        handler: ChannelHandler,
    },
    Cron {
        schedule: CronSchedule,
        handler: CronHandler,
    },
}

impl Callback {
    #[must_use]
    pub const fn kind(&self) -> TriggerKind {
        match self {
            Self::Channel { .. } => TriggerKind::Channel,
            Self::Cron { .. } => TriggerKind::Cron,
        }
    }

    /// Returns the pattern or cron expression.
    #[must_use]
    pub fn trigger_value(&self) -> Ustr {
        match self {
            Self::Channel { pattern, .. } => *pattern,
            Self::Cron { schedule, .. } => schedule.expression(),
        }
    }
}

impl Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(Callback))
            .field("kind", &self.kind())
            .field("trigger", &self.trigger_value())
            .finish_non_exhaustive()
    }
}

/// A named callback as collected by the registry.
#[derive(Clone, Debug)]
pub struct CallbackDescriptor {
    pub name: Ustr,
    pub callback: Callback,
}

/// Errors raised when building a [`CallbackRegistry`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("callback '{name}' is bound to both a channel and a cron schedule")]
    ConflictingTriggers { name: Ustr },
    #[error("callback '{name}' is registered more than once")]
    DuplicateName { name: Ustr },
    #[error("channel pattern '{pattern}' is already bound")]
    DuplicatePattern { pattern: Ustr },
    #[error("cron schedule '{expression}' is already bound")]
    DuplicateSchedule { expression: Ustr },
    #[error("callback '{name}' has an empty channel pattern")]
    EmptyPattern { name: Ustr },
    #[error("callback '{name}' has an invalid cron expression '{expression}': {reason}")]
    InvalidCron {
        name: Ustr,
        expression: String,
        reason: String,
    },
}

enum PendingCallback {
    Channel {
        pattern: Ustr,
        handler: ChannelHandler,
    },
    Cron {
        expression: String,
        handler: CronHandler,
    },
}

impl PendingCallback {
    const fn kind(&self) -> TriggerKind {
        match self {
            Self::Channel { .. } => TriggerKind::Channel,
            Self::Cron { .. } => TriggerKind::Cron,
        }
    }
}

/// Builder for a [`CallbackRegistry`].
#[derive(Default)]
pub struct CallbackRegistryBuilder {
    pending: Vec<(Ustr, PendingCallback)>,
}

impl Debug for CallbackRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(CallbackRegistryBuilder))
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl CallbackRegistryBuilder {
    /// Binds `handler` to messages on channels matching `pattern`.
    #[must_use]
    pub fn on_channel<F, Fut>(mut self, name: &str, pattern: &str, handler: F) -> Self
    where
        F: Fn(ChannelEvent) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let handler: ChannelHandler = Rc::new(move |event| handler(event).boxed_local());
        self.pending.push((
            Ustr::from(name),
            PendingCallback::Channel {
                pattern: Ustr::from(pattern),
                handler,
            },
        ));
        self
    }

    /// Binds `handler` to fires of the cron `expression`.
    #[must_use]
    pub fn on_cron<F, Fut>(mut self, name: &str, expression: &str, handler: F) -> Self
    where
        F: Fn(CronTick) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let handler: CronHandler = Rc::new(move |tick| handler(tick).boxed_local());
        self.pending.push((
            Ustr::from(name),
            PendingCallback::Cron {
                expression: expression.to_string(),
                handler,
            },
        ));
        self
    }

    /// Validates the registrations and builds the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A name is registered twice, or for both a channel and a cron schedule.
    /// - A channel pattern or cron expression is bound more than once.
    /// - A pattern is empty or a cron expression does not parse.
    pub fn build(self) -> Result<CallbackRegistry, RegistryError> {
        let mut names: AHashMap<Ustr, TriggerKind> = AHashMap::new();
        let mut patterns: AHashSet<Ustr> = AHashSet::new();
        let mut expressions: AHashSet<Ustr> = AHashSet::new();
        let mut descriptors = Vec::with_capacity(self.pending.len());

        for (name, pending) in self.pending {
            let kind = pending.kind();
            if let Some(existing) = names.insert(name, kind) {
                return Err(if existing == kind {
                    RegistryError::DuplicateName { name }
                } else {
                    RegistryError::ConflictingTriggers { name }
                });
            }

            let callback = match pending {
                PendingCallback::Channel { pattern, handler } => {
                    if pattern.trim().is_empty() {
                        return Err(RegistryError::EmptyPattern { name });
                    }
                    if !patterns.insert(pattern) {
                        return Err(RegistryError::DuplicatePattern { pattern });
                    }
                    Callback::Channel { pattern, handler }
                }
                PendingCallback::Cron {
                    expression,
                    handler,
                } => {
                    let schedule = CronSchedule::parse(&expression).map_err(|e| {
                        RegistryError::InvalidCron {
                            name,
                            expression: expression.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    if !expressions.insert(schedule.expression()) {
                        return Err(RegistryError::DuplicateSchedule {
                            expression: schedule.expression(),
                        });
                    }
                    Callback::Cron { schedule, handler }
                }
            };

            descriptors.push(CallbackDescriptor { name, callback });
        }

        Ok(CallbackRegistry { descriptors })
    }
}

/// The immutable table of a module's callbacks.
#[derive(Clone, Debug, Default)]
pub struct CallbackRegistry {
    descriptors: Vec<CallbackDescriptor>,
}

impl CallbackRegistry {
    #[must_use]
    pub fn builder() -> CallbackRegistryBuilder {
        CallbackRegistryBuilder::default()
    }

    /// Returns the descriptors in registration order.
    #[must_use]
    pub fn descriptors(&self) -> &[CallbackDescriptor] {
        &self.descriptors
    }

    /// Returns the descriptor registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CallbackDescriptor> {
        self.descriptors.iter().find(|d| d.name.as_str() == name)
    }

    /// Returns the union of all channel patterns, in registration order.
    #[must_use]
    pub fn patterns(&self) -> Vec<Ustr> {
        self.descriptors
            .iter()
            .filter_map(|d| match &d.callback {
                Callback::Channel { pattern, .. } => Some(*pattern),
                Callback::Cron { .. } => None,
            })
            .collect()
    }

    /// Returns the cron expressions, in registration order.
    #[must_use]
    pub fn schedules(&self) -> Vec<Ustr> {
        self.descriptors
            .iter()
            .filter_map(|d| match &d.callback {
                Callback::Cron { schedule, .. } => Some(schedule.expression()),
                Callback::Channel { .. } => None,
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    async fn noop_channel(_event: ChannelEvent) -> anyhow::Result<()> {
        Ok(())
    }

    async fn noop_cron(_tick: CronTick) -> anyhow::Result<()> {
        Ok(())
    }

    #[rstest]
    fn test_build_collects_descriptors_in_order() {
        let registry = CallbackRegistry::builder()
            .on_channel("on_request", "MSG:CTP:REQ:*", noop_channel)
            .on_cron("refresh", "*/5 * * * *", noop_cron)
            .on_channel("on_tick", "MSG:CTP:RSP:MARKET:*", noop_channel)
            .build()
            .unwrap();

        assert_eq!(registry.len(), 3);
        let names: Vec<&str> = registry
            .descriptors()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["on_request", "refresh", "on_tick"]);
        assert_eq!(
            registry.patterns(),
            vec![
                Ustr::from("MSG:CTP:REQ:*"),
                Ustr::from("MSG:CTP:RSP:MARKET:*")
            ]
        );
        assert_eq!(registry.schedules(), vec![Ustr::from("*/5 * * * *")]);

        let refresh = registry.get("refresh").unwrap();
        assert_eq!(refresh.callback.kind(), TriggerKind::Cron);
        assert_eq!(refresh.callback.trigger_value().as_str(), "*/5 * * * *");
    }

    #[rstest]
    fn test_empty_registry() {
        let registry = CallbackRegistry::builder().build().unwrap();
        assert!(registry.is_empty());
        assert!(registry.patterns().is_empty());
    }

    #[rstest]
    fn test_channel_and_cron_on_same_name_conflict() {
        let result = CallbackRegistry::builder()
            .on_cron("refresh", "* * * * *", noop_cron)
            .on_channel("refresh", "MSG:*", noop_channel)
            .build();

        assert_eq!(
            result.unwrap_err(),
            RegistryError::ConflictingTriggers {
                name: Ustr::from("refresh")
            }
        );
    }

    #[rstest]
    fn test_duplicate_name_rejected() {
        let result = CallbackRegistry::builder()
            .on_channel("a", "X", noop_channel)
            .on_channel("a", "Y", noop_channel)
            .build();

        assert!(matches!(
            result.unwrap_err(),
            RegistryError::DuplicateName { .. }
        ));
    }

    #[rstest]
    fn test_duplicate_pattern_rejected() {
        let result = CallbackRegistry::builder()
            .on_channel("a", "MSG:*", noop_channel)
            .on_channel("b", "MSG:*", noop_channel)
            .build();

        assert_eq!(
            result.unwrap_err(),
            RegistryError::DuplicatePattern {
                pattern: Ustr::from("MSG:*")
            }
        );
    }

    #[rstest]
    fn test_duplicate_schedule_rejected() {
        let result = CallbackRegistry::builder()
            .on_cron("a", "0 9 * * *", noop_cron)
            .on_cron("b", "0 9 * * *", noop_cron)
            .build();

        assert!(matches!(
            result.unwrap_err(),
            RegistryError::DuplicateSchedule { .. }
        ));
    }

    #[rstest]
    #[case("")]
    #[case("every minute")]
    #[case("99 * * * *")]
    fn test_invalid_cron_rejected(#[case] expression: &str) {
        let result = CallbackRegistry::builder()
            .on_cron("job", expression, noop_cron)
            .build();

        assert!(matches!(
            result.unwrap_err(),
            RegistryError::InvalidCron { .. }
        ));
    }

    #[rstest]
    fn test_empty_pattern_rejected() {
        let result = CallbackRegistry::builder()
            .on_channel("a", " ", noop_channel)
            .build();

        assert!(matches!(
            result.unwrap_err(),
            RegistryError::EmptyPattern { .. }
        ));
    }
}
