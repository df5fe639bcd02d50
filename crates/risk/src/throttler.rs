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

//! Sliding-window order counters keyed per instrument.

use std::{collections::VecDeque, fmt::Debug, hash::Hash, time::Duration};

use ahash::AHashMap;
use tokio::time::Instant;

/// Counts accepted events per key over a rolling window.
///
/// Each key holds a deque of monotonic timestamps in arrival order, so pruning only ever pops
/// from the front. Keys whose deque empties are dropped. No entry older than the window survives
/// a call to [`RateWindow::prune`] or [`RateWindow::try_acquire`].
#[derive(Debug, Clone)]
pub struct RateWindow<K> {
    limit: usize,
    window: Duration,
    entries: AHashMap<K, VecDeque<Instant>>,
}

impl<K> RateWindow<K>
where
    K: Copy + Eq + Hash + Debug,
{
    /// Creates a new [`RateWindow`] allowing `limit` events per `window`.
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            entries: AHashMap::new(),
        }
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Drops every timestamp which is at least one window old at `now`.
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.entries.retain(|_, timestamps| {
            while let Some(front) = timestamps.front() {
                if now.saturating_duration_since(*front) >= window {
                    timestamps.pop_front();
                } else {
                    break;
                }
            }
            !timestamps.is_empty()
        });
    }

    /// Returns the number of events currently counted for `key`.
    #[must_use]
    pub fn count(&self, key: &K) -> usize {
        self.entries.get(key).map_or(0, VecDeque::len)
    }

    /// Prunes, then records an event for `key` at `now` if the limit allows it.
    ///
    /// Returns `Ok` with the new count, or `Err` with the current count when the limit is reached.
    ///
    /// # Errors
    ///
    /// Returns the current count if `key` already holds `limit` events within the window.
    pub fn try_acquire(&mut self, key: K, now: Instant) -> Result<usize, usize> {
        self.prune(now);

        let limit = self.limit;
        let timestamps = self
            .entries
            .entry(key)
            .or_insert_with(|| VecDeque::with_capacity(limit));

        if timestamps.len() >= limit {
            let count = timestamps.len();
            if count == 0 {
                self.entries.remove(&key);
            }
            return Err(count);
        }

        timestamps.push_back(now);
        Ok(timestamps.len())
    }

    /// Clears the counter for `key`.
    pub fn reset(&mut self, key: &K) {
        self.entries.remove(key);
    }

    /// Clears every counter.
    pub fn reset_all(&mut self) {
        self.entries.clear();
    }
}
