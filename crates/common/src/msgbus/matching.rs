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

//! Channel pattern matching with Redis `PSUBSCRIBE` glob semantics.

/// Returns whether `channel` matches the glob `pattern`.
///
/// The pattern may contain:
/// - '*' - match 0 or more characters
/// - '?' - match any character once
/// - any other byte - match that byte exactly
#[must_use]
pub fn is_matching(channel: &str, pattern: &str) -> bool {
    is_matching_bytes(channel.as_bytes(), pattern.as_bytes())
}

// Greedy match remembering only the most recent '*'; a later star supersedes earlier ones
fn is_matching_bytes(channel: &[u8], pattern: &[u8]) -> bool {
    let (mut c, mut p) = (0, 0);
    let mut last_star: Option<(usize, usize)> = None;

    while c < channel.len() {
        match pattern.get(p) {
            Some(b'*') => {
                last_star = Some((p, c));
                p += 1;
            }
            Some(&b) if b == b'?' || b == channel[c] => {
                c += 1;
                p += 1;
            }
            _ => match last_star {
                // Let the star swallow one more byte and retry
                Some((star_p, star_c)) => {
                    last_star = Some((star_p, star_c + 1));
                    p = star_p + 1;
                    c = star_c + 1;
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}
