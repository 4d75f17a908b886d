//! Recently-seen client tracking.
//!
//! Every inbound request touches the caller's source key (its IP address).
//! A periodic sweep drops keys that have been quiet for at least
//! `stale_after`, so [`PresenceTracker::count`] approximates "devices talking
//! to us right now".  Unauthenticated requests count too; this is a liveness
//! metric, not a session count.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default staleness threshold.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(10);

/// Map of source key to last-seen instant.
#[derive(Debug)]
pub struct PresenceTracker {
    stale_after: Duration,
    last_seen: HashMap<String, Instant>,
}

impl PresenceTracker {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            last_seen: HashMap::new(),
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Records that `key` was seen now.  Returns `true` if the key was new.
    pub fn touch(&mut self, key: &str) -> bool {
        self.touch_at(key, Instant::now())
    }

    /// Records that `key` was seen at `at`.
    ///
    /// An older `at` never moves an existing timestamp backwards.
    pub fn touch_at(&mut self, key: &str, at: Instant) -> bool {
        match self.last_seen.get_mut(key) {
            Some(seen) => {
                if at > *seen {
                    *seen = at;
                }
                false
            }
            None => {
                self.last_seen.insert(key.to_string(), at);
                true
            }
        }
    }

    /// Evicts stale entries using the real clock.
    pub fn sweep(&mut self) -> bool {
        self.sweep_at(Instant::now())
    }

    /// Evicts every entry with `now - last_seen >= stale_after`.
    ///
    /// Returns `true` when the count changed, which is the caller's cue to
    /// push a fresh snapshot.
    pub fn sweep_at(&mut self, now: Instant) -> bool {
        let before = self.last_seen.len();
        let stale_after = self.stale_after;
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) < stale_after);
        self.last_seen.len() != before
    }

    pub fn count(&self) -> usize {
        self.last_seen.len()
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}
