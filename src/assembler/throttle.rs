//! Suppression window for repeated notifications.

use crate::current_timestamp;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Bounded number of tracked notification keys. Old keys fall out of the
/// cache and simply become notifiable again.
const THROTTLE_CAPACITY: usize = 256;

/// Per-key notification throttle.
///
/// Holds the last-notified timestamp for each key in a bounded LRU and
/// suppresses repeats within the window. State is explicit and injected by
/// the caller, so independent hosts never share suppression history.
pub struct NotifyThrottle {
    window_secs: u64,
    recent: Mutex<LruCache<String, u64>>,
}

impl NotifyThrottle {
    /// Creates a throttle with the given suppression window.
    #[must_use]
    pub fn new(window_secs: u64) -> Self {
        let capacity = NonZeroUsize::new(THROTTLE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            window_secs,
            recent: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Whether a notification for `key` may fire now; firing records the
    /// timestamp.
    pub fn should_notify(&self, key: &str) -> bool {
        self.should_notify_at(key, current_timestamp())
    }

    /// Clock-injected variant of [`Self::should_notify`].
    pub(crate) fn should_notify_at(&self, key: &str, now: u64) -> bool {
        // A poisoned throttle must not silence warnings.
        let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(&last) = recent.get(key)
            && now.saturating_sub(last) < self.window_secs
        {
            return false;
        }
        recent.put(key.to_string(), now);
        true
    }
}
