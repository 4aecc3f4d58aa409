// In-memory implementation of WindowStore.
//
// Windows only ever live in memory: they hold a few minutes of message
// metadata and are rebuilt naturally after a restart.

use crate::core::automod::{FeatureRecord, WindowStore, WINDOW_CAPACITY};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;

/// A composite key for looking up a user's window.
/// Users can be in multiple guilds, so windows are tracked per guild.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct GuildUserKey {
    guild_id: u64,
    user_id: u64,
}

/// DashMap-backed window store.
///
/// **Locking:**
/// Every access to a key goes through its shard lock, so an `append` and a
/// `snapshot` for the same user never interleave. Different users only
/// contend when they hash to the same shard.
pub struct InMemoryWindowStore {
    /// Maps (guild_id, user_id) -> records, oldest at the front
    windows: DashMap<GuildUserKey, VecDeque<FeatureRecord>>,
    capacity: usize,
}

impl InMemoryWindowStore {
    /// Create a new empty store holding `WINDOW_CAPACITY` records per user.
    pub fn new() -> Self {
        Self::with_capacity(WINDOW_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            capacity: capacity.max(1),
        }
    }
}

impl Default for InMemoryWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowStore for InMemoryWindowStore {
    fn append(&self, guild_id: u64, user_id: u64, record: FeatureRecord) {
        let key = GuildUserKey { guild_id, user_id };

        // entry() holds the shard write lock until `window` is dropped
        let mut window = self
            .windows
            .entry(key)
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));

        window.push_back(record);
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    fn snapshot(&self, guild_id: u64, user_id: u64) -> Vec<FeatureRecord> {
        let key = GuildUserKey { guild_id, user_id };
        self.windows
            .get(&key)
            .map(|window| window.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    fn sweep_idle(&self, guild_id: u64, older_than: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.windows.retain(|key, window| {
            let keep = key.guild_id != guild_id
                || window
                    .back()
                    .is_some_and(|newest| newest.timestamp >= older_than);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    fn tracked_users(&self, guild_id: u64) -> usize {
        self.windows
            .iter()
            .filter(|entry| entry.key().guild_id == guild_id)
            .count()
    }
}
