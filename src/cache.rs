use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;

use dnsparse::QueryType;

/// Cache key: the query name exactly as the wire parser yields it, plus the
/// record type asked for.
pub type CacheKey = (String, QueryType);

struct CacheEntry {
    response: Vec<u8>,
    expires_at: Instant,
}

/// Raw upstream responses keyed by (name, type), behind one coarse lock.
///
/// Expiry is lazy: an entry stays in the map until a lookup finds it stale
/// and removes it, there is no background sweeper. The map has no capacity
/// bound; it grows with the number of distinct keys queried. The lock is
/// only held for map reads and writes, never across I/O.
pub struct ResponseCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        ResponseCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a copy of the cached response iff the entry is still live.
    /// A stale entry is removed inside the same critical section that found
    /// it. A poisoned lock degrades to a miss.
    pub fn lookup(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };

        match entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.response.clone()),
            Some(_) => {
                debug!("evicting expired entry for {} ({:?})", key.0, key.1);
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `response` under `key` for `ttl`, unconditionally replacing
    /// any entry already there. Concurrent writers race benignly: the last
    /// one wins.
    pub fn store(&self, key: CacheKey, response: Vec<u8>, ttl: Duration) {
        let entry = CacheEntry {
            response,
            expires_at: Instant::now() + ttl,
        };

        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        ResponseCache::new()
    }
}
