use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 1000;

struct Entries {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

/// Recently seen message ids, bounded by insertion order.
///
/// Inbound ids and ids of messages the bot sent itself share the same set, so
/// a reply that comes back through the event stream is treated as already
/// handled. This is a memory bound, not an LRU: forgetting an old id is
/// acceptable, reporting an id that was never recorded is not.
pub struct DedupSet {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl Default for DedupSet {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl DedupSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Entries {
                ids: HashSet::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Check and record `id`. Returns true if it was already present.
    pub fn seen(&self, id: &str) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.ids.contains(id) {
            return true;
        }

        entries.ids.insert(id.to_string());
        entries.order.push_back(id.to_string());

        if entries.ids.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.ids.remove(&oldest);
                debug!("Dedup set full, evicted {}", oldest);
            }
        }

        false
    }

    /// Record the id of a message the bot authored.
    pub fn register(&self, id: &str) {
        self.seen(id);
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.ids.contains(id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.ids.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
