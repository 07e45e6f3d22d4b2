//! Deadline queue for ephemeral UI state.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// TTL from a seconds count; zero or negative means no expiry
pub fn ttl_from_secs(secs: i64) -> Option<Duration> {
    u64::try_from(secs)
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[derive(Debug)]
struct Deadline<K> {
    at: Instant,
    generation: u64,
    key: K,
}

impl<K> PartialEq for Deadline<K> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.generation == other.generation
    }
}

impl<K> Eq for Deadline<K> {}

impl<K> PartialOrd for Deadline<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Deadline<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then(self.generation.cmp(&other.generation))
    }
}

/// Min-heap of per-key deadlines.
///
/// Rescheduling a key bumps its generation; heap entries from older
/// generations are skipped when they surface.
#[derive(Debug)]
pub struct ExpiryQueue<K> {
    heap: BinaryHeap<Reverse<Deadline<K>>>,
    live: HashMap<K, u64>,
    next_generation: u64,
}

impl<K: Eq + Hash + Clone> Default for ExpiryQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> ExpiryQueue<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Expire `key` after `ttl`, replacing any earlier deadline.
    /// `None`, or a deadline past the clock's range, cancels the key instead.
    pub fn schedule(&mut self, key: K, ttl: Option<Duration>, now: Instant) {
        let Some(at) = ttl.and_then(|ttl| now.checked_add(ttl)) else {
            self.cancel(&key);
            return;
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        self.live.insert(key.clone(), generation);
        self.heap.push(Reverse(Deadline {
            at,
            generation,
            key,
        }));
    }

    /// Returns true if the key had a pending deadline
    pub fn cancel(&mut self, key: &K) -> bool {
        self.live.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    fn is_current(&self, deadline: &Deadline<K>) -> bool {
        self.live.get(&deadline.key) == Some(&deadline.generation)
    }

    fn drop_stale(&mut self) {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.is_current(top) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Earliest live deadline
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.drop_stale();
        self.heap.peek().map(|Reverse(top)| top.at)
    }

    /// Remove and return every key whose deadline is at or before `now`
    pub fn pop_expired(&mut self, now: Instant) -> Vec<K> {
        let mut expired = Vec::new();
        loop {
            self.drop_stale();
            match self.heap.peek() {
                Some(Reverse(top)) if top.at <= now => {}
                _ => break,
            }
            if let Some(Reverse(top)) = self.heap.pop() {
                self.live.remove(&top.key);
                expired.push(top.key);
            }
        }
        expired
    }

    /// Number of keys with a pending deadline
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
