//! Timeout Tracking
//!
//! Ordered expiry tracking for arbitrary keys. Used by runners for idle
//! eviction and available to protocols built on top of the runtime for
//! request/response correlation, bans, and rate-limit windows.
//!
//! Entries live in a binary heap ordered by `(expiry, insertion sequence)`.
//! Re-arming or cancelling a key does not search the heap: the key's live
//! sequence number is tracked in a map and stale heap entries are skipped
//! (and periodically compacted away).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::time::Instant;

/// Heap compaction kicks in once stale entries outnumber live ones by this factor
const COMPACTION_FACTOR: usize = 2;
const COMPACTION_FLOOR: usize = 64;

#[derive(Debug)]
struct Entry<K, T> {
    expiry: T,
    sequence: u64,
    key: K,
}

impl<K, T: Ord> PartialEq for Entry<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.expiry == other.expiry && self.sequence == other.sequence
    }
}

impl<K, T: Ord> Eq for Entry<K, T> {}

impl<K, T: Ord> PartialOrd for Entry<K, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K, T: Ord> Ord for Entry<K, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap; reverse so the earliest expiry pops first,
        // and the earliest insertion wins ties
        match other.expiry.cmp(&self.expiry) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

/// Outcome of a [`TimeoutManager::process`] sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult<K, T> {
    /// Keys whose expiry was at or before `now`, oldest expiry first
    pub expired: Vec<K>,
    /// Expiry of the next pending entry, if any
    pub next_timeout: Option<T>,
}

/// Maps each tracked key to exactly one expiry timestamp
#[derive(Debug)]
pub struct TimeoutManager<K, T = Instant> {
    heap: BinaryHeap<Entry<K, T>>,
    live: HashMap<K, (T, u64)>,
    next_sequence: u64,
}

impl<K, T> Default for TimeoutManager<K, T>
where
    K: Hash + Eq + Clone,
    T: Ord + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> TimeoutManager<K, T>
where
    K: Hash + Eq + Clone,
    T: Ord + Copy,
{
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Arm a timeout for `key`, replacing any existing one
    pub fn add(&mut self, key: K, expiry: T) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.live.insert(key.clone(), (expiry, sequence));
        self.heap.push(Entry {
            expiry,
            sequence,
            key,
        });
        self.maybe_compact();
    }

    /// Stop tracking `key`. Returns whether it was tracked.
    pub fn cancel(&mut self, key: &K) -> bool {
        let removed = self.live.remove(key).is_some();
        if removed {
            self.maybe_compact();
        }
        removed
    }

    pub fn contains(&self, key: &K) -> bool {
        self.live.contains_key(key)
    }

    /// Expiry currently armed for `key`
    pub fn expiry_of(&self, key: &K) -> Option<T> {
        self.live.get(key).map(|(expiry, _)| *expiry)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Expiry of the earliest live entry
    pub fn next_timeout(&mut self) -> Option<T> {
        self.discard_stale_head();
        self.heap.peek().map(|entry| entry.expiry)
    }

    /// Remove and return every key whose expiry is at or before `now`
    pub fn process(&mut self, now: T) -> ProcessResult<K, T> {
        let mut expired = Vec::new();

        loop {
            self.discard_stale_head();
            match self.heap.peek() {
                Some(entry) if entry.expiry <= now => {}
                _ => break,
            }
            if let Some(entry) = self.heap.pop() {
                self.live.remove(&entry.key);
                expired.push(entry.key);
            }
        }

        ProcessResult {
            expired,
            next_timeout: self.heap.peek().map(|entry| entry.expiry),
        }
    }

    fn is_live(&self, entry: &Entry<K, T>) -> bool {
        matches!(self.live.get(&entry.key), Some((_, sequence)) if *sequence == entry.sequence)
    }

    fn discard_stale_head(&mut self) {
        while let Some(entry) = self.heap.peek() {
            if self.is_live(entry) {
                break;
            }
            self.heap.pop();
        }
    }

    fn maybe_compact(&mut self) {
        let threshold = (self.live.len() * COMPACTION_FACTOR).max(COMPACTION_FLOOR);
        if self.heap.len() <= threshold {
            return;
        }
        let live = &self.live;
        let entries: Vec<Entry<K, T>> = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .filter(|entry| {
                matches!(live.get(&entry.key), Some((_, sequence)) if *sequence == entry.sequence)
            })
            .collect();
        self.heap = BinaryHeap::from(entries);
    }
}
