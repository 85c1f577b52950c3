use crate::types::{Fingerprint, FitnessResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

enum Entry {
    InFlight(u64),
    Ready(FitnessResult),
}

/// Fitness cache keyed by genome fingerprint.
///
/// Lookups are concurrent. The first requester of a missing key becomes its
/// owner and computes the result; later requesters block until the owner
/// completes, so a fingerprint is evaluated at most once per run. An owner
/// that unwinds without completing releases the key to the next requester.
pub struct FitnessCache {
    entries: Mutex<HashMap<Fingerprint, Entry>>,
    ready: Condvar,
    next_token: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

pub enum Claim<'a> {
    Ready(FitnessResult),
    Owner(ClaimGuard<'a>),
}

/// Exclusive right to compute the result for one key
pub struct ClaimGuard<'a> {
    cache: &'a FitnessCache,
    key: Fingerprint,
    token: u64,
    completed: bool,
}

impl FitnessCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ready: Condvar::new(),
            next_token: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Fingerprint, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached result, waiting for an in-flight owner if needed,
    /// or hand out ownership of the key.
    pub fn claim(&self, key: Fingerprint) -> Claim<'_> {
        let mut entries = self.lock();
        loop {
            match entries.get(&key) {
                Some(Entry::Ready(result)) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Claim::Ready(result.clone());
                }
                Some(Entry::InFlight(_)) => {
                    entries = self.ready.wait(entries).unwrap_or_else(PoisonError::into_inner);
                }
                None => {
                    let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                    entries.insert(key, Entry::InFlight(token));
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Claim::Owner(ClaimGuard {
                        cache: self,
                        key,
                        token,
                        completed: false,
                    });
                }
            }
        }
    }

    pub fn get(&self, key: &Fingerprint) -> Option<FitnessResult> {
        match self.lock().get(key) {
            Some(Entry::Ready(result)) => Some(result.clone()),
            _ => None,
        }
    }

    /// Pin `result` for `key` unless a result is already stored, waking any
    /// waiters. Returns the value that ends up cached.
    pub fn settle(&self, key: Fingerprint, result: FitnessResult) -> FitnessResult {
        let mut entries = self.lock();
        let stored = match entries.get(&key) {
            Some(Entry::Ready(existing)) => existing.clone(),
            _ => {
                entries.insert(key, Entry::Ready(result.clone()));
                result
            }
        };
        drop(entries);
        self.ready.notify_all();
        stored
    }

    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|e| matches!(e, Entry::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

impl Default for FitnessCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimGuard<'_> {
    /// Store the computed result. If a result was settled for this key in the
    /// meantime, that one wins and is returned instead.
    pub fn complete(mut self, result: FitnessResult) -> FitnessResult {
        self.completed = true;
        self.cache.settle(self.key, result)
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        let mut entries = self.cache.lock();
        if matches!(entries.get(&self.key), Some(Entry::InFlight(t)) if *t == self.token) {
            entries.remove(&self.key);
        }
        drop(entries);
        self.cache.ready.notify_all();
    }
}
