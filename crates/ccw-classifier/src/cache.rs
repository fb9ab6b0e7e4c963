// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Bounded memo for classification results
//!
//! A growing log re-renders the same lines over and over; the cache keeps
//! the most recently inserted results keyed by the exact input string and
//! evicts in insertion order once full.

use crate::{classify, ClassificationResult};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, Arc<ClassificationResult>>,
    order: VecDeque<String>,
}

#[derive(Debug)]
pub struct ClassificationCache {
    capacity: usize,
    entries: Mutex<Entries>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ClassificationCache {
    pub const DEFAULT_CAPACITY: usize = 2048;

    /// A capacity of zero disables memoization
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Entries::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Same result as [`classify`], computed at most once per cached line
    pub fn classify(&self, line: &str) -> Arc<ClassificationResult> {
        if let Some(hit) = self.entries.lock().map.get(line).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Classify outside the lock; a racing insert of the same line is harmless
        let result = Arc::new(classify(line));
        if self.capacity == 0 {
            return result;
        }

        let mut entries = self.entries.lock();
        if !entries.map.contains_key(line) {
            while entries.order.len() >= self.capacity {
                match entries.order.pop_front() {
                    Some(evicted) => {
                        entries.map.remove(&evicted);
                    }
                    None => break,
                }
            }
            entries.order.push_back(line.to_string());
            entries.map.insert(line.to_string(), Arc::clone(&result));
        }
        result
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().map.len(),
        }
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.map.clear();
        entries.order.clear();
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
