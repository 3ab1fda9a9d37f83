//! A bounded concurrent cache of network evaluations
//
//  This Source Code Form is subject to the terms of the Mozilla Public
//  License, v. 2.0. If a copy of the MPL was not distributed with this
//  file, You can obtain one at http://mozilla.org/MPL/2.0/.
//
////////////////////////////////////////////////////////////////////////////////////////////////////
use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use log::debug;
use crate::net::evaluator::Evaluation;

/// The default soft capacity of the cache
pub const DEFAULT_CAPACITY: usize = 100_000;

////////////////////////////////////////////////////////////////////////////////////////////////////
/// A concurrent map from the history-aware hash of a position to its network evaluation.
///
/// The capacity is soft: when an insertion pushes the map past it, about a quarter of the
/// entries are evicted. Which entries go is unspecified; the cache only promises that a hit
/// returns a value that was inserted for the same key. Inserts are idempotent.
#[derive(Debug)]
pub struct EvalCache {
    map: RwLock<HashMap<u64, Arc<Evaluation>>>,
    capacity: usize,
}

impl EvalCache {
    /// Creates a cache with the given soft capacity.
    pub fn new(capacity: usize) -> EvalCache {
        EvalCache {
            map: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Looks up an evaluation by position key.
    pub fn get(&self, key: u64) -> Option<Arc<Evaluation>> {
        self.map.read().get(&key).cloned()
    }

    /// Stores an evaluation, evicting a batch of arbitrary entries if the cache has outgrown
    /// its capacity.
    pub fn insert(&self, key: u64, evaluation: Arc<Evaluation>) {
        let mut map = self.map.write();
        map.insert(key, evaluation);

        if map.len() > self.capacity {
            let victims: Vec<u64> = map.keys().take(self.capacity / 4).copied().collect();
            debug!("evicting {} of {} cached evaluations", victims.len(), map.len());
            for key in victims {
                map.remove(&key);
            }
        }
    }

    /// Returns the number of cached evaluations.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}
