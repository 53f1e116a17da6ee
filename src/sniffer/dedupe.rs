//! Bounded set of recently seen transaction signatures

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

pub const DEFAULT_CAPACITY: usize = 10_000;

/// What happens when the set is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupeMode {
    /// Drop everything and start over
    #[default]
    Clear,
    /// Evict the oldest signature
    Ring,
}

#[derive(Debug)]
pub struct SignatureSet {
    mode: DedupeMode,
    capacity: usize,
    seen: HashSet<String>,
    /// Insertion order, ring mode only
    order: VecDeque<String>,
}

impl SignatureSet {
    pub fn new(mode: DedupeMode, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            mode,
            capacity,
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::new(),
        }
    }

    /// Record `signature`; returns false if it was already present
    pub fn insert(&mut self, signature: &str) -> bool {
        if self.seen.contains(signature) {
            return false;
        }

        if self.seen.len() >= self.capacity {
            match self.mode {
                DedupeMode::Clear => {
                    tracing::debug!(capacity = self.capacity, "Signature set full, clearing");
                    self.seen.clear();
                }
                DedupeMode::Ring => {
                    if let Some(oldest) = self.order.pop_front() {
                        self.seen.remove(&oldest);
                    }
                }
            }
        }

        self.seen.insert(signature.to_string());
        if self.mode == DedupeMode::Ring {
            self.order.push_back(signature.to_string());
        }
        true
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.seen.contains(signature)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}
