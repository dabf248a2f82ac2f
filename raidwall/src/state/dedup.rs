// raidwall/src/state/dedup.rs
//
// Fixed-capacity, insertion-ordered set of recently seen actor ids.
// Eviction is purely capacity driven: pushing into a full buffer drops the
// oldest insert. There is no per-entry TTL and lookups do not refresh order.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct DedupBuffer {
    capacity: usize,
    items:    VecDeque<String>,
}

impl DedupBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, items: VecDeque::with_capacity(capacity) }
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, actor_id: &str) -> bool {
        self.items.iter().any(|a| a == actor_id)
    }

    pub fn push(&mut self, actor_id: impl Into<String>) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(actor_id.into());
    }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn capacity(&self) -> usize { self.capacity }
}
