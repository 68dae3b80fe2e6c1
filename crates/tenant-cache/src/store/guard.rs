//! Eviction watermarks for cache fills.
//!
//! A read that misses loads from the repository and then stores the result.
//! If an eviction covering that key lands between the load and the store, the
//! loaded value may predate the write that caused the eviction. Every
//! eviction therefore advances a process-wide sequence and records it against
//! the evicted scope (a pattern prefix or an exact key). A fill carries the
//! sequence observed before its load and is dropped when any scope covering
//! its key was marked later.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tenant_cache_core::SEPARATOR;

/// Marks kept before older ones are folded into the floor.
const MAX_MARKS: usize = 4096;

/// Sequence observed before a fill's repository load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket {
    sequence: u64,
}

#[derive(Debug, Default)]
pub(crate) struct FillGuard {
    sequence: AtomicU64,
    /// Tickets below the floor are stale; raised when marks are pruned.
    floor: AtomicU64,
    marks: DashMap<String, u64>,
}

impl FillGuard {
    pub(crate) fn ticket(&self) -> FillTicket {
        FillTicket {
            sequence: self.sequence.load(Ordering::SeqCst),
        }
    }

    /// Record an eviction of `scope`. Must complete before the backend delete
    /// is issued.
    pub(crate) fn mark(&self, scope: &str) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.marks
            .entry(scope.to_string())
            .and_modify(|s| *s = (*s).max(sequence))
            .or_insert(sequence);
        if self.marks.len() > MAX_MARKS {
            self.prune();
        }
    }

    /// Whether no eviction covering `key` happened after `ticket` was taken.
    pub(crate) fn is_current(&self, key: &str, ticket: FillTicket) -> bool {
        if ticket.sequence < self.floor.load(Ordering::SeqCst) {
            return false;
        }
        scopes(key).all(|scope| {
            self.marks
                .get(scope)
                .is_none_or(|marked| *marked <= ticket.sequence)
        })
    }

    fn prune(&self) {
        let floor = self.sequence.load(Ordering::SeqCst);
        self.floor.fetch_max(floor, Ordering::SeqCst);
        self.marks.retain(|_, marked| *marked > floor);
    }

    #[cfg(test)]
    fn mark_count(&self) -> usize {
        self.marks.len()
    }
}

/// Every scope that covers `key`: each prefix ending in a separator, then the
/// key itself.
fn scopes(key: &str) -> impl Iterator<Item = &str> {
    key.match_indices(SEPARATOR)
        .map(move |(i, _)| &key[..=i])
        .chain(std::iter::once(key))
}
