//! Cache and write queue
//!
//! The cache answers reads without disk I/O. The write queue holds what
//! still has to reach disk, at most one pending operation per key. Both
//! live behind one lock in the store and are only touched synchronously.

use std::collections::HashMap;

use serde_json::Value;

/// What the cache knows about a key
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// Last known value
    Value(Value),
    /// Logically deleted; the file is gone or about to be
    Tombstone,
}

/// Operation waiting to be persisted
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOp {
    Write(Value),
    Delete,
}

/// Result of consulting the cache
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lookup {
    /// Cached value, no disk access needed
    Hit(Value),
    /// Deleted and the delete is still queued
    Deleted,
    /// Never cached, or a confirmed delete that disk may have outlived
    Miss,
}

/// Identifies one staged operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub key: String,
    pub seq: u64,
}

/// Cache entry plus the sequence number of the last op staged for its key
///
/// `seq` is kept after the op is flushed, so a disk read that started
/// before it can still tell it is stale.
#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    seq: u64,
}

#[derive(Debug)]
struct Pending {
    seq: u64,
    op: PendingOp,
}

/// In-memory state of a store
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    cache: HashMap<String, Slot>,
    queue: HashMap<String, Pending>,
    next_seq: u64,
}

impl StoreState {
    pub fn lookup(&self, key: &str) -> Lookup {
        match self.cache.get(key).map(|slot| &slot.entry) {
            Some(CacheEntry::Value(value)) => Lookup::Hit(value.clone()),
            Some(CacheEntry::Tombstone) if self.delete_pending(key) => Lookup::Deleted,
            _ => Lookup::Miss,
        }
    }

    /// Sequence number of the last op staged for `key` (0 if none)
    ///
    /// Taken before a disk read and handed back to [`StoreState::fill`].
    pub fn generation(&self, key: &str) -> u64 {
        self.cache.get(key).map_or(0, |slot| slot.seq)
    }

    /// Cache a value read from disk
    ///
    /// `generation` is what [`StoreState::generation`] returned before the
    /// read began. If a write or delete was staged since, it wins over the
    /// disk content (even if already flushed); the returned value is
    /// whatever the cache now says.
    pub fn fill(&mut self, key: &str, generation: u64, value: Value) -> Option<Value> {
        if self.generation(key) != generation {
            return match self.cache.get(key).map(|slot| &slot.entry) {
                Some(CacheEntry::Value(current)) => Some(current.clone()),
                _ => None,
            };
        }

        match self.lookup(key) {
            Lookup::Hit(current) => Some(current),
            Lookup::Deleted => None,
            Lookup::Miss => {
                let slot = Slot {
                    entry: CacheEntry::Value(value.clone()),
                    seq: generation,
                };
                self.cache.insert(key.to_string(), slot);
                Some(value)
            }
        }
    }

    /// Record `op` in the cache and the write queue
    ///
    /// A later op for the same key replaces the queued one.
    pub fn stage(&mut self, key: String, op: PendingOp) -> Ticket {
        self.next_seq += 1;
        let seq = self.next_seq;

        let entry = match &op {
            PendingOp::Write(value) => CacheEntry::Value(value.clone()),
            PendingOp::Delete => CacheEntry::Tombstone,
        };
        self.cache.insert(key.clone(), Slot { entry, seq });
        self.queue.insert(key.clone(), Pending { seq, op });

        Ticket { key, seq }
    }

    /// Copy of everything currently queued
    pub fn batch(&self) -> Vec<(Ticket, PendingOp)> {
        self.queue
            .iter()
            .map(|(key, pending)| {
                let ticket = Ticket {
                    key: key.clone(),
                    seq: pending.seq,
                };
                (ticket, pending.op.clone())
            })
            .collect()
    }

    /// Drop a queued op once it is on disk, unless a newer one replaced it
    pub fn settle(&mut self, ticket: &Ticket) {
        if self.is_pending(ticket) {
            self.queue.remove(&ticket.key);
        }
    }

    pub fn is_pending(&self, ticket: &Ticket) -> bool {
        self.queue
            .get(&ticket.key)
            .is_some_and(|pending| pending.seq == ticket.seq)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn cached_keys(&self) -> usize {
        self.cache
            .values()
            .filter(|slot| matches!(slot.entry, CacheEntry::Value(_)))
            .count()
    }

    fn delete_pending(&self, key: &str) -> bool {
        self.queue
            .get(key)
            .is_some_and(|pending| pending.op == PendingOp::Delete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage_updates_cache_immediately() {
        let mut state = StoreState::default();
        state.stage("k".into(), PendingOp::Write(json!(1)));

        assert_eq!(state.lookup("k"), Lookup::Hit(json!(1)));
        assert_eq!(state.queue_len(), 1);
    }

    #[test]
    fn test_last_write_wins_in_queue() {
        let mut state = StoreState::default();
        let first = state.stage("k".into(), PendingOp::Write(json!(1)));
        let second = state.stage("k".into(), PendingOp::Write(json!(2)));

        assert!(!state.is_pending(&first));
        assert!(state.is_pending(&second));
        assert_eq!(state.batch(), vec![(second, PendingOp::Write(json!(2)))]);
    }

    #[test]
    fn test_settle_keeps_newer_op() {
        let mut state = StoreState::default();
        let first = state.stage("k".into(), PendingOp::Write(json!(1)));
        let batch = state.batch();
        let second = state.stage("k".into(), PendingOp::Write(json!(2)));

        // The batch written first must not clear the newer write
        state.settle(&batch[0].0);
        assert!(state.is_pending(&second));
        assert!(!state.is_pending(&first));

        state.settle(&second);
        assert_eq!(state.queue_len(), 0);
    }

    #[test]
    fn test_tombstone_until_delete_is_flushed() {
        let mut state = StoreState::default();
        state.stage("k".into(), PendingOp::Write(json!(1)));
        let delete = state.stage("k".into(), PendingOp::Delete);

        assert_eq!(state.lookup("k"), Lookup::Deleted);
        // A stale disk read completing now must not resurrect the key
        let generation = state.generation("k");
        assert_eq!(state.fill("k", generation, json!("stale")), None);

        state.settle(&delete);
        assert_eq!(state.lookup("k"), Lookup::Miss);
        assert_eq!(state.cached_keys(), 0);
    }

    #[test]
    fn test_fill_prefers_staged_value() {
        let mut state = StoreState::default();
        state.stage("k".into(), PendingOp::Write(json!("new")));

        let generation = state.generation("k");
        assert_eq!(state.fill("k", generation, json!("old")), Some(json!("new")));
        assert_eq!(state.fill("other", 0, json!(3)), Some(json!(3)));
        assert_eq!(state.lookup("other"), Lookup::Hit(json!(3)));
    }

    #[test]
    fn test_read_overlapping_flushed_delete_is_discarded() {
        let mut state = StoreState::default();
        // Read starts while the key is unknown
        let generation = state.generation("k");
        assert_eq!(generation, 0);

        // Delete is staged and flushed before the read completes
        let delete = state.stage("k".into(), PendingOp::Delete);
        state.settle(&delete);
        assert_eq!(state.lookup("k"), Lookup::Miss);

        assert_eq!(state.fill("k", generation, json!("old")), None);
        assert_eq!(state.lookup("k"), Lookup::Miss);
        assert_eq!(state.cached_keys(), 0);

        // A read started after the delete may cache what it finds
        let generation = state.generation("k");
        assert_eq!(state.fill("k", generation, json!("new")), Some(json!("new")));
        assert_eq!(state.lookup("k"), Lookup::Hit(json!("new")));
    }

    #[test]
    fn test_read_overlapping_flushed_write_keeps_write() {
        let mut state = StoreState::default();
        let generation = state.generation("k");

        let write = state.stage("k".into(), PendingOp::Write(json!(2)));
        state.settle(&write);

        assert_eq!(state.fill("k", generation, json!(1)), Some(json!(2)));
        assert_eq!(state.lookup("k"), Lookup::Hit(json!(2)));
    }
}
