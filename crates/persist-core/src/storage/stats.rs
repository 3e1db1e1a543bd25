//! Disk I/O counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the disk activity of one store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Record files read (successfully or not)
    pub disk_reads: u64,
    /// Record files written
    pub disk_writes: u64,
    /// Record files removed (including already-missing ones)
    pub disk_removes: u64,
    /// Flush passes that drained the write queue
    pub flush_passes: u64,
}

/// Live counters behind [`StorageStats`]
#[derive(Debug, Default)]
pub(crate) struct IoCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    removes: AtomicU64,
    flush_passes: AtomicU64,
}

impl IoCounters {
    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush_pass(&self) {
        self.flush_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StorageStats {
        StorageStats {
            disk_reads: self.reads.load(Ordering::Relaxed),
            disk_writes: self.writes.load(Ordering::Relaxed),
            disk_removes: self.removes.load(Ordering::Relaxed),
            flush_passes: self.flush_passes.load(Ordering::Relaxed),
        }
    }
}
