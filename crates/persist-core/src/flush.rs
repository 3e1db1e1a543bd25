//! Flush coordination
//!
//! Drains the write queue to disk. At most one async flush runs per store:
//! the in-flight flag lives in a `watch` channel so writers that find a
//! flush running can wait for it to go idle instead of starting another.
//!
//! A flush yields once before reading the queue, so writes issued in the
//! same scheduling turn land in the same disk pass. It keeps draining
//! until the queue is empty, then releases the flag.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::storage::queue::{PendingOp, Ticket};
use crate::storage::StoreResult;
use crate::store::StoreInner;

/// The single in-flight flag of a store
#[derive(Debug)]
pub(crate) struct FlushCoordinator {
    in_flight: watch::Sender<bool>,
}

impl FlushCoordinator {
    pub fn new() -> Self {
        let (in_flight, _) = watch::channel(false);
        Self { in_flight }
    }

    /// Set the flag if it is clear; returns whether this call set it
    fn try_begin(&self) -> bool {
        self.in_flight.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        })
    }

    fn end(&self) {
        self.in_flight.send_replace(false);
    }

    pub fn is_in_flight(&self) -> bool {
        *self.in_flight.borrow()
    }

    /// Wait until no flush is running
    pub async fn wait_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        loop {
            let busy = *rx.borrow_and_update();
            if !busy {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Ownership of the in-flight flag; clears it on drop
pub(crate) struct InFlight {
    inner: Arc<StoreInner>,
}

impl InFlight {
    pub fn begin(inner: &Arc<StoreInner>) -> Option<Self> {
        inner.flusher.try_begin().then(|| Self {
            inner: Arc::clone(inner),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.inner.flusher.end();
    }
}

/// Start a background flush if none is running
///
/// Outside a tokio runtime this does nothing; the caller's returned
/// future drives the flush when awaited.
pub(crate) fn schedule(inner: &Arc<StoreInner>) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };
    let Some(guard) = InFlight::begin(inner) else {
        debug!("flush already in flight, coalescing");
        return;
    };

    handle.spawn(async move {
        if let Err(e) = run(guard).await {
            warn!("Background flush failed, entries stay queued: {}", e);
        }
    });
}

/// Run a flush while holding the in-flight flag
///
/// An error aborts the pass; operations not yet written stay queued for
/// the next flush.
pub(crate) async fn run(mut guard: InFlight) -> StoreResult<()> {
    let inner = Arc::clone(&guard.inner);

    // Let writes from the current turn join this batch
    tokio::task::yield_now().await;

    loop {
        loop {
            let batch = inner.state().batch();
            if batch.is_empty() {
                break;
            }
            debug!("flush: draining {} queued operations", batch.len());
            for (ticket, op) in batch {
                match &op {
                    PendingOp::Write(value) => inner.dir.write(&ticket.key, value).await?,
                    PendingOp::Delete => inner.dir.remove(&ticket.key).await?,
                }
                inner.state().settle(&ticket);
            }
            inner.dir.counters().record_flush_pass();
        }
        drop(guard);

        // A write may have been staged between the last drain and the
        // release; its own schedule attempt saw the flag still set.
        let remaining = inner.state().queue_len();
        if remaining == 0 {
            debug!("flush: done");
            return Ok(());
        }
        match InFlight::begin(&inner) {
            Some(next) => guard = next,
            None => return Ok(()),
        }
    }
}

/// Drain the whole queue on the calling thread, without the flag
pub(crate) fn drain_sync(inner: &StoreInner) -> StoreResult<()> {
    let batch: Vec<(Ticket, PendingOp)> = inner.state().batch();
    if batch.is_empty() {
        return Ok(());
    }

    debug!("flush sync: draining {} queued operations", batch.len());
    for (ticket, op) in batch {
        match &op {
            PendingOp::Write(value) => inner.dir.write_sync(&ticket.key, value)?,
            PendingOp::Delete => inner.dir.remove_sync(&ticket.key)?,
        }
        inner.state().settle(&ticket);
    }
    inner.dir.counters().record_flush_pass();
    Ok(())
}
