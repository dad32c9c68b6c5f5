//! Instrumentation decorator over any [`RawAllocator`].
//!
//! Forwards every call to the wrapped allocator and accounts for it:
//! allocation/byte totals, live counts, a power-of-two size histogram,
//! and a lifecycle event per operation. Deallocation sizes come from a
//! side table keyed by block address, recorded at allocation time --
//! caller-supplied layouts are forwarded to the inner allocator but
//! never trusted for accounting.
//!
//! Counters are atomics updated with relaxed ordering: adequate for
//! monotonic accounting read for reporting. Callers needing
//! snapshot-then-act guarantees must serialize around the allocator
//! themselves (see `quarry_core::LockedAllocator`).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use quarry_core::{AllocError, Handle, Layout, RawAllocator};

use crate::events::{EventLevel, EventLog, EventRecord};
use crate::stats::{AllocatorStats, NUM_SIZE_BUCKETS, bucket_index};

#[derive(Debug, Default)]
struct StatCounters {
    live_allocations: AtomicUsize,
    live_bytes: AtomicUsize,
    total_allocations: AtomicU64,
    total_bytes: AtomicU64,
    failed_allocations: AtomicU64,
    size_histogram: [AtomicU64; NUM_SIZE_BUCKETS],
}

impl StatCounters {
    fn snapshot(&self) -> AllocatorStats {
        let mut size_histogram = [0u64; NUM_SIZE_BUCKETS];
        for (out, bucket) in size_histogram.iter_mut().zip(&self.size_histogram) {
            *out = bucket.load(Ordering::Relaxed);
        }
        AllocatorStats {
            live_allocations: self.live_allocations.load(Ordering::Relaxed),
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
            size_histogram,
        }
    }
}

/// Cheap cloneable view of a decorator's counters, for reading stats
/// from threads that do not hold the allocator.
#[derive(Debug, Clone)]
pub struct StatsHandle {
    counters: Arc<StatCounters>,
}

impl StatsHandle {
    /// Copies the counters into a read-only snapshot.
    #[must_use]
    pub fn snapshot(&self) -> AllocatorStats {
        self.counters.snapshot()
    }
}

/// Decorator recording accounting for every call into the wrapped
/// allocator.
#[derive(Debug)]
pub struct InstrumentedAllocator<A: RawAllocator> {
    inner: A,
    counters: Arc<StatCounters>,
    /// Side table: block address -> requested size at allocation time.
    sizes: Mutex<HashMap<usize, usize>>,
    events: EventLog,
}

impl<A: RawAllocator> InstrumentedAllocator<A> {
    /// Wraps an allocator with zeroed counters.
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            counters: Arc::new(StatCounters::default()),
            sizes: Mutex::new(HashMap::new()),
            events: EventLog::default(),
        }
    }

    /// Read-only snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> AllocatorStats {
        self.counters.snapshot()
    }

    /// A cloneable stats view that outlives borrows of the allocator.
    #[must_use]
    pub fn stats_handle(&self) -> StatsHandle {
        StatsHandle {
            counters: Arc::clone(&self.counters),
        }
    }

    /// Copies the accumulated lifecycle events.
    #[must_use]
    pub fn events(&self) -> Vec<EventRecord> {
        self.events.snapshot()
    }

    /// Drains the accumulated lifecycle events.
    pub fn drain_events(&self) -> Vec<EventRecord> {
        self.events.drain()
    }

    /// Access to the wrapped allocator, for operations beyond the
    /// trait surface. Accounting only sees trait calls, so e.g. an
    /// `Arena::reset` through this reference leaves live counters
    /// stale until the caller deallocates the stale handles.
    pub fn inner_mut(&mut self) -> &mut A {
        &mut self.inner
    }

    /// Unwraps the inner allocator, discarding the counters.
    pub fn into_inner(self) -> A {
        self.inner
    }

    fn live(&self) -> (usize, usize) {
        (
            self.counters.live_allocations.load(Ordering::Relaxed),
            self.counters.live_bytes.load(Ordering::Relaxed),
        )
    }
}

impl<A: RawAllocator> RawAllocator for InstrumentedAllocator<A> {
    fn allocate(&mut self, layout: Layout) -> Result<Handle, AllocError> {
        let size = layout.size();
        match self.inner.allocate(layout) {
            Ok(handle) => {
                let counters = &self.counters;
                counters.total_allocations.fetch_add(1, Ordering::Relaxed);
                counters.total_bytes.fetch_add(size as u64, Ordering::Relaxed);
                counters.live_allocations.fetch_add(1, Ordering::Relaxed);
                counters.live_bytes.fetch_add(size, Ordering::Relaxed);
                counters.size_histogram[bucket_index(size)].fetch_add(1, Ordering::Relaxed);
                self.sizes.lock().insert(handle.addr(), size);

                let (live, live_bytes) = self.live();
                self.events.record(
                    EventLevel::Trace,
                    "allocate",
                    "success",
                    Some(handle.addr()),
                    Some(size),
                    live,
                    live_bytes,
                );
                Ok(handle)
            }
            Err(err) => {
                self.counters
                    .failed_allocations
                    .fetch_add(1, Ordering::Relaxed);
                let (live, live_bytes) = self.live();
                self.events.record(
                    EventLevel::Warn,
                    "allocate",
                    if err.is_oom() { "oom" } else { "rejected" },
                    None,
                    Some(size),
                    live,
                    live_bytes,
                );
                Err(err)
            }
        }
    }

    fn deallocate(&mut self, handle: Handle, layout: Layout) -> Result<(), AllocError> {
        let addr = handle.addr();
        let recorded = self.sizes.lock().remove(&addr);
        match self.inner.deallocate(handle, layout) {
            Ok(()) => {
                let (level, outcome) = match recorded {
                    Some(size) => {
                        self.counters.live_allocations.fetch_sub(1, Ordering::Relaxed);
                        self.counters.live_bytes.fetch_sub(size, Ordering::Relaxed);
                        (EventLevel::Trace, "success")
                    }
                    // The inner allocator accepted an address we never
                    // recorded; leave counters untouched rather than
                    // underflow them.
                    None => (EventLevel::Warn, "unknown_free"),
                };
                let (live, live_bytes) = self.live();
                self.events
                    .record(level, "deallocate", outcome, Some(addr), recorded, live, live_bytes);
                Ok(())
            }
            Err(err) => {
                // The block is still live; restore its record.
                if let Some(size) = recorded {
                    self.sizes.lock().insert(addr, size);
                }
                let outcome = match err {
                    AllocError::DoubleFree { .. } => "double_free",
                    AllocError::ForeignHandle { .. } => "foreign_handle",
                    _ => "error",
                };
                let (live, live_bytes) = self.live();
                self.events.record(
                    EventLevel::Error,
                    "deallocate",
                    outcome,
                    Some(addr),
                    recorded,
                    live,
                    live_bytes,
                );
                Err(err)
            }
        }
    }
}
