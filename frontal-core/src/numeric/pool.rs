//! Workspace allocation for fronts and contribution blocks.
//!
//! Node tasks running in parallel draw zeroed `f64` buffers from a shared
//! allocator and hand them back at the extend-add point. Two strategies
//! are provided:
//! - [`PoolAlloc`]: the predicted workspace is reserved up front and
//!   buffers are recycled by capacity
//! - [`HeapAlloc`]: every request goes to the global allocator

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::{FactorError, FactorResult};

/// Allocation strategy for numeric workspace.
pub trait FrontAlloc: Send + Sync {
    /// Create an allocator for a tree whose sequential peak is `workspace`
    /// entries, the largest single front holding `largest` of them.
    fn reserve(workspace: usize, largest: usize) -> FactorResult<Self>
    where
        Self: Sized;

    /// Zeroed buffer of exactly `len` entries.
    fn acquire(&self, len: usize) -> FactorResult<Vec<f64>>;

    /// Return a buffer obtained from [`FrontAlloc::acquire`].
    fn release(&self, buf: Vec<f64>);

    /// Peak number of entries held at once.
    fn peak(&self) -> usize;
}

/// Usage counters shared by both strategies.
#[derive(Debug, Default)]
struct Usage {
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

impl Usage {
    fn add(&self, len: usize) {
        let now = self.in_use.fetch_add(len, Ordering::Relaxed) + len;
        self.peak.fetch_max(now, Ordering::Relaxed);
    }

    fn sub(&self, len: usize) {
        self.in_use.fetch_sub(len, Ordering::Relaxed);
    }
}

fn try_alloc(len: usize) -> FactorResult<Vec<f64>> {
    let mut buf: Vec<f64> = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| FactorError::AllocationFailed { requested: len })?;
    Ok(buf)
}

/// Page-based pool allocator.
///
/// [`FrontAlloc::reserve`] allocates one buffer large enough for the largest
/// front and covers the rest of the predicted workspace with whole pages.
/// Requests are served best-fit from the parked buffers: up to `PAGE_SIZE`
/// entries only from buffers of at most a page, larger ones from any buffer
/// big enough. Only when nothing fits is fresh memory taken, rounded to a
/// power of two (at least 64) or to whole pages.
#[derive(Debug)]
pub struct PoolAlloc<const PAGE_SIZE: usize> {
    /// Parked buffers keyed by capacity
    free: Mutex<BTreeMap<usize, Vec<Vec<f64>>>>,
    usage: Usage,
    reserved: usize,
    fresh: AtomicUsize,
}

impl<const PAGE_SIZE: usize> Default for PoolAlloc<PAGE_SIZE> {
    fn default() -> Self {
        Self {
            free: Mutex::new(BTreeMap::new()),
            usage: Usage::default(),
            reserved: 0,
            fresh: AtomicUsize::new(0),
        }
    }
}

impl<const PAGE_SIZE: usize> PoolAlloc<PAGE_SIZE> {
    const MIN_CLASS: usize = 64;

    /// Size class of fresh memory for a request of `len` entries.
    pub fn size_class(len: usize) -> usize {
        if len <= PAGE_SIZE {
            len.next_power_of_two().max(Self::MIN_CLASS)
        } else {
            len.div_ceil(PAGE_SIZE) * PAGE_SIZE
        }
    }

    /// Number of buffers currently parked.
    pub fn free_buffers(&self) -> usize {
        self.free.lock().values().map(Vec::len).sum()
    }

    /// Entries allocated by [`FrontAlloc::reserve`].
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// Requests that no parked buffer could serve.
    pub fn fresh_allocations(&self) -> usize {
        self.fresh.load(Ordering::Relaxed)
    }

    fn park(&self, buf: Vec<f64>) {
        let cap = buf.capacity();
        if cap >= Self::MIN_CLASS {
            self.free.lock().entry(cap).or_default().push(buf);
        }
    }

    fn best_fit(&self, len: usize) -> Option<Vec<f64>> {
        let mut free = self.free.lock();
        let cap = if len <= PAGE_SIZE {
            free.range(len..=PAGE_SIZE).next().map(|(&cap, _)| cap)
        } else {
            free.range(len..).next().map(|(&cap, _)| cap)
        }?;
        let list = free.get_mut(&cap)?;
        let buf = list.pop();
        if list.is_empty() {
            free.remove(&cap);
        }
        buf
    }
}

impl<const PAGE_SIZE: usize> FrontAlloc for PoolAlloc<PAGE_SIZE> {
    fn reserve(workspace: usize, largest: usize) -> FactorResult<Self> {
        let mut pool = Self::default();
        if workspace == 0 {
            return Ok(pool);
        }

        let first = Self::size_class(largest.clamp(1, workspace));
        pool.reserved += first;
        pool.park(try_alloc(first)?);

        let mut rest = workspace.saturating_sub(first);
        while rest > 0 {
            let len = if rest > PAGE_SIZE { PAGE_SIZE } else { Self::size_class(rest) };
            pool.reserved += len;
            pool.park(try_alloc(len)?);
            rest = rest.saturating_sub(len);
        }
        Ok(pool)
    }

    fn acquire(&self, len: usize) -> FactorResult<Vec<f64>> {
        let mut buf = match self.best_fit(len) {
            Some(buf) => buf,
            None => {
                self.fresh.fetch_add(1, Ordering::Relaxed);
                try_alloc(Self::size_class(len))?
            }
        };
        buf.clear();
        buf.resize(len, 0.0);
        self.usage.add(len);
        Ok(buf)
    }

    fn release(&self, buf: Vec<f64>) {
        self.usage.sub(buf.len());
        self.park(buf);
    }

    fn peak(&self) -> usize {
        self.usage.peak.load(Ordering::Relaxed)
    }
}

/// Allocator that defers to the global heap.
#[derive(Debug, Default)]
pub struct HeapAlloc {
    usage: Usage,
}

impl FrontAlloc for HeapAlloc {
    fn reserve(_workspace: usize, _largest: usize) -> FactorResult<Self> {
        Ok(Self::default())
    }

    fn acquire(&self, len: usize) -> FactorResult<Vec<f64>> {
        let mut buf = try_alloc(len)?;
        buf.resize(len, 0.0);
        self.usage.add(len);
        Ok(buf)
    }

    fn release(&self, buf: Vec<f64>) {
        self.usage.sub(buf.len());
    }

    fn peak(&self) -> usize {
        self.usage.peak.load(Ordering::Relaxed)
    }
}
