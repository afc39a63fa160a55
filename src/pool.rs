//! Pool of binary readers shared by concurrent lookups.
//!
//! Every structured decode borrows a reader from the pool and returns it,
//! so file handles are amortised across requests instead of opened per
//! call. The idle queue is the only mutually-exclusive region on the hot
//! path.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::reader::{BinaryReader, ByteSource};

/// Bounded-idle, unbounded-growth pool of [`BinaryReader`]s over one source.
///
/// `acquire` hands out an idle reader or creates a new one; `release`
/// returns it. After all in-flight readers are released the diagnostic
/// invariant `created() == queued()` holds.
#[derive(Debug)]
pub struct ReaderPool {
    source: Arc<ByteSource>,
    idle: Mutex<VecDeque<BinaryReader>>,
    /// Total readers ever constructed. Monotonic, diagnostic only.
    created: AtomicUsize,
    closed: AtomicBool,
}

impl ReaderPool {
    /// Create an empty pool bound to the source. Readers are constructed
    /// on demand by `acquire`.
    pub fn new(source: Arc<ByteSource>) -> Self {
        Self {
            source,
            idle: Mutex::new(VecDeque::new()),
            created: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Take an idle reader, or construct a new one bound to the same
    /// source.
    pub fn acquire(&self) -> Result<BinaryReader> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        if let Some(reader) = self.idle.lock().pop_front() {
            return Ok(reader);
        }
        let reader = BinaryReader::new(Arc::clone(&self.source))?;
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(reader)
    }

    /// Return a reader to the idle queue. Readers released after close are
    /// dropped instead of queued.
    pub fn release(&self, reader: BinaryReader) {
        if self.closed.load(Ordering::Acquire) {
            drop(reader);
            return;
        }
        self.idle.lock().push_back(reader);
    }

    /// Drain and dispose every idle reader. Subsequent `acquire` calls fail
    /// with [`Error::Closed`]. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.idle.lock().clear();
    }

    /// Total readers ever constructed.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Readers currently sitting in the idle queue.
    pub fn queued(&self) -> usize {
        self.idle.lock().len()
    }

    /// The byte source this pool is bound to.
    pub fn source(&self) -> &Arc<ByteSource> {
        &self.source
    }
}

/// Scoped reader borrow that returns to the pool on drop, including on
/// error paths.
pub struct PooledReader<'a> {
    pool: &'a ReaderPool,
    reader: Option<BinaryReader>,
}

impl<'a> PooledReader<'a> {
    pub fn acquire(pool: &'a ReaderPool) -> Result<Self> {
        let reader = pool.acquire()?;
        Ok(Self {
            pool,
            reader: Some(reader),
        })
    }
}

impl std::ops::Deref for PooledReader<'_> {
    type Target = BinaryReader;

    fn deref(&self) -> &BinaryReader {
        self.reader.as_ref().expect("reader present until drop")
    }
}

impl std::ops::DerefMut for PooledReader<'_> {
    fn deref_mut(&mut self) -> &mut BinaryReader {
        self.reader.as_mut().expect("reader present until drop")
    }
}

impl Drop for PooledReader<'_> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.pool.release(reader);
        }
    }
}
