//! Freelist pool of sample buffers.
//!
//! Two classes of buffer come out of a pool:
//!
//! - **Scratch** buffers live for one evaluation call. They are handed out
//!   as a [`Scratch`] guard that returns the buffer to the pool when it is
//!   dropped, on every exit path.
//! - **Persistent** buffers hold history across evaluation calls (delay
//!   lines, loop recordings). They are handed out as a [`PersistentBuf`]
//!   that has no drop hook; the owning node gives it back with
//!   [`BufferPool::release_persistent`] when the graph is torn down.
//!
//! Buffers are only allocated when the freelist is empty. Each time a new
//! buffer is created the freelist's capacity is grown to cover it, so
//! handing buffers back never allocates.
//!
//! The pool is single-threaded: one pool serves one voice's evaluation call
//! tree, and nodes share it through `&BufferPool`.

use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::ops::{Deref, DerefMut};

use crate::fpcm::Fpcm;

/// Initial freelist capacity for each buffer class.
const INITIAL_FREELIST: usize = 16;

/// Pool of reusable scratch and persistent sample buffers.
#[derive(Debug)]
pub struct BufferPool {
    scratch_len: usize,
    persistent_len: usize,
    free_scratch: RefCell<Vec<Fpcm>>,
    free_persistent: RefCell<Vec<Fpcm>>,
    scratch_out: Cell<usize>,
    persistent_out: Cell<usize>,
    allocated: Cell<usize>,
}

impl BufferPool {
    /// Create an empty pool handing out buffers of the given lengths.
    pub fn new(scratch_len: usize, persistent_len: usize) -> Self {
        Self {
            scratch_len,
            persistent_len,
            free_scratch: RefCell::new(Vec::with_capacity(INITIAL_FREELIST)),
            free_persistent: RefCell::new(Vec::with_capacity(INITIAL_FREELIST)),
            scratch_out: Cell::new(0),
            persistent_out: Cell::new(0),
            allocated: Cell::new(0),
        }
    }

    /// Pre-fill the freelists so the first evaluation passes don't allocate.
    pub fn preallocate(&self, scratch: usize, persistent: usize) {
        let mut free = self.free_scratch.borrow_mut();
        free.reserve(scratch);
        for _ in 0..scratch {
            free.push(Fpcm::zeroed(self.scratch_len));
        }
        let mut free = self.free_persistent.borrow_mut();
        free.reserve(persistent);
        for _ in 0..persistent {
            free.push(Fpcm::zeroed(self.persistent_len));
        }
        self.allocated.set(self.allocated.get() + scratch + persistent);
    }

    /// Length of every scratch buffer.
    pub fn scratch_len(&self) -> usize {
        self.scratch_len
    }

    /// Length of every persistent buffer.
    pub fn persistent_len(&self) -> usize {
        self.persistent_len
    }

    /// Borrow a zeroed scratch buffer for the duration of one evaluation call.
    pub fn scratch(&self) -> Scratch<'_> {
        let buf = take_or_create(&self.free_scratch, self.scratch_len, &self.allocated);
        self.scratch_out.set(self.scratch_out.get() + 1);
        Scratch { buf, pool: self }
    }

    /// Take a zeroed persistent buffer. It must be handed back with
    /// [`release_persistent`](Self::release_persistent).
    pub fn persistent(&self) -> PersistentBuf {
        let buf = take_or_create(&self.free_persistent, self.persistent_len, &self.allocated);
        self.persistent_out.set(self.persistent_out.get() + 1);
        PersistentBuf(buf)
    }

    /// Return a persistent buffer to the pool.
    pub fn release_persistent(&self, buf: PersistentBuf) {
        debug_assert_eq!(buf.0.len(), self.persistent_len, "buffer from another pool");
        self.persistent_out.set(self.persistent_out.get().saturating_sub(1));
        self.free_persistent.borrow_mut().push(buf.0);
    }

    /// Scratch buffers currently handed out.
    pub fn outstanding_scratch(&self) -> usize {
        self.scratch_out.get()
    }

    /// Persistent buffers currently handed out.
    pub fn outstanding_persistent(&self) -> usize {
        self.persistent_out.get()
    }

    /// All buffers currently handed out.
    pub fn outstanding(&self) -> usize {
        self.outstanding_scratch() + self.outstanding_persistent()
    }

    /// Total buffers this pool has ever created.
    pub fn allocated(&self) -> usize {
        self.allocated.get()
    }

    fn give_back_scratch(&self, buf: Fpcm) {
        self.scratch_out.set(self.scratch_out.get().saturating_sub(1));
        self.free_scratch.borrow_mut().push(buf);
    }
}

fn take_or_create(free: &RefCell<Vec<Fpcm>>, len: usize, allocated: &Cell<usize>) -> Fpcm {
    let mut free = free.borrow_mut();
    match free.pop() {
        Some(mut buf) => {
            buf.silence();
            buf
        }
        None => {
            let total = allocated.get() + 1;
            allocated.set(total);
            // Keep room for every buffer this pool owns so returns never grow the list.
            let needed = total.saturating_sub(free.len());
            free.reserve(needed);
            Fpcm::zeroed(len)
        }
    }
}

/// A scratch buffer on loan from a [`BufferPool`], returned on drop.
pub struct Scratch<'a> {
    buf: Fpcm,
    pool: &'a BufferPool,
}

impl Deref for Scratch<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.buf
    }
}

impl DerefMut for Scratch<'_> {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.buf
    }
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        let buf = core::mem::take(&mut self.buf);
        self.pool.give_back_scratch(buf);
    }
}

/// A buffer whose contents survive across evaluation calls.
///
/// Dropping one without handing it to [`BufferPool::release_persistent`]
/// frees the memory but leaves the pool's outstanding count raised, which
/// is how leaks show up in tests.
#[derive(Debug)]
#[must_use = "persistent buffers must be released back to their pool"]
pub struct PersistentBuf(Fpcm);

impl Deref for PersistentBuf {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl DerefMut for PersistentBuf {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_returns_on_drop() {
        let pool = BufferPool::new(8, 32);
        {
            let a = pool.scratch();
            let b = pool.scratch();
            assert_eq!(a.len(), 8);
            assert_eq!(b.len(), 8);
            assert_eq!(pool.outstanding_scratch(), 2);
        }
        assert_eq!(pool.outstanding_scratch(), 0);
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn scratch_is_reused_and_zeroed() {
        let pool = BufferPool::new(4, 4);
        {
            let mut s = pool.scratch();
            s.fill(1.0);
        }
        let s = pool.scratch();
        assert!(s.iter().all(|&x| x == 0.0));
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn persistent_needs_explicit_release() {
        let pool = BufferPool::new(4, 16);
        let buf = pool.persistent();
        assert_eq!(buf.len(), 16);
        assert_eq!(pool.outstanding_persistent(), 1);
        pool.release_persistent(buf);
        assert_eq!(pool.outstanding_persistent(), 0);

        let again = pool.persistent();
        assert_eq!(pool.allocated(), 1);
        pool.release_persistent(again);
    }

    #[test]
    fn dropped_persistent_shows_as_leak() {
        let pool = BufferPool::new(4, 16);
        drop(pool.persistent());
        assert_eq!(pool.outstanding_persistent(), 1);
    }

    #[test]
    fn preallocate_fills_freelists() {
        let pool = BufferPool::new(4, 16);
        pool.preallocate(3, 2);
        assert_eq!(pool.allocated(), 5);
        let _a = pool.scratch();
        let b = pool.persistent();
        assert_eq!(pool.allocated(), 5);
        pool.release_persistent(b);
    }

    #[test]
    fn outstanding_sums_both_classes() {
        let pool = BufferPool::new(4, 16);
        let _s = pool.scratch();
        let p = pool.persistent();
        assert_eq!(pool.outstanding(), 2);
        pool.release_persistent(p);
        assert_eq!(pool.outstanding(), 1);
    }
}
