//! Per-session arena: a fixed bump region with a pooled block layer above it.

use std::alloc::Layout;
use std::cell::RefCell;
use std::ops::Deref;
use std::ptr::NonNull;

use bumpalo::Bump;

use crate::error::{Error, Result};

/// Smallest pooled block size. Requests below this are rounded up.
const MIN_BLOCK: usize = 256;
/// Largest pooled block size. Larger blocks are served straight from the
/// bump region and not recycled.
const MAX_BLOCK: usize = 64 * 1024;
/// Free-list count: powers of two from `MIN_BLOCK` to `MAX_BLOCK`.
const CLASS_COUNT: usize = (MAX_BLOCK.ilog2() - MIN_BLOCK.ilog2() + 1) as usize;
const BLOCK_ALIGN: usize = 8;

/// Free list index for a power-of-two block size, if it is pooled.
fn class_index(size: usize) -> Option<usize> {
    if size > MAX_BLOCK {
        return None;
    }
    Some((size.ilog2() - MIN_BLOCK.ilog2()) as usize)
}

#[derive(Default)]
struct FreeLists {
    lists: [Vec<NonNull<u8>>; CLASS_COUNT],
}

/// A fixed-capacity arena owned by exactly one session.
///
/// Two layers:
///
/// - A monotonic **bump region** of the configured capacity. Individual
///   frees are no-ops; the region is reclaimed wholesale.
/// - A **block pool** above it: size-classed free lists recycling the buffer
///   blocks behind [`ArenaBuf`], so a keep-alive connection reuses the same
///   receive and serialization blocks request after request.
///
/// All references handed out (`alloc_bytes`, `alloc_str`, buffer contents)
/// borrow the arena, so the borrow checker proves none survive
/// [`reset`](Self::reset) or teardown. The arena is `Send` (it moves into
/// its worker thread) but deliberately not `Sync`: one session, one thread.
///
/// Exhausting the region fails with [`Error::OutOfCapacity`]; the owning
/// session aborts and the arena is released in one step.
pub struct SessionArena {
    // Declared before `bump`: drop clears pool bookkeeping, then the bump
    // region releases its backing heap block.
    free: RefCell<FreeLists>,
    bump: Bump,
    capacity: usize,
}

// SAFETY: free-list entries point into chunks owned by `bump`, which are
// heap-stable when the arena value moves. Nothing here is shared: the type
// stays !Sync via RefCell.
unsafe impl Send for SessionArena {}

impl SessionArena {
    /// A fresh arena with its own heap region of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        let bump = Bump::with_capacity(capacity);
        bump.set_allocation_limit(Some(capacity));
        Self {
            free: RefCell::new(FreeLists::default()),
            bump,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Backing bytes currently reserved by the bump region.
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    /// The raw bump allocator, for `bumpalo::collections` values whose
    /// lifetime is tied to this arena.
    pub fn bump(&self) -> &Bump {
        &self.bump
    }

    /// Copy `data` into the arena.
    pub fn alloc_bytes(&self, data: &[u8]) -> Result<&[u8]> {
        if data.is_empty() {
            return Ok(&[]);
        }
        let layout = Layout::array::<u8>(data.len()).map_err(|_| Error::OutOfCapacity)?;
        let dst = self.try_alloc(layout)?;
        // SAFETY: `dst` is a fresh allocation of `data.len()` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst.as_ptr(), data.len());
            Ok(std::slice::from_raw_parts(dst.as_ptr(), data.len()))
        }
    }

    /// Copy `s` into the arena.
    pub fn alloc_str(&self, s: &str) -> Result<&str> {
        let bytes = self.alloc_bytes(s.as_bytes())?;
        // SAFETY: byte-for-byte copy of a valid &str.
        Ok(unsafe { std::str::from_utf8_unchecked(bytes) })
    }

    /// A growable byte buffer backed by the block pool, starting with room
    /// for at least `capacity` bytes.
    pub fn buf(&self, capacity: usize) -> Result<ArenaBuf<'_>> {
        let (ptr, cap) = self.acquire_block(capacity)?;
        Ok(ArenaBuf {
            arena: self,
            ptr,
            cap,
            len: 0,
        })
    }

    /// Rewind the whole arena: pool free lists are emptied and the bump
    /// pointer returns to the start of the region.
    ///
    /// Requires `&mut self`, so no allocation handed out earlier can still
    /// be alive. The session worker calls this between keep-alive requests,
    /// bounding the connection at the arena's capacity no matter how many
    /// requests it serves.
    pub fn reset(&mut self) {
        for list in &mut self.free.get_mut().lists {
            list.clear();
        }
        self.bump.reset();
    }

    fn try_alloc(&self, layout: Layout) -> Result<NonNull<u8>> {
        self.bump
            .try_alloc_layout(layout)
            .map_err(|_| Error::OutOfCapacity)
    }

    /// Pop a recycled block of at least `min_size` bytes, or carve a zeroed
    /// one from the bump region. Returns the block and its rounded capacity.
    fn acquire_block(&self, min_size: usize) -> Result<(NonNull<u8>, usize)> {
        let size = min_size.max(MIN_BLOCK).next_power_of_two();
        if let Some(class) = class_index(size) {
            if let Some(ptr) = self.free.borrow_mut().lists[class].pop() {
                return Ok((ptr, size));
            }
        }
        let layout = Layout::from_size_align(size, BLOCK_ALIGN).map_err(|_| Error::OutOfCapacity)?;
        let ptr = self.try_alloc(layout)?;
        // SAFETY: fresh allocation of `size` bytes; zeroed so buffer reads
        // below the write watermark never observe uninitialized memory.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok((ptr, size))
    }

    fn release_block(&self, ptr: NonNull<u8>, size: usize) {
        if let Some(class) = class_index(size) {
            self.free.borrow_mut().lists[class].push(ptr);
        }
    }
}

/// Growable byte buffer carved from a [`SessionArena`]'s block pool.
///
/// Used for receive accumulation and response serialization. Growth moves to
/// the next size class and recycles the old block; `Drop` returns the block
/// to the pool so the next request on the connection reuses it.
pub struct ArenaBuf<'a> {
    arena: &'a SessionArena,
    ptr: NonNull<u8>,
    cap: usize,
    len: usize,
}

impl<'a> ArenaBuf<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: bytes below `len` were written via `extend_from_slice` or
        // reported by `advance` over zero-initialized block memory.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Append `data`, growing into a larger block if needed.
    pub fn extend_from_slice(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(data.len())?;
        // SAFETY: `reserve` guarantees `len + data.len() <= cap`.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.ptr.as_ptr().add(self.len),
                data.len(),
            );
        }
        self.len += data.len();
        Ok(())
    }

    /// Ensure room for `additional` more bytes past the current length.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self
            .len
            .checked_add(additional)
            .ok_or(Error::OutOfCapacity)?;
        if needed <= self.cap {
            return Ok(());
        }
        let (new_ptr, new_cap) = self.arena.acquire_block(needed)?;
        // SAFETY: both blocks are live and at least `len` bytes long.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), new_ptr.as_ptr(), self.len);
        }
        let (old_ptr, old_cap) = (self.ptr, self.cap);
        self.ptr = new_ptr;
        self.cap = new_cap;
        self.arena.release_block(old_ptr, old_cap);
        Ok(())
    }

    /// The writable region past the current length, for `receive` to fill.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        // SAFETY: block memory is initialized (zeroed or recycled) and
        // exclusively owned by this buffer.
        unsafe {
            std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(self.len), self.cap - self.len)
        }
    }

    /// Mark `n` bytes of the spare region as filled.
    pub fn advance(&mut self, n: usize) {
        assert!(n <= self.cap - self.len, "advance past buffer capacity");
        self.len += n;
    }
}

impl Deref for ArenaBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Drop for ArenaBuf<'_> {
    fn drop(&mut self) {
        self.arena.release_block(self.ptr, self.cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_round_trips() {
        let arena = SessionArena::new(4096);
        let bytes = arena.alloc_bytes(b"hello").unwrap();
        assert_eq!(bytes, b"hello");
        let s = arena.alloc_str("world").unwrap();
        assert_eq!(s, "world");
        assert_eq!(arena.capacity(), 4096);
    }

    #[test]
    fn empty_alloc_is_free() {
        let arena = SessionArena::new(256);
        assert_eq!(arena.alloc_bytes(&[]).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn exhaustion_reports_out_of_capacity() {
        let arena = SessionArena::new(4096);
        let big = vec![0u8; 64 * 1024];
        match arena.alloc_bytes(&big) {
            Err(Error::OutOfCapacity) => {}
            other => panic!("expected OutOfCapacity, got {other:?}"),
        }
    }

    #[test]
    fn reset_reclaims_the_region() {
        let mut arena = SessionArena::new(8192);
        let chunk = vec![7u8; 3000];
        // Far more total traffic than the region holds; reset must reclaim.
        for _ in 0..50 {
            arena.reset();
            arena.alloc_bytes(&chunk).unwrap();
            arena.alloc_bytes(&chunk).unwrap();
        }
    }

    #[test]
    fn buf_blocks_are_recycled() {
        let arena = SessionArena::new(16 * 1024);
        let first = {
            let buf = arena.buf(1024).unwrap();
            buf.as_slice().as_ptr() as usize
        };
        let second = {
            let buf = arena.buf(1024).unwrap();
            buf.as_slice().as_ptr() as usize
        };
        assert_eq!(first, second);
    }

    #[test]
    fn buf_grows_and_preserves_content() {
        let arena = SessionArena::new(16 * 1024);
        let mut buf = arena.buf(16).unwrap();
        let initial_cap = buf.capacity();
        let payload: Vec<u8> = (0..=255).cycle().take(2048).map(|b| b as u8).collect();
        buf.extend_from_slice(&payload).unwrap();
        assert!(buf.capacity() > initial_cap);
        assert_eq!(buf.as_slice(), payload.as_slice());
    }

    #[test]
    fn buf_spare_and_advance_model_receive() {
        let arena = SessionArena::new(8192);
        let mut buf = arena.buf(512).unwrap();
        let spare = buf.spare_mut();
        spare[..4].copy_from_slice(b"GET ");
        buf.advance(4);
        assert_eq!(buf.as_slice(), b"GET ");
        assert!(buf.spare_mut().iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_blocks_are_not_pooled() {
        let arena = SessionArena::new(512 * 1024);
        let first = {
            let buf = arena.buf(MAX_BLOCK * 2).unwrap();
            buf.as_slice().as_ptr() as usize
        };
        let second = {
            let buf = arena.buf(MAX_BLOCK * 2).unwrap();
            buf.as_slice().as_ptr() as usize
        };
        assert_ne!(first, second);
    }

    #[test]
    fn arena_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SessionArena>();
    }
}
