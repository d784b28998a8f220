//! Synchronized monotonic arena: the manager's main pool.

use std::alloc::Layout;

use bumpalo::Bump;
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Thread-safe monotonic arena.
///
/// The [`MemoryManager`](crate::memory::MemoryManager) backs its main pool
/// with one of these, sized once at startup. Unlike
/// [`SessionArena`](crate::memory::SessionArena) it is never reset, so
/// references it hands out stay valid for the life of the arena — the right
/// shape for long-lived embedder data shared across threads.
pub struct SharedArena {
    bump: Mutex<Bump>,
    capacity: usize,
}

impl SharedArena {
    pub fn with_capacity(capacity: usize) -> Self {
        let bump = Bump::with_capacity(capacity);
        bump.set_allocation_limit(Some(capacity));
        Self {
            bump: Mutex::new(bump),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Backing bytes currently reserved.
    pub fn allocated_bytes(&self) -> usize {
        self.bump.lock().allocated_bytes()
    }

    /// Copy `data` into the arena. The reference is valid as long as the
    /// arena itself.
    pub fn alloc_bytes(&self, data: &[u8]) -> Result<&[u8]> {
        if data.is_empty() {
            return Ok(&[]);
        }
        let layout = Layout::array::<u8>(data.len()).map_err(|_| Error::OutOfCapacity)?;
        let bump = self.bump.lock();
        let dst = bump
            .try_alloc_layout(layout)
            .map_err(|_| Error::OutOfCapacity)?;
        // SAFETY: fresh allocation of `data.len()` bytes. The returned slice
        // outlives the lock guard: bump chunks are heap-stable and there is
        // no reset path, so the bytes live until the arena is dropped, which
        // the `&self` lifetime on the return value already bounds.
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
}
