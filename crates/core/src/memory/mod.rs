//! Two-tier arena memory subsystem.
//!
//! Every byte of per-request state — receive buffers, parsed requests,
//! response bodies, serialized output — lives in an arena owned by exactly
//! one session, and is reclaimed in bulk when that session ends. The server's
//! long-lived embedder data draws from a single shared pool sized at startup.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ MemoryManager                               │
//! │  ├─ SharedArena (main pool, sized once)     │
//! │  └─ create_session_arena() ──┐              │
//! └──────────────────────────────┼──────────────┘
//!                                ▼ one per accepted connection
//!                  ┌──────────────────────────────┐
//!                  │ SessionArena                 │
//!                  │  ├─ bump region (fixed size) │
//!                  │  └─ size-classed block pool  │
//!                  └──────────────────────────────┘
//! ```
//!
//! ## Layers
//!
//! - [`SessionArena`] — single-threaded bump region with a pooled layer of
//!   size-classed free lists above it. Owned by one session worker; released
//!   in one step at session teardown.
//! - [`ArenaBuf`] — growable byte buffer drawing blocks from the pool layer.
//!   Dropping it recycles its block for the next request on the connection.
//! - [`SharedArena`] — the synchronized variant backing the manager's main
//!   pool. Monotonic: allocations live as long as the arena.
//!
//! Exhaustion of any arena surfaces as [`Error::OutOfCapacity`] and is
//! confined to the owning session.

pub mod arena;
pub mod shared;

pub use arena::{ArenaBuf, SessionArena};
pub use shared::SharedArena;

/// Sizing for the memory subsystem.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Capacity of the shared main pool, reserved once at manager creation.
    pub backing_buffer_size: usize,
    /// Capacity of each per-connection session arena.
    pub session_arena_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backing_buffer_size: 1000 * 1024 * 1024,
            session_arena_size: 256 * 1024,
        }
    }
}

/// Process-wide memory root: owns the shared main pool and manufactures
/// per-session arenas.
///
/// Session arenas are fresh heap regions, never carved out of the main pool,
/// so connection churn cannot fragment it and session teardown is a single
/// bulk release regardless of allocation count.
pub struct MemoryManager {
    config: MemoryConfig,
    shared: SharedArena,
}

impl MemoryManager {
    pub fn new(config: MemoryConfig) -> Self {
        let shared = SharedArena::with_capacity(config.backing_buffer_size);
        Self { config, shared }
    }

    /// A manager with the default sizing (1000 MiB main pool, 256 KiB
    /// session arenas).
    pub fn with_defaults() -> Self {
        Self::new(MemoryConfig::default())
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// The thread-safe main pool, for long-lived embedder data.
    pub fn shared(&self) -> &SharedArena {
        &self.shared
    }

    /// Manufacture a fresh arena for one session, at the configured size.
    ///
    /// The returned arena is exclusively owned by its session: its worker
    /// thread is the only allocator, and dropping the arena releases the
    /// pool bookkeeping, the bump region, and the heap block in one step.
    pub fn create_session_arena(&self) -> SessionArena {
        SessionArena::new(self.config.session_arena_size)
    }

    /// Manufacture a session arena with an explicit capacity.
    pub fn create_session_arena_with_capacity(&self, capacity: usize) -> SessionArena {
        SessionArena::new(capacity)
    }

    /// Manufacture a synchronized arena for callers that need to share one
    /// region across threads. Sessions use the unsynchronized
    /// [`SessionArena`]; this is the thread-safe flavor of the same factory.
    pub fn create_shared_arena(&self, capacity: usize) -> SharedArena {
        SharedArena::with_capacity(capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sizing() {
        let config = MemoryConfig::default();
        assert_eq!(config.backing_buffer_size, 1000 * 1024 * 1024);
        assert_eq!(config.session_arena_size, 256 * 1024);
    }

    #[test]
    fn session_arenas_are_disjoint() {
        let manager = MemoryManager::new(MemoryConfig {
            backing_buffer_size: 1024 * 1024,
            session_arena_size: 4096,
        });

        let a = manager.create_session_arena();
        let b = manager.create_session_arena();

        let pa = a.alloc_bytes(b"left").unwrap();
        let pb = b.alloc_bytes(b"right").unwrap();

        let (sa, sb) = (pa.as_ptr() as usize, pb.as_ptr() as usize);
        assert_ne!(sa, sb);
        // Regions must not overlap even partially.
        assert!(sa + pa.len() <= sb || sb + pb.len() <= sa);
    }

    #[test]
    fn explicit_capacity_overrides_config() {
        let manager = MemoryManager::new(MemoryConfig {
            backing_buffer_size: 1024 * 1024,
            session_arena_size: 4096,
        });
        let arena = manager.create_session_arena_with_capacity(1024);
        assert_eq!(arena.capacity(), 1024);
    }
}
