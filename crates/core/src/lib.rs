//! # hearth — embeddable HTTP/1.1 server core with per-session arenas
//!
//! A threaded HTTP/1.1 server designed around one idea: every connection
//! gets a **dedicated memory arena**, so request-scoped allocations are
//! bounded, local, and reclaimed in a single step when the session ends.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Embedder (routes, run loop, shutdown)       │
//! ├──────────────────────────────────────────────┤
//! │  Server      — acceptor, reaper, registry    │
//! │  RouteTable  — (path, method) → handler      │
//! ├──────────────────────────────────────────────┤
//! │  Session     — worker thread per connection  │
//! │  Protocol    — request parse, response write │
//! ├──────────────────────────────────────────────┤
//! │  Memory      — MemoryManager, SessionArena   │
//! │  Socket      — trait + TCP implementation    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Threading model: one acceptor thread, one reaper thread, one worker
//! thread per live connection. Blocking I/O with per-socket timeouts; no
//! async runtime.
//!
//! Memory model: the [`MemoryManager`] owns a shared main pool sized once at
//! startup and manufactures a fresh fixed-size [`SessionArena`] per accepted
//! connection. Workers allocate request buffers, parsed requests, and
//! response bytes exclusively from their own arena; teardown is one bulk
//! release, and nothing a connection allocates can outlive or escape it.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use hearth::{MemoryManager, Response, Server};
//!
//! let memory = Arc::new(MemoryManager::with_defaults());
//! let mut server = Server::new(memory);
//!
//! server.register_handler("/", &["GET"], |_req, arena| {
//!     Response::text(arena, 200, "Hello, World!")
//! });
//!
//! server.start("127.0.0.1", 8080).expect("start server");
//! // ... the embedder's run loop decides when to stop ...
//! server.stop();
//! ```
//!
//! The core never installs signal handlers — the embedding program owns its
//! run loop and calls [`Server::stop`] when its own shutdown flag flips.
//!
//! ## Crate layout
//!
//! - [`server`] — [`Server`] orchestration and [`ServerConfig`].
//! - [`routes`] — [`RouteTable`], [`RouteMatch`], handler registration.
//! - `session` — per-connection worker lifecycle (internal).
//! - [`protocol`] — HTTP/1.1 [`Request`] parsing and [`Response`] writing.
//! - [`memory`] — [`MemoryManager`], [`SessionArena`], [`SharedArena`].
//! - [`socket`] — the [`Socket`](socket::Socket) contract and [`TcpSocket`].
//! - [`error`] — [`Error`], [`SocketError`], and the [`Result`] alias.

pub mod error;
pub mod memory;
pub mod protocol;
pub mod routes;
pub mod server;
mod session;
pub mod socket;

pub use error::{Error, ParseErrorKind, Result, SocketError};
pub use memory::{ArenaBuf, MemoryConfig, MemoryManager, SessionArena, SharedArena};
pub use protocol::{ParseStatus, Request, Response, reason_phrase};
pub use routes::{Route, RouteMatch, RouteTable};
pub use server::{Server, ServerConfig};
pub use socket::{Socket, TcpSocket};
