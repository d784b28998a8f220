//! Per-connection session: one socket, one arena, one worker thread.
//!
//! A session is created by the acceptor around a freshly accepted socket and
//! a fresh [`SessionArena`], serves requests on its own thread, and flips its
//! `active` flag off when the connection ends for any reason. The server's
//! reaper observes the flag, joins the worker, and destroys the session —
//! which releases the arena in one step, strictly after the worker's last
//! memory access (the join is the barrier).
//!
//! ## Lifecycle
//!
//! ```text
//!          start()
//!  Created ───────► Running ───► Inactive ───► Reaped
//!                     │  ▲
//!                     │  │ touch() on each successful receive
//!                     ▼  │
//!                (blocks in receive)
//!                     │
//!   peer close / timeout / fatal socket error / shutdown
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::Mutex;

use crate::error::Error;
use crate::memory::SessionArena;
use crate::protocol::{ParseStatus, Request, Response};
use crate::routes::{RouteMatch, RouteTable};
use crate::server::ServerConfig;
use crate::socket::Socket;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// State a session shares with the server side (acceptor/reaper).
pub(crate) struct SessionShared {
    pub id: u64,
    active: AtomicBool,
    last_activity: Mutex<Instant>,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            id: SESSION_COUNTER.fetch_add(1, Ordering::SeqCst),
            active: AtomicBool::new(true),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Idempotent: marking an inactive session inactive is a no-op.
    pub fn mark_inactive(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }
}

/// Everything a worker needs from the server that outlives it.
pub(crate) struct SessionContext {
    pub routes: RouteTable,
    pub running: Arc<AtomicBool>,
    pub config: Arc<ServerConfig>,
}

/// Registry entry owning one session's worker thread.
///
/// Dropping it marks the session inactive and joins the worker, so the
/// arena (owned by the worker) is provably released before the entry is
/// gone.
pub(crate) struct Session {
    pub shared: Arc<SessionShared>,
    worker: Option<JoinHandle<()>>,
}

impl Session {
    /// Build a session around an accepted socket and start its worker.
    pub fn spawn(
        socket: Box<dyn Socket>,
        arena: SessionArena,
        ctx: Arc<SessionContext>,
    ) -> Self {
        let shared = Arc::new(SessionShared::new());
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || {
            worker_main(socket, arena, worker_shared, ctx);
        });
        Session {
            shared,
            worker: Some(worker),
        }
    }

    pub fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(session_id = self.shared.id, "session worker panicked");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.mark_inactive();
        self.join();
    }
}

fn worker_main(
    mut socket: Box<dyn Socket>,
    mut arena: SessionArena,
    shared: Arc<SessionShared>,
    ctx: Arc<SessionContext>,
) {
    let started = Instant::now();
    tracing::debug!(session_id = shared.id, "session started");

    // Backstop: a panic escaping the request loop (e.g. an arena-backed
    // collection hitting the capacity limit) ends this session, not the
    // process, and teardown below still runs.
    let reason = catch_unwind(AssertUnwindSafe(|| {
        run_loop(socket.as_mut(), &mut arena, &shared, &ctx)
    }))
    .unwrap_or("worker panicked");

    shared.mark_inactive();
    socket.close();

    tracing::info!(
        session_id = shared.id,
        reason,
        lived_ms = started.elapsed().as_millis() as u64,
        idle_ms = shared.last_activity().elapsed().as_millis() as u64,
        "session ended"
    );
    // `arena` drops here: pool bookkeeping, bump region, heap block — the
    // whole session's memory released in one step.
}

enum Flow {
    KeepAlive,
    Close(&'static str),
}

fn run_loop(
    socket: &mut dyn Socket,
    arena: &mut SessionArena,
    shared: &SessionShared,
    ctx: &SessionContext,
) -> &'static str {
    let mut served: u32 = 0;
    while ctx.running.load(Ordering::Acquire) {
        // Everything the previous exchange allocated is dead; rewind the
        // region so the connection is bounded by one arena regardless of
        // how many requests it serves.
        arena.reset();
        match serve_one(socket, arena, shared, ctx, served) {
            Ok(Flow::KeepAlive) => served += 1,
            Ok(Flow::Close(reason)) => return reason,
            Err(e) => {
                tracing::warn!(session_id = shared.id, error = %e, "session aborted");
                return "session error";
            }
        }
    }
    "server shutting down"
}

/// Serve a single request/response exchange.
fn serve_one(
    socket: &mut dyn Socket,
    arena: &SessionArena,
    shared: &SessionShared,
    ctx: &SessionContext,
    served: u32,
) -> Result<Flow, Error> {
    let chunk = ctx.config.receive_chunk_size;
    let mut buf = arena.buf(chunk)?;

    let request = loop {
        buf.reserve(chunk)?;
        let spare = buf.spare_mut();
        let limit = chunk.min(spare.len());
        let n = match socket.receive(&mut spare[..limit]) {
            Ok(0) => {
                let reason = if buf.is_empty() {
                    "connection closed by client"
                } else {
                    "connection closed mid-request"
                };
                return Ok(Flow::Close(reason));
            }
            Ok(n) => n,
            Err(e) if e.is_timeout() => {
                return Ok(Flow::Close(if buf.is_empty() {
                    "idle timeout"
                } else {
                    "read timeout mid-request"
                }));
            }
            Err(e) => {
                tracing::debug!(session_id = shared.id, error = %e, "receive failed");
                return Ok(Flow::Close("receive error"));
            }
        };
        buf.advance(n);
        shared.touch();

        match Request::parse(buf.as_slice(), arena) {
            Ok(ParseStatus::Complete(request)) => break request,
            Ok(ParseStatus::Partial) => continue,
            Err(Error::Parse { kind }) => {
                tracing::warn!(session_id = shared.id, %kind, "bad request");
                let bad = Response::new(arena, 400).with_header("Connection", "close");
                if let Ok(wire) = bad.serialize(arena) {
                    let _ = socket.send(&wire);
                }
                return Ok(Flow::Close("parse error"));
            }
            Err(e) => return Err(e),
        }
    };

    tracing::debug!(
        session_id = shared.id,
        method = request.method,
        path = request.path,
        "request"
    );

    let response = match ctx.routes.match_route(request.path, request.method) {
        RouteMatch::Hit(route) => {
            match catch_unwind(AssertUnwindSafe(|| route.invoke(&request, arena))) {
                Ok(response) => response,
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    tracing::error!(
                        session_id = shared.id,
                        path = request.path,
                        msg,
                        "handler panicked"
                    );
                    let body =
                        bumpalo::format!(in arena.bump(), "Internal Server Error: {}", msg);
                    Response::text(arena, 500, body.into_bump_str())
                }
            }
        }
        RouteMatch::MethodNotAllowed(allowed) => {
            let allow = arena.alloc_str(&allowed.join(", "))?;
            Response::new(arena, 405).with_header("Allow", allow)
        }
        RouteMatch::Miss => Response::text(arena, 404, "Resource Not Found"),
    };

    let keep_alive = request.wants_keep_alive() && served + 1 < ctx.config.keep_alive_max_requests;
    let mut response =
        response.with_header("Connection", if keep_alive { "keep-alive" } else { "close" });
    if keep_alive {
        let policy = bumpalo::format!(
            in arena.bump(),
            "timeout={}, max={}",
            ctx.config.keep_alive_timeout_secs,
            ctx.config.keep_alive_max_requests
        );
        response = response.with_header("Keep-Alive", policy.into_bump_str());
    }

    let status = response.status;
    let wire = response.serialize(arena)?;
    if let Err(e) = socket.send(&wire) {
        tracing::debug!(session_id = shared.id, error = %e, "send failed");
        return Ok(Flow::Close("send error"));
    }

    tracing::debug!(session_id = shared.id, status, "response sent");

    if keep_alive {
        Ok(Flow::KeepAlive)
    } else {
        Ok(Flow::Close("connection: close"))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
