//! Server orchestration: listen socket, acceptor, reaper, registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::memory::{MemoryManager, SessionArena};
use crate::protocol::{Request, Response};
use crate::routes::RouteTable;
use crate::session::{Session, SessionContext};
use crate::socket::{DEFAULT_SOCKET_TIMEOUT, Socket, TcpSocket};

/// Pause after a failed or empty accept, so transient failures never spin.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Granularity of the reaper's interruptible sleep.
const REAPER_TICK: Duration = Duration::from_millis(50);

/// Server tuning knobs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen backlog.
    pub listen_backlog: u32,
    /// Bytes requested per `receive` call.
    pub receive_chunk_size: usize,
    /// Read/write timeout applied to every accepted connection.
    pub socket_timeout: Duration,
    /// How often inactive sessions are reaped.
    pub reaper_interval: Duration,
    /// Advertised `Keep-Alive` timeout.
    pub keep_alive_timeout_secs: u64,
    /// Requests served per connection before the server closes it.
    pub keep_alive_max_requests: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_backlog: 100,
            receive_chunk_size: 16 * 1024,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            reaper_interval: Duration::from_secs(10),
            keep_alive_timeout_secs: 60,
            keep_alive_max_requests: 100,
        }
    }
}

/// Embeddable HTTP/1.1 server.
///
/// Owns the listen socket (until `start` hands it to the acceptor), the
/// route table, and the session registry. One acceptor thread, one reaper
/// thread, one worker thread per live connection; every connection gets a
/// dedicated [`SessionArena`] from the injected [`MemoryManager`].
///
/// A server is single-use: `start` then `stop`, in that order, at most once
/// each. `stop` is idempotent and also runs on drop.
///
/// ```no_run
/// use std::sync::Arc;
/// use hearth::{MemoryManager, Response, Server};
///
/// let memory = Arc::new(MemoryManager::with_defaults());
/// let mut server = Server::new(memory);
/// server.register_handler("/", &["GET"], |_req, arena| {
///     Response::text(arena, 200, "Hello, World!")
/// });
/// server.start("127.0.0.1", 8080).unwrap();
/// // ... run until the embedder decides to shut down ...
/// server.stop();
/// ```
pub struct Server {
    memory: Arc<MemoryManager>,
    config: Arc<ServerConfig>,
    routes: RouteTable,
    running: Arc<AtomicBool>,
    socket: Option<Box<dyn Socket>>,
    registry: Arc<Mutex<Vec<Session>>>,
    acceptor: Option<JoinHandle<()>>,
    reaper: Option<JoinHandle<()>>,
}

impl Server {
    /// A server over the default TCP socket implementation.
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        Self::with_socket(memory, Box::new(TcpSocket::new()), ServerConfig::default())
    }

    pub fn with_config(memory: Arc<MemoryManager>, config: ServerConfig) -> Self {
        Self::with_socket(memory, Box::new(TcpSocket::new()), config)
    }

    /// A server over an injected socket implementation.
    pub fn with_socket(
        memory: Arc<MemoryManager>,
        socket: Box<dyn Socket>,
        config: ServerConfig,
    ) -> Self {
        Self {
            memory,
            config: Arc::new(config),
            routes: RouteTable::new(),
            running: Arc::new(AtomicBool::new(false)),
            socket: Some(socket),
            registry: Arc::new(Mutex::new(Vec::new())),
            acceptor: None,
            reaper: None,
        }
    }

    /// Register a handler for `path`, restricted to `methods` (uppercase
    /// tokens; empty slice accepts any method).
    ///
    /// Normally called before `start`; registering later is safe and takes
    /// effect for subsequent requests.
    pub fn register_handler<F>(&self, path: &str, methods: &[&str], handler: F)
    where
        F: for<'a> Fn(&Request<'a>, &'a SessionArena) -> Response<'a> + Send + Sync + 'static,
    {
        self.routes.register(path, methods, handler);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Sessions currently in the registry (the reaper trims this between
    /// sweeps, so it may briefly include finished sessions).
    pub fn session_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Bind and start serving.
    ///
    /// Sequence: init → bind → listen → spawn reaper → spawn acceptor. Any
    /// socket failure is returned as-is and no threads are started.
    pub fn start(&mut self, address: &str, port: u16) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        let Some(mut socket) = self.socket.take() else {
            // The listen socket was consumed by a previous start/stop cycle.
            return Err(Error::AlreadyRunning);
        };

        let setup = socket
            .init()
            .and_then(|()| socket.bind(address, port))
            .and_then(|()| socket.listen(self.config.listen_backlog));
        if let Err(e) = setup {
            socket.close();
            self.socket = Some(socket);
            return Err(e.into());
        }

        self.running.store(true, Ordering::Release);

        let ctx = Arc::new(SessionContext {
            routes: self.routes.clone(),
            running: Arc::clone(&self.running),
            config: Arc::clone(&self.config),
        });

        let registry = Arc::clone(&self.registry);
        let running = Arc::clone(&self.running);
        let interval = self.config.reaper_interval;
        self.reaper = Some(thread::spawn(move || {
            reaper_loop(&registry, &running, interval);
        }));

        let registry = Arc::clone(&self.registry);
        let memory = Arc::clone(&self.memory);
        self.acceptor = Some(thread::spawn(move || {
            acceptor_loop(socket, &memory, &ctx, &registry);
        }));

        tracing::info!(address, port, "server listening");
        Ok(())
    }

    /// Shut down: stop accepting, join the reaper and acceptor, then join
    /// every worker and release every session arena. Idempotent; returns
    /// only when all threads have joined.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::info!("server stopping");

        if let Some(reaper) = self.reaper.take() {
            let _ = reaper.join();
        }
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }

        // Drain outside the lock: joining workers can wait on socket
        // timeouts and must not hold up the registry.
        let drained = std::mem::take(&mut *self.registry.lock());
        let count = drained.len();
        drop(drained);

        tracing::info!(sessions_closed = count, "server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn acceptor_loop(
    mut socket: Box<dyn Socket>,
    memory: &MemoryManager,
    ctx: &Arc<SessionContext>,
    registry: &Mutex<Vec<Session>>,
) {
    while ctx.running.load(Ordering::Acquire) {
        match socket.accept() {
            Ok(mut client) => {
                if let Err(e) = client.set_timeout(ctx.config.socket_timeout) {
                    tracing::warn!(error = %e, "dropping client: cannot apply timeout");
                    client.close();
                    continue;
                }
                let arena = memory.create_session_arena();
                let session = Session::spawn(client, arena, Arc::clone(ctx));
                let mut sessions = registry.lock();
                sessions.push(session);
                tracing::debug!(total_sessions = sessions.len(), "client connected");
            }
            Err(e) if e.is_would_block() => {
                thread::sleep(ACCEPT_RETRY_DELAY);
            }
            Err(e) => {
                if ctx.running.load(Ordering::Acquire) {
                    tracing::warn!(error = %e, "accept error");
                    thread::sleep(ACCEPT_RETRY_DELAY);
                }
            }
        }
    }
    socket.close();
    tracing::debug!("acceptor exited");
}

fn reaper_loop(registry: &Mutex<Vec<Session>>, running: &AtomicBool, interval: Duration) {
    while running.load(Ordering::Acquire) {
        let mut slept = Duration::ZERO;
        while slept < interval && running.load(Ordering::Acquire) {
            thread::sleep(REAPER_TICK);
            slept += REAPER_TICK;
        }
        if !running.load(Ordering::Acquire) {
            break;
        }
        sweep(registry);
    }
    tracing::debug!("reaper exited");
}

/// Remove every inactive session, joining its worker as part of destruction.
fn sweep(registry: &Mutex<Vec<Session>>) {
    let mut sessions = registry.lock();
    let before = sessions.len();
    sessions.retain(|session| session.shared.is_active());
    let reaped = before - sessions.len();
    if reaped > 0 {
        tracing::debug!(reaped, remaining = sessions.len(), "sessions reaped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SocketError;
    use crate::memory::MemoryConfig;

    /// Listener that never has a connection pending, and can be told to
    /// fail at a chosen setup step.
    struct StubListener {
        fail_on: Option<&'static str>,
    }

    impl StubListener {
        fn ok() -> Box<dyn Socket> {
            Box::new(Self { fail_on: None })
        }

        fn failing(step: &'static str) -> Box<dyn Socket> {
            Box::new(Self {
                fail_on: Some(step),
            })
        }

        fn check(&self, step: &'static str, err: fn(std::io::Error) -> SocketError) -> std::result::Result<(), SocketError> {
            if self.fail_on == Some(step) {
                Err(err(std::io::Error::other(step)))
            } else {
                Ok(())
            }
        }
    }

    impl Socket for StubListener {
        fn init(&mut self) -> std::result::Result<(), SocketError> {
            self.check("init", SocketError::Initialization)
        }
        fn bind(&mut self, _: &str, _: u16) -> std::result::Result<(), SocketError> {
            self.check("bind", SocketError::Bind)
        }
        fn listen(&mut self, _: u32) -> std::result::Result<(), SocketError> {
            self.check("listen", SocketError::Connection)
        }
        fn accept(&mut self) -> std::result::Result<Box<dyn Socket>, SocketError> {
            Err(SocketError::Connection(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "nothing pending",
            )))
        }
        fn connect(&mut self, _: &str, _: u16) -> std::result::Result<(), SocketError> {
            Ok(())
        }
        fn send(&mut self, _: &[u8]) -> std::result::Result<(), SocketError> {
            Ok(())
        }
        fn receive(&mut self, _: &mut [u8]) -> std::result::Result<usize, SocketError> {
            Ok(0)
        }
        fn set_timeout(&mut self, _: Duration) -> std::result::Result<(), SocketError> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    fn small_memory() -> Arc<MemoryManager> {
        Arc::new(MemoryManager::new(MemoryConfig {
            backing_buffer_size: 1024 * 1024,
            session_arena_size: 64 * 1024,
        }))
    }

    #[test]
    fn start_and_stop_with_stub_listener() {
        let mut server = Server::with_socket(small_memory(), StubListener::ok(), ServerConfig::default());
        assert!(!server.is_running());
        server.start("127.0.0.1", 0).unwrap();
        assert!(server.is_running());
        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut server = Server::with_socket(small_memory(), StubListener::ok(), ServerConfig::default());
        server.stop();
        server.start("127.0.0.1", 0).unwrap();
        server.stop();
        server.stop();
        assert!(!server.is_running());
    }

    #[test]
    fn bind_failure_surfaces_and_no_threads_start() {
        let mut server = Server::with_socket(
            small_memory(),
            StubListener::failing("bind"),
            ServerConfig::default(),
        );
        match server.start("127.0.0.1", 0) {
            Err(Error::Socket(SocketError::Bind(_))) => {}
            other => panic!("expected Bind error, got {other:?}"),
        }
        assert!(!server.is_running());
        assert!(server.acceptor.is_none());
        assert!(server.reaper.is_none());
        // The socket is returned for another attempt.
        assert!(server.socket.is_some());
    }

    #[test]
    fn init_and_listen_failures_keep_their_kind() {
        for (step, matcher) in [
            ("init", true),
            ("listen", false),
        ] {
            let mut server = Server::with_socket(
                small_memory(),
                StubListener::failing(step),
                ServerConfig::default(),
            );
            let err = server.start("127.0.0.1", 0).unwrap_err();
            match (matcher, err) {
                (true, Error::Socket(SocketError::Initialization(_))) => {}
                (false, Error::Socket(SocketError::Connection(_))) => {}
                (_, other) => panic!("unexpected error for {step}: {other:?}"),
            }
        }
    }

    #[test]
    fn double_start_is_rejected() {
        let mut server = Server::with_socket(small_memory(), StubListener::ok(), ServerConfig::default());
        server.start("127.0.0.1", 0).unwrap();
        assert!(matches!(
            server.start("127.0.0.1", 0),
            Err(Error::AlreadyRunning)
        ));
        server.stop();
    }

    #[test]
    fn registering_after_start_is_tolerated() {
        let mut server = Server::with_socket(small_memory(), StubListener::ok(), ServerConfig::default());
        server.start("127.0.0.1", 0).unwrap();
        server.register_handler("/late", &["GET"], |_, arena| {
            Response::text(arena, 200, "late")
        });
        server.stop();
    }
}
