//! Route registration and matching.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::memory::SessionArena;
use crate::protocol::{Request, Response};

/// A route handler.
///
/// Handlers run on the session's worker thread and allocate through the
/// session arena they are handed — the response they build lives exactly as
/// long as the request that produced it.
pub type HandlerFn =
    dyn for<'a> Fn(&Request<'a>, &'a SessionArena) -> Response<'a> + Send + Sync;

/// A registered route: exact path, allowed methods, handler.
pub struct Route {
    path: String,
    methods: Vec<String>,
    handler: Arc<HandlerFn>,
}

impl Route {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Allowed method tokens. Empty means any method matches.
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Method comparison is case-sensitive; registrations use uppercase
    /// tokens.
    fn allows(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m == method)
    }

    pub(crate) fn invoke<'a>(&self, request: &Request<'a>, arena: &'a SessionArena) -> Response<'a> {
        (self.handler)(request, arena)
    }
}

/// Result of matching `(path, method)` against the table.
pub enum RouteMatch {
    /// A route matched both path and method.
    Hit(Arc<Route>),
    /// The path exists but no route at it allows this method. Carries the
    /// allowed methods for the `Allow` header.
    MethodNotAllowed(Vec<String>),
    /// No route has this path.
    Miss,
}

/// Registry of routes, matched by exact path equality in registration order.
///
/// Lookup is a linear scan, so the first registration of a `(path, method)`
/// pair wins. The table may be (unusually) extended while the server runs;
/// new routes take effect for subsequent requests.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: Arc<RwLock<Vec<Arc<Route>>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. An empty `methods` slice registers a wildcard that
    /// accepts any method.
    pub fn register<F>(&self, path: &str, methods: &[&str], handler: F)
    where
        F: for<'a> Fn(&Request<'a>, &'a SessionArena) -> Response<'a> + Send + Sync + 'static,
    {
        let route = Arc::new(Route {
            path: path.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            handler: Arc::new(handler),
        });
        let mut routes = self.routes.write();
        routes.push(route);
        tracing::info!(path, ?methods, total_routes = routes.len(), "route registered");
    }

    /// Match a request path and method.
    ///
    /// The query string, if any, is part of `path` — no splitting is done
    /// here; handlers interpret it.
    pub fn match_route(&self, path: &str, method: &str) -> RouteMatch {
        let routes = self.routes.read();

        let mut path_seen = false;
        let mut allowed: Vec<String> = Vec::new();
        for route in routes.iter() {
            if route.path != path {
                continue;
            }
            if route.allows(method) {
                return RouteMatch::Hit(Arc::clone(route));
            }
            path_seen = true;
            for m in &route.methods {
                if !allowed.iter().any(|a| a == m) {
                    allowed.push(m.clone());
                }
            }
        }

        if path_seen {
            RouteMatch::MethodNotAllowed(allowed)
        } else {
            RouteMatch::Miss
        }
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}
