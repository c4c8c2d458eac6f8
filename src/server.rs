// Copyright (c) 2019 heya developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! The HTTP server: route registry, per-connection dispatch and the accept
//! loop.
//!
//! A connection is handled by exactly one worker thread and carries exactly
//! one request: read, parse, match, middleware, handler, response, close.
//! Failures of every stage funnel into a single error handler whose
//! response is serialized at most once per connection.

use log::{debug, error};
use smallvec::SmallVec;
use std::{
    any::Any,
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    thread,
};

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// How many bytes a single request read may yield by default.
const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// A request handler. Returning `Err` funnels into the error handler.
pub type Handler = Arc<dyn Fn(&mut Request) -> Result<Response, Error> + Send + Sync>;

/// A side-effect-only observer running before the handler. Middleware may
/// inspect the request and fill its context slot, but produces no response.
pub type Middleware = Arc<dyn Fn(&mut Request) + Send + Sync>;

/// Converts any dispatch- or handler-level failure into a response.
pub type ErrHandler = Arc<dyn Fn(&Request, &Error) -> Response + Send + Sync>;

// Options ////////////////////////////////////////////////////////////////////////////////////////

/// Server construction options.
pub struct Options {
    /// Replacement for the default error handler.
    pub err_handler: Option<ErrHandler>,
    /// Middleware applied to every route, in order, before any per-route
    /// middleware.
    pub middleware: Vec<Middleware>,
    /// Size of the single read a request is parsed from; larger requests
    /// are truncated.
    pub read_buffer_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            err_handler: None,
            middleware: Vec::new(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

// Route //////////////////////////////////////////////////////////////////////////////////////////

/// One registry entry: an exact path, an optional method and the handler
/// chain behind them.
#[derive(Clone)]
struct Route {
    method: String,
    path: String,
    handler: Handler,
    middleware: SmallVec<[Middleware; 4]>,
}

// Parse a registration pattern: an optional method token followed by the
// exact path, e.g. `"GET /hello"` or just `"/hello"`.
fn parse_pattern(pattern: &str) -> (String, String) {
    match pattern.split_once(' ') {
        Some((method, path)) => (method.to_uppercase(), path.to_string()),
        None => (String::new(), pattern.to_string()),
    }
}

// Server /////////////////////////////////////////////////////////////////////////////////////////

/// A listening HTTP endpoint. One instance per socket.
///
/// Registration happens before [`Server::listen_and_serve`]; the registry
/// is cloned into the accept loop at that point and later mutation does not
/// affect a running listener.
pub struct Server {
    address: String,
    routes: Vec<Route>,
    middleware: Vec<Middleware>,
    err_handler: ErrHandler,
    read_buffer_size: usize,
    closed: AtomicBool,
    bound: Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Create a server that will bind the given address.
    pub fn new(address: &str, options: Options) -> Self {
        Server {
            address: address.to_string(),
            routes: Vec::new(),
            middleware: options.middleware,
            err_handler: options.err_handler.unwrap_or_else(|| Arc::new(default_err_handler)),
            read_buffer_size: options.read_buffer_size,
            closed: AtomicBool::new(false),
            bound: Mutex::new(None),
        }
    }

    /// Register a handler for a pattern (`"GET /path"`, or `"/path"` to
    /// match any method). Registering the same (method, path) twice fails
    /// with [`Error::DuplicateRoute`].
    pub fn handle<F>(&mut self, pattern: &str, handler: F) -> Result<(), Error>
    where
        F: Fn(&mut Request) -> Result<Response, Error> + Send + Sync + 'static,
    {
        self.register(pattern, Arc::new(handler), SmallVec::new())
    }

    /// Like [`Server::handle`], with per-route middleware that runs after
    /// the global chain and before the handler.
    pub fn handle_with<F>(
        &mut self,
        pattern: &str,
        handler: F,
        middleware: Vec<Middleware>,
    ) -> Result<(), Error>
    where
        F: Fn(&mut Request) -> Result<Response, Error> + Send + Sync + 'static,
    {
        self.register(pattern, Arc::new(handler), SmallVec::from_vec(middleware))
    }

    fn register(
        &mut self,
        pattern: &str,
        handler: Handler,
        middleware: SmallVec<[Middleware; 4]>,
    ) -> Result<(), Error> {
        let (method, path) = parse_pattern(pattern);
        if self.routes.iter().any(|r| r.method == method && r.path == path) {
            return Err(Error::DuplicateRoute(pattern.to_string()))
        }
        self.routes.push(Route { method, path, handler, middleware });
        Ok(())
    }

    /// Append a middleware to the global chain.
    pub fn use_middleware<F>(&mut self, middleware: F)
    where
        F: Fn(&mut Request) + Send + Sync + 'static,
    {
        self.middleware.push(Arc::new(middleware))
    }

    /// Replace the error handler.
    pub fn set_err_handler<F>(&mut self, handler: F)
    where
        F: Fn(&Request, &Error) -> Response + Send + Sync + 'static,
    {
        self.err_handler = Arc::new(handler)
    }

    /// The bound address, available once [`Server::listen_and_serve`] has
    /// bound the socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.bound)
    }

    /// Bind the address and run the accept loop until [`Server::close`].
    ///
    /// Fails with [`Error::Listen`] if the bind fails and with
    /// [`Error::NoHandlers`] if nothing has been registered. Each accepted
    /// connection is handed to its own worker thread; an accept failure
    /// invokes the error handler with an empty request shell (there is no
    /// usable transport, so its response is dropped).
    pub fn listen_and_serve(&self) -> Result<(), Error> {
        let listener = TcpListener::bind(self.address.as_str()).map_err(Error::Listen)?;
        if let Ok(addr) = listener.local_addr() {
            *lock(&self.bound) = Some(addr)
        }
        if self.routes.is_empty() {
            return Err(Error::NoHandlers)
        }

        let shared = Arc::new(Shared {
            routes: self.routes.clone(),
            middleware: self.middleware.clone(),
            err_handler: self.err_handler.clone(),
            read_buffer_size: self.read_buffer_size,
        });

        debug!("listening on {}", self.address);
        for conn in listener.incoming() {
            if self.closed.load(Ordering::SeqCst) {
                debug!("listener closed, leaving the accept loop");
                break
            }
            match conn {
                Ok(stream) => {
                    let shared = shared.clone();
                    thread::spawn(move || handle_connection(&shared, stream));
                }
                Err(e) => {
                    error!("accept failed: {}", e);
                    let shell = Request::shell();
                    let _ = (shared.err_handler)(&shell, &Error::Accept(e));
                }
            }
        }
        Ok(())
    }

    /// Stop accepting connections. In-flight handlers are not preempted.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(addr) = *lock(&self.bound) {
            // Wake the accept loop so it observes the flag.
            let _ = TcpStream::connect(addr);
        }
    }
}

// Shared, read-only view of the server handed to connection workers.
struct Shared {
    routes: Vec<Route>,
    middleware: Vec<Middleware>,
    err_handler: ErrHandler,
    read_buffer_size: usize,
}

// Dispatch ///////////////////////////////////////////////////////////////////////////////////////

// Handle one accepted connection: exactly one request, one response, close.
fn handle_connection(shared: &Shared, stream: TcpStream) {
    let mut buf = vec![0_u8; shared.read_buffer_size];
    let parsed = (&stream)
        .read(&mut buf)
        .map_err(Error::Io)
        .and_then(|n| Request::parse(&buf[.. n]));

    let mut request = match parsed {
        Ok(request) => request,
        Err(e) => {
            debug!("failed to read request: {}", e);
            let shell = Request::shell();
            let mut response = (shared.err_handler)(&shell, &e);
            return write_response(&mut response, &stream)
        }
    };
    request.set_stream(stream);

    let mut path_matched = false;
    let mut route = None;
    for r in &shared.routes {
        if r.path == request.path() {
            path_matched = true;
            if r.method.is_empty() || r.method == request.method() {
                route = Some(r);
                break
            }
        }
    }

    let outcome = match route {
        Some(route) => {
            let caught = panic::catch_unwind(AssertUnwindSafe(|| {
                for mw in &shared.middleware {
                    mw(&mut request)
                }
                for mw in &route.middleware {
                    mw(&mut request)
                }
                (route.handler)(&mut request)
            }));
            match caught {
                Ok(result) => result,
                Err(panic) => Err(Error::Panic(panic_message(panic))),
            }
        }
        None if path_matched => Err(Error::method_not_allowed(request.method(), request.path())),
        None => Err(Error::not_found(request.path())),
    };

    let mut response = match outcome {
        Ok(response) => response,
        Err(e) => (shared.err_handler)(&request, &e),
    };

    // If the handler consumed the connection (websocket upgrade), the HTTP
    // layer must not write to it again.
    if let Some(stream) = request.take_stream() {
        write_response(&mut response, &stream)
    }
}

fn write_response(response: &mut Response, mut stream: &TcpStream) {
    let bytes = response.to_bytes();
    if let Err(e) = stream.write_all(&bytes) {
        debug!("failed to write response: {}", e)
    }
}

// Render a captured panic payload.
fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

// The built-in error handler: log, map HTTP errors to their code,
// everything else to 500.
fn default_err_handler(req: &Request, err: &Error) -> Response {
    error!("error while handling request {} {}: {}", req.method(), req.path(), err);
    let mut response = Response::new();
    response.add_header("Content-Type", "text/plain");
    match err {
        Error::Http { code, reason } => {
            response.set_code(*code);
            response.set_body(reason.as_str());
        }
        _ => {
            response.set_code(500);
            response.set_body("Internal Server Error");
        }
    }
    response
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// Tests //////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::{default_err_handler, parse_pattern, Options, Server};
    use crate::error::Error;
    use crate::request::Request;
    use crate::response::Response;
    use assert_matches::assert_matches;

    fn ok_handler(_req: &mut Request) -> Result<Response, Error> {
        Ok(Response::text("ok"))
    }

    #[test]
    fn pattern_with_method() {
        assert_eq!(parse_pattern("GET /hello"), ("GET".to_string(), "/hello".to_string()));
        assert_eq!(parse_pattern("post /x"), ("POST".to_string(), "/x".to_string()));
        assert_eq!(parse_pattern("/any"), (String::new(), "/any".to_string()))
    }

    #[test]
    fn duplicate_route_is_rejected() {
        let mut server = Server::new("127.0.0.1:0", Options::default());
        server.handle("GET /x", ok_handler).unwrap();
        assert_matches!(server.handle("GET /x", ok_handler), Err(Error::DuplicateRoute(_)))
    }

    #[test]
    fn same_path_different_method_is_fine() {
        let mut server = Server::new("127.0.0.1:0", Options::default());
        server.handle("GET /x", ok_handler).unwrap();
        server.handle("POST /x", ok_handler).unwrap()
    }

    #[test]
    fn serve_without_handlers_fails() {
        let server = Server::new("127.0.0.1:0", Options::default());
        assert_matches!(server.listen_and_serve(), Err(Error::NoHandlers))
    }

    #[test]
    fn bind_failure_is_a_listen_error() {
        let server = Server::new("256.0.0.1:0", Options::default());
        assert_matches!(server.listen_and_serve(), Err(Error::Listen(_)))
    }

    #[test]
    fn default_err_handler_maps_http_codes() {
        let shell = Request::shell();
        let err = Error::not_found("/missing");
        let mut resp = default_err_handler(&shell, &err);
        assert_eq!(resp.code(), 404);
        let text = String::from_utf8(resp.to_bytes().to_vec()).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 \r\n"))
    }

    #[test]
    fn default_err_handler_falls_back_to_500() {
        let shell = Request::shell();
        let mut resp = default_err_handler(&shell, &Error::Panic("boom".to_string()));
        assert_eq!(resp.code(), 500);
        assert_eq!(resp.body(), b"Internal Server Error")
    }
}
