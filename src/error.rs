// Copyright (c) 2019 heya developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! The server-side error taxonomy.
//!
//! Everything the dispatch layer can hand an error handler, plus the
//! listener-level failures [`crate::server::Server::listen_and_serve`]
//! returns. Session-level errors live in [`crate::client`] and
//! [`crate::websocket`] and nest into [`Error::WebSocket`].

use std::{fmt, io};

use crate::{client, websocket};

/// Errors of the HTTP serving layer.
#[derive(Debug)]
pub enum Error {
    /// An I/O error has been encountered.
    Io(io::Error),
    /// Binding the listening socket failed; fatal for `listen_and_serve`.
    Listen(io::Error),
    /// Accepting a connection failed; the accept loop keeps running.
    Accept(io::Error),
    /// `listen_and_serve` was called with an empty handler registry.
    NoHandlers,
    /// A route for this (method, path) pair is already registered.
    DuplicateRoute(String),
    /// The request bytes did not parse.
    Malformed(&'static str),
    /// A semantic HTTP failure tied to a status code (404, 405, ...).
    Http {
        /// The status code the error maps to.
        code: u16,
        /// Human-readable reason, used as the default response body.
        reason: String,
    },
    /// A panic escaped a user handler and was captured by the dispatcher.
    Panic(String),
    /// A websocket error surfaced through a handler.
    WebSocket(websocket::Error),
}

impl Error {
    /// A 404 for the given path.
    pub fn not_found(path: &str) -> Self {
        Error::Http { code: 404, reason: format!("no handler found for {}", path) }
    }

    /// A 405 for the given method and path.
    pub fn method_not_allowed(method: &str, path: &str) -> Self {
        Error::Http { code: 405, reason: format!("method {} not allowed for {}", method, path) }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {}", e),
            Error::Listen(e) => write!(f, "listen error: {}", e),
            Error::Accept(e) => write!(f, "accept error: {}", e),
            Error::NoHandlers => f.write_str("no handlers registered"),
            Error::DuplicateRoute(r) => write!(f, "duplicate route: {}", r),
            Error::Malformed(m) => write!(f, "malformed request: {}", m),
            Error::Http { code, reason } => write!(f, "http {}: {}", code, reason),
            Error::Panic(m) => write!(f, "handler panicked: {}", m),
            Error::WebSocket(e) => write!(f, "websocket error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) | Error::Listen(e) | Error::Accept(e) => Some(e),
            Error::WebSocket(e) => Some(e),
            Error::NoHandlers
            | Error::DuplicateRoute(_)
            | Error::Malformed(_)
            | Error::Http { .. }
            | Error::Panic(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<websocket::Error> for Error {
    fn from(e: websocket::Error) -> Self {
        Error::WebSocket(e)
    }
}

impl From<client::Error> for Error {
    fn from(e: client::Error) -> Self {
        Error::WebSocket(websocket::Error::Client(e))
    }
}
