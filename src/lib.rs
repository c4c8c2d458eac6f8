// Copyright (c) 2019 heya developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! A small HTTP/1.1 serving library with an integrated [RFC 6455][rfc6455]
//! websocket upgrade and room-based broadcast facility.
//!
//! The HTTP wire layer is implemented from scratch and deliberately
//! minimal: every accepted connection carries exactly one request, read
//! with a single fixed-size read, matched against exact (method, path)
//! routes and answered with one response. A handler may instead hand the
//! connection over to the websocket layer, whereupon it becomes a
//! [`Client`] session that can join named [`Room`]s and receive broadcasts.
//!
//! # Serving requests
//!
//! ```no_run
//! use heya::{Options, Response, Server};
//!
//! let mut server = Server::new("127.0.0.1:8080", Options::default());
//! server.handle("GET /hello", |_req| Ok(Response::text("hi"))).unwrap();
//! server.listen_and_serve().unwrap();
//! ```
//!
//! # Upgrading to websocket
//!
//! ```no_run
//! use heya::{Config, Options, Response, Server, WebSocket};
//! use std::sync::Arc;
//!
//! let ws = Arc::new(WebSocket::new(Config::default()));
//! let mut server = Server::new("127.0.0.1:8080", Options::default());
//!
//! let shared = ws.clone();
//! server.handle("GET /echo", move |req| {
//!     let client = shared.upgrade(req)?;
//!     loop {
//!         let msg = client.read()?;
//!         client.send_bytes(&msg)?;
//!     }
//! }).unwrap();
//! server.listen_and_serve().unwrap();
//! ```
//!
//! [rfc6455]: https://tools.ietf.org/html/rfc6455

pub mod base;
pub mod client;
pub mod error;
mod files;
pub mod handshake;
pub mod request;
pub mod response;
pub mod room;
pub mod server;
pub mod websocket;

pub use base::{Frame, OpCode};
pub use client::Client;
pub use error::Error;
pub use request::Request;
pub use response::Response;
pub use room::Room;
pub use server::{ErrHandler, Handler, Middleware, Options, Server};
pub use websocket::{Config, WebSocket};
