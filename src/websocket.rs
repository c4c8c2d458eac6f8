// Copyright (c) 2019 heya developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! The websocket facility: upgrade negotiation, the process-wide room
//! registry and room broadcasts.
//!
//! [`WebSocket::upgrade`] consumes the TCP connection out of the request;
//! from that point on the HTTP dispatcher no longer writes to it and the
//! returned [`Client`] is the only way to talk to the peer.

use bytes::BytesMut;
use log::{debug, trace};
use std::{
    collections::HashMap,
    fmt,
    io::Write,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::base::OpCode;
use crate::client::{self, Client};
use crate::handshake;
use crate::request::Request;
use crate::room::Room;

// Config /////////////////////////////////////////////////////////////////////////////////////////

/// Websocket session configuration.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Per-read buffer size of upgraded sessions. A message longer than
    /// this is truncated at read time.
    pub msg_max_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config { msg_max_size: 1024 }
    }
}

// WebSocket //////////////////////////////////////////////////////////////////////////////////////

/// Upgrade entry point and room registry.
///
/// The registry is safe for concurrent use by any number of connection
/// workers.
#[derive(Debug)]
pub struct WebSocket {
    config: Config,
    rooms: RwLock<HashMap<String, Room>>,
}

impl Default for WebSocket {
    fn default() -> Self {
        WebSocket::new(Config::default())
    }
}

impl WebSocket {
    /// Create a new websocket facility with the given session config.
    pub fn new(config: Config) -> Self {
        WebSocket { config, rooms: RwLock::new(HashMap::new()) }
    }

    /// Perform the server side of the RFC 6455 opening handshake.
    ///
    /// Requires the request to carry a non-empty `Sec-WebSocket-Key`
    /// header. On success the connection is consumed out of `req` and a
    /// new [`Client`] session owns it.
    pub fn upgrade(&self, req: &mut Request) -> Result<Client, Error> {
        let key = match req.header("Sec-WebSocket-Key") {
            Some(k) if !k.is_empty() => k.to_string(),
            _ => return Err(Error::MissingKey),
        };
        let stream = req.take_stream().ok_or(Error::AlreadyUpgraded)?;

        let mut buf = BytesMut::new();
        handshake::encode_accept(&key, &mut buf);
        if let Err(e) = (&stream).write_all(&buf) {
            return Err(Error::Client(client::Error::Io(e)))
        }

        let client = Client::new(stream, self.config.msg_max_size);
        debug!("{} {}: upgraded to websocket session {}", req.method(), req.path(), client.id());
        Ok(client)
    }

    /// Create a room. Fails with [`Error::RoomExists`] if the name is taken.
    pub fn create_room(&self, name: &str) -> Result<Room, Error> {
        let mut rooms = wlock(&self.rooms);
        if rooms.contains_key(name) {
            return Err(Error::RoomExists(name.to_string()))
        }
        let room = Room::new(name);
        rooms.insert(name.to_string(), room.clone());
        trace!("room {} created", name);
        Ok(room)
    }

    /// Look a room up by name.
    pub fn get_room(&self, name: &str) -> Option<Room> {
        rlock(&self.rooms).get(name).cloned()
    }

    /// Remove a room, returning it if it existed.
    pub fn remove_room(&self, name: &str) -> Option<Room> {
        let room = wlock(&self.rooms).remove(name);
        if room.is_some() {
            trace!("room {} removed", name)
        }
        room
    }

    /// Names of all live rooms, in no particular order.
    pub fn room_list(&self) -> Vec<String> {
        rlock(&self.rooms).keys().cloned().collect()
    }

    /// Broadcast a TEXT message to every member of the room.
    ///
    /// See [`WebSocket::broadcast_with_opcode`] for the failure semantics.
    pub fn broadcast(&self, room: &str, msg: &str, ignore_error: bool) -> Result<(), Error> {
        self.broadcast_with_opcode(room, msg.as_bytes(), OpCode::Text, ignore_error)
    }

    /// Broadcast a BINARY message to every member of the room.
    pub fn broadcast_bytes(&self, room: &str, msg: &[u8], ignore_error: bool) -> Result<(), Error> {
        self.broadcast_with_opcode(room, msg, OpCode::Binary, ignore_error)
    }

    /// Broadcast a message with a caller-chosen opcode to every member of
    /// the room.
    ///
    /// Members are traversed over a snapshot of the member list; a member
    /// whose send fails is evicted from the room before anything else
    /// happens. With `ignore_error` every member is attempted and send
    /// errors are swallowed; without it the first send error returns to the
    /// caller (after the eviction) and the remaining members are skipped.
    pub fn broadcast_with_opcode(
        &self,
        room: &str,
        msg: &[u8],
        opcode: OpCode,
        ignore_error: bool,
    ) -> Result<(), Error> {
        let room = self.get_room(room).ok_or_else(|| Error::RoomNotFound(room.to_string()))?;
        for client in room.clients() {
            if let Err(e) = client.send_with_opcode(msg, opcode) {
                debug!("evicting client {} from room {}: {}", client.id(), room.name(), e);
                room.remove_client(client.id());
                if !ignore_error {
                    return Err(Error::Client(e))
                }
            }
        }
        Ok(())
    }
}

fn rlock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn wlock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// Websocket error type ///////////////////////////////////////////////////////////////////////////

/// Errors of the upgrade and room facility.
#[derive(Debug)]
pub enum Error {
    /// The upgrade request lacks a `Sec-WebSocket-Key` header.
    MissingKey,
    /// The request's connection was already consumed by a prior upgrade.
    AlreadyUpgraded,
    /// A room with this name already exists.
    RoomExists(String),
    /// No room with this name exists.
    RoomNotFound(String),
    /// A session operation failed.
    Client(client::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingKey => f.write_str("missing Sec-WebSocket-Key header"),
            Error::AlreadyUpgraded => f.write_str("connection already upgraded"),
            Error::RoomExists(n) => write!(f, "room {} already exists", n),
            Error::RoomNotFound(n) => write!(f, "room {} not found", n),
            Error::Client(e) => write!(f, "client error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Client(e) => Some(e),
            Error::MissingKey
            | Error::AlreadyUpgraded
            | Error::RoomExists(_)
            | Error::RoomNotFound(_) => None,
        }
    }
}

impl From<client::Error> for Error {
    fn from(e: client::Error) -> Self {
        Error::Client(e)
    }
}

// Tests //////////////////////////////////////////////////////////////////////////////////////////
