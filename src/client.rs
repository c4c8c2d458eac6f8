// Copyright (c) 2019 heya developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! A websocket client session after a successful upgrade.
//!
//! The session owns the TCP connection the HTTP layer handed over; the
//! dispatcher never writes to it again. Reads are bounded by the owning
//! [`crate::websocket::Config::msg_max_size`]: a message larger than that is
//! truncated at read time.

use bytes::BytesMut;
use log::trace;
use std::{
    fmt, io,
    io::{Read, Write},
    net::{Shutdown, TcpStream},
    sync::atomic::{AtomicU64, Ordering},
};

use crate::base::{self, Frame, OpCode, CLOSE_NORMAL};

/// Source of the per-process session identifiers.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

// Client /////////////////////////////////////////////////////////////////////////////////////////

/// One upgraded connection, identified by a monotonically increasing id.
#[derive(Debug)]
pub struct Client {
    id: u64,
    stream: TcpStream,
    msg_max_size: usize,
}

impl Client {
    pub(crate) fn new(stream: TcpStream, msg_max_size: usize) -> Self {
        Client { id: NEXT_ID.fetch_add(1, Ordering::Relaxed), stream, msg_max_size }
    }

    /// The session identifier assigned at upgrade time.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Send a TEXT frame over this session.
    pub fn send(&self, msg: &str) -> Result<(), Error> {
        self.send_with_opcode(msg.as_bytes(), OpCode::Text)
    }

    /// Send a BINARY frame over this session.
    ///
    /// The payload is not assumed to be UTF-8 and deliberately goes out
    /// with the BINARY opcode (0x2); use [`Client::send_with_opcode`] to
    /// push raw bytes under TEXT.
    pub fn send_bytes(&self, msg: &[u8]) -> Result<(), Error> {
        self.send_with_opcode(msg, OpCode::Binary)
    }

    /// Send a frame with a caller-chosen opcode.
    ///
    /// Server-to-client frames are never masked.
    pub fn send_with_opcode(&self, msg: &[u8], opcode: OpCode) -> Result<(), Error> {
        let mut frame = Frame::new(opcode);
        frame.set_payload(msg);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        trace!("client {}: sending {} frame, {} payload bytes", self.id, opcode, msg.len());
        (&self.stream).write_all(&buf)?;
        Ok(())
    }

    /// Read one message from the session.
    ///
    /// Performs a single read of at most `msg_max_size` bytes and decodes
    /// one frame from it. A CLOSE frame is reported as [`Error::Closed`];
    /// any other opcode yields the unmasked payload.
    pub fn read(&self) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0; self.msg_max_size];
        let n = (&self.stream).read(&mut buf)?;
        if n == 0 {
            return Err(Error::Io(io::ErrorKind::UnexpectedEof.into()))
        }
        let frame = Frame::decode(&buf[.. n])?;
        trace!("client {}: received {} frame", self.id, frame.opcode());
        if frame.opcode() == OpCode::Close {
            return Err(Error::Closed)
        }
        Ok(frame.into_payload().to_vec())
    }

    /// Close the session: send a CLOSE frame with status 1000, then shut the
    /// transport down.
    pub fn close(&self) -> Result<(), Error> {
        trace!("client {}: closing", self.id);
        let sent = self.send_with_opcode(&CLOSE_NORMAL.to_be_bytes(), OpCode::Close);
        let down = self.stream.shutdown(Shutdown::Both);
        sent?;
        down?;
        Ok(())
    }
}

// Session error type /////////////////////////////////////////////////////////////////////////////

/// Errors of an upgraded session.
#[derive(Debug)]
pub enum Error {
    /// An I/O error has been encountered.
    Io(io::Error),
    /// The frame codec failed.
    Codec(base::Error),
    /// The peer sent a CLOSE frame; the session is terminated.
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {}", e),
            Error::Codec(e) => write!(f, "codec error: {}", e),
            Error::Closed => f.write_str("session closed by peer"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Codec(e) => Some(e),
            Error::Closed => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<base::Error> for Error {
    fn from(e: base::Error) -> Self {
        Error::Codec(e)
    }
}

// Tests //////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::{Client, Error};
    use crate::base::Frame;
    use assert_matches::assert_matches;
    use bytes::BytesMut;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    // A connected (server, peer) socket pair.
    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, peer)
    }

    #[test]
    fn ids_are_monotonic() {
        let (a, _pa) = pair();
        let (b, _pb) = pair();
        let first = Client::new(a, 1024);
        let second = Client::new(b, 1024);
        assert!(second.id() > first.id())
    }

    #[test]
    fn send_writes_unmasked_text_frame() {
        let (server, mut peer) = pair();
        let client = Client::new(server, 1024);
        client.send("pong").unwrap();

        let mut buf = [0; 16];
        let n = peer.read(&mut buf).unwrap();
        assert_eq!(&buf[.. n], &[0x81, 0x04, b'p', b'o', b'n', b'g'])
    }

    #[test]
    fn read_returns_unmasked_payload() {
        let (server, mut peer) = pair();
        let client = Client::new(server, 1024);

        let mut frame = Frame::text("ping");
        frame.set_mask(0x0102_0304);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        peer.write_all(&buf).unwrap();

        assert_eq!(client.read().unwrap(), b"ping")
    }

    #[test]
    fn read_signals_close() {
        let (server, mut peer) = pair();
        let client = Client::new(server, 1024);

        let mut frame = Frame::close(1000);
        frame.set_mask(0x0102_0304);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        peer.write_all(&buf).unwrap();

        assert_matches!(client.read(), Err(Error::Closed))
    }

    #[test]
    fn close_sends_close_frame() {
        let (server, mut peer) = pair();
        let client = Client::new(server, 1024);
        client.close().unwrap();

        let mut buf = [0; 8];
        let n = peer.read(&mut buf).unwrap();
        assert_eq!(&buf[.. n], &[0x88, 0x02, 0x03, 0xE8]);
        assert_matches!(client.send("nope"), Err(Error::Io(_)))
    }
}
