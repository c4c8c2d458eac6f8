// Copyright (c) 2019 heya developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Websocket [handshake] support: accept-key derivation and serialization of
//! the `101 Switching Protocols` response the server answers an upgrade
//! request with.
//!
//! [handshake]: https://tools.ietf.org/html/rfc6455#section-4

use bytes::BytesMut;
use sha1::Sha1;

// Defined in RFC6455 and used to generate the `Sec-WebSocket-Accept` header
// in the server handshake response.
const KEY: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Derive the `Sec-WebSocket-Accept` value for a client's
/// `Sec-WebSocket-Key`: the base64 encoding of `SHA1(key ++ GUID)`.
pub fn accept_key(key: &str) -> String {
    let mut digest = Sha1::new();
    digest.update(key.as_bytes());
    digest.update(KEY);
    base64::encode(&digest.digest().bytes())
}

/// Serialize the server's switching-protocols response for the given client
/// key into `buf`.
pub(crate) fn encode_accept(key: &str, buf: &mut BytesMut) {
    buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    buf.extend_from_slice(b"Upgrade: websocket\r\n");
    buf.extend_from_slice(b"Connection: Upgrade\r\n");
    buf.extend_from_slice(b"Sec-WebSocket-Accept: ");
    buf.extend_from_slice(accept_key(key).as_bytes());
    buf.extend_from_slice(b"\r\n\r\n");
}

// Tests //////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    // The canonical example from RFC 6455, section 1.3.
    const SAMPLE_NONCE: &str = "dGhlIHNhbXBsZSBub25jZQ==";
    const SAMPLE_ACCEPT: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

    #[test]
    fn rfc6455_sample_accept_key() {
        assert_eq!(super::accept_key(SAMPLE_NONCE), SAMPLE_ACCEPT)
    }

    #[test]
    fn switching_protocols_bytes() {
        let mut buf = BytesMut::new();
        super::encode_accept(SAMPLE_NONCE, &mut buf);
        let text = std::str::from_utf8(&buf).unwrap();
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains("Connection: Upgrade\r\n"));
        assert!(text.contains(&format!("Sec-WebSocket-Accept: {}\r\n", SAMPLE_ACCEPT)));
        assert!(text.ends_with("\r\n\r\n"))
    }
}
