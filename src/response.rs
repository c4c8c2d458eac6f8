// Copyright (c) 2019 heya developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! The HTTP response builder and its serialization.

use bytes::BytesMut;
use std::collections::HashMap;

// Response ///////////////////////////////////////////////////////////////////////////////////////

/// A mutable response under construction.
///
/// At serialization time `Content-Length` is recomputed from the body,
/// `Content-Type` defaults to `text/plain` and a zero status code becomes
/// 200.
#[derive(Debug, Clone, Default)]
pub struct Response {
    code: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl Response {
    /// An empty response (status defaults to 200 at serialization).
    pub fn new() -> Self {
        Response::default()
    }

    /// A `text/plain` response over the given body.
    pub fn text(body: impl Into<String>) -> Self {
        let mut r = Response::new();
        r.add_header("Content-Type", "text/plain");
        r.set_body(body.into());
        r
    }

    /// A `text/html` response over the given body.
    pub fn html(body: impl Into<String>) -> Self {
        let mut r = Response::new();
        r.add_header("Content-Type", "text/html");
        r.set_body(body.into());
        r
    }

    /// An `application/json` response over the given body.
    pub fn json(body: impl Into<String>) -> Self {
        let mut r = Response::new();
        r.add_header("Content-Type", "application/json");
        r.set_body(body.into());
        r
    }

    /// The status code (0 until set).
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Set the status code.
    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.code = code;
        self
    }

    /// Set a header. Setting the same name again overwrites the value.
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Look a header up by its exact name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }

    /// The response body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replace the response body.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Attach a cookie: writes a `Set-Cookie` header of the form
    /// `name=value; Path=path; Max-Age=max_age`.
    pub fn set_cookie(&mut self, name: &str, value: &str, path: &str, max_age: i64) -> &mut Self {
        let cookie = format!("{}={}; Path={}; Max-Age={}", name, value, path, max_age);
        self.add_header("Set-Cookie", &cookie)
    }

    /// Serialize into wire bytes, applying the defaults described on the
    /// type. Header order is unspecified.
    pub fn to_bytes(&mut self) -> BytesMut {
        if !self.headers.contains_key("Content-Type") {
            self.add_header("Content-Type", "text/plain");
        }
        let length = self.body.len().to_string();
        self.add_header("Content-Length", &length);
        if self.code == 0 {
            self.code = 200
        }

        let mut buf = BytesMut::with_capacity(64 + self.body.len());
        buf.extend_from_slice(b"HTTP/1.1 ");
        buf.extend_from_slice(self.code.to_string().as_bytes());
        buf.extend_from_slice(b" \r\n");
        for (name, value) in &self.headers {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
        buf
    }
}

// Tests //////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::Response;

    fn text_of(resp: &mut Response) -> String {
        String::from_utf8(resp.to_bytes().to_vec()).unwrap()
    }

    #[test]
    fn serialize_defaults() {
        let text = text_of(&mut Response::new());
        assert!(text.starts_with("HTTP/1.1 200 \r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"))
    }

    #[test]
    fn content_length_tracks_body() {
        let mut resp = Response::text("hi");
        let text = text_of(&mut resp);
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("\r\n\r\nhi"));

        // Re-serializing after a body change recomputes the length.
        resp.set_body("longer body");
        assert!(text_of(&mut resp).contains("Content-Length: 11\r\n"))
    }

    #[test]
    fn explicit_content_type_is_kept() {
        let mut resp = Response::new();
        resp.add_header("Content-Type", "application/octet-stream");
        resp.set_body(vec![1, 2, 3]);
        let text = text_of(&mut resp);
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
        assert!(!text.contains("text/plain"))
    }

    #[test]
    fn constructors_set_content_type() {
        assert_eq!(Response::html("<p>hi</p>").header("Content-Type"), Some("text/html"));
        assert_eq!(Response::json("{}").header("Content-Type"), Some("application/json"))
    }

    #[test]
    fn explicit_code_is_kept() {
        let mut resp = Response::text("gone");
        resp.set_code(410);
        assert!(text_of(&mut resp).starts_with("HTTP/1.1 410 \r\n"))
    }

    #[test]
    fn cookie_header_format() {
        let mut resp = Response::new();
        resp.set_cookie("session", "abc123", "/", 3600);
        assert_eq!(resp.header("Set-Cookie"), Some("session=abc123; Path=/; Max-Age=3600"))
    }
}
