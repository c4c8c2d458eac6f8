// Copyright (c) 2019 heya developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! The parsed HTTP/1.1 request.
//!
//! A request is read off a freshly accepted connection with a single
//! fixed-size read and parsed as UTF-8 (lossily); it lives for one dispatch
//! and is gone with the connection. Everything except the middleware
//! context slot is immutable once parsed.

use std::collections::HashMap;
use std::net::TcpStream;

use crate::error::Error;

// Request ////////////////////////////////////////////////////////////////////////////////////////

/// One parsed request plus the connection it arrived on.
#[derive(Debug)]
pub struct Request {
    method: String,
    path: String,
    version: String,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    args: HashMap<String, String>,
    body: String,
    context: HashMap<String, String>,
    stream: Option<TcpStream>,
}

impl Request {
    /// Parse a request from the bytes of a single read.
    ///
    /// The buffer is split on `\r\n`. The first line must hold at least
    /// three whitespace-separated tokens (method, target, version); header
    /// lines are split on the first `": "`; the line immediately after the
    /// first empty line is the body.
    pub(crate) fn parse(buf: &[u8]) -> Result<Request, Error> {
        let text = String::from_utf8_lossy(buf);
        let mut lines = text.split("\r\n");

        let mut tokens = lines.next().unwrap_or("").split_whitespace();
        let method = tokens.next().ok_or(Error::Malformed("missing request method"))?;
        let target = tokens.next().ok_or(Error::Malformed("missing request target"))?;
        let version = tokens.next().ok_or(Error::Malformed("missing http version"))?;

        let mut headers = HashMap::new();
        let mut body = String::new();
        while let Some(line) = lines.next() {
            if line.is_empty() {
                body = lines.next().unwrap_or("").to_string();
                break
            }
            match line.split_once(": ") {
                Some((name, value)) => headers.insert(name.to_string(), value.to_string()),
                None => return Err(Error::Malformed("header line missing separator")),
            };
        }

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };

        let mut args = HashMap::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((key, value)) => args.insert(key.to_string(), value.to_string()),
                None => args.insert(pair.to_string(), String::new()),
            };
        }

        let mut cookies = HashMap::new();
        if let Some(cookie) = headers.get("Cookie").filter(|c| !c.is_empty()) {
            for entry in cookie.split("; ") {
                match entry.split_once('=') {
                    Some((name, value)) => cookies.insert(name.to_string(), value.to_string()),
                    None => cookies.insert(entry.to_string(), String::new()),
                };
            }
        }

        Ok(Request {
            method: method.to_uppercase(),
            path: path.to_string(),
            version: version.to_string(),
            headers,
            cookies,
            args,
            body,
            context: HashMap::new(),
            stream: None,
        })
    }

    /// An empty request shell, used when a connection fails before a
    /// request could be parsed.
    pub(crate) fn shell() -> Request {
        Request {
            method: String::new(),
            path: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            cookies: HashMap::new(),
            args: HashMap::new(),
            body: String::new(),
            context: HashMap::new(),
            stream: None,
        }
    }

    pub(crate) fn set_stream(&mut self, stream: TcpStream) {
        self.stream = Some(stream)
    }

    /// Consume the underlying connection out of this request.
    ///
    /// Once taken (e.g. by [`crate::websocket::WebSocket::upgrade`]) the
    /// dispatcher will not serialize an HTTP response for this request.
    pub fn take_stream(&mut self) -> Option<TcpStream> {
        self.stream.take()
    }

    /// The request method, uppercased.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request path with the query part stripped.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The HTTP version string as received.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Look a header up by its exact name. Duplicates are last-write-wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }

    /// All headers.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Look a cookie up by name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|v| v.as_str())
    }

    /// All cookies.
    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// Look a query argument up by name. A bare key maps to `""`.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(|v| v.as_str())
    }

    /// All query arguments.
    pub fn args(&self) -> &HashMap<String, String> {
        &self.args
    }

    /// The request body: whatever followed the header block within the
    /// single read, best effort.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Read a context value set by middleware.
    pub fn context(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(|v| v.as_str())
    }

    /// Attach a context value for later pipeline stages. Middleware may use
    /// this to enrich a request before the handler runs.
    pub fn set_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }
}

// Tests //////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::Request;
    use crate::error::Error;
    use assert_matches::assert_matches;

    #[test]
    fn parse_request_line() {
        let req = Request::parse(b"get /abc HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.method(), "GET");
        assert_eq!(req.path(), "/abc");
        assert_eq!(req.version(), "HTTP/1.1")
    }

    #[test]
    fn parse_headers_and_body() {
        let raw = b"POST /submit HTTP/1.1\r\nHost: localhost\r\nX-Tag: a\r\nX-Tag: b\r\n\r\npayload";
        let req = Request::parse(raw).unwrap();
        assert_eq!(req.header("Host"), Some("localhost"));
        assert_eq!(req.header("X-Tag"), Some("b")); // last write wins
        let mut names: Vec<&str> = req.headers().keys().map(|n| n.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["Host", "X-Tag"]);
        assert_eq!(req.body(), "payload")
    }

    #[test]
    fn parse_query_args() {
        let req = Request::parse(b"GET /s?name=abc&empty HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.path(), "/s");
        assert_eq!(req.arg("name"), Some("abc"));
        assert_eq!(req.arg("empty"), Some(""));
        assert_eq!(req.args().len(), 2)
    }

    #[test]
    fn parse_cookies() {
        let req = Request::parse(b"GET / HTTP/1.1\r\nCookie: a=1; b=2\r\n\r\n").unwrap();
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("b"), Some("2"));
        assert_eq!(req.cookies().len(), 2)
    }

    #[test]
    fn no_cookie_header_means_no_cookies() {
        let req = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(req.cookies().is_empty())
    }

    #[test]
    fn short_request_line_is_malformed() {
        assert_matches!(Request::parse(b"GET /\r\n\r\n"), Err(Error::Malformed(_)));
        assert_matches!(Request::parse(b"\r\n\r\n"), Err(Error::Malformed(_)))
    }

    #[test]
    fn header_without_separator_is_malformed() {
        let raw = b"GET / HTTP/1.1\r\nBroken-Header\r\n\r\n";
        assert_matches!(Request::parse(raw), Err(Error::Malformed(_)));
        // A colon without the following space is just as malformed.
        let raw = b"GET / HTTP/1.1\r\nName:value\r\n\r\n";
        assert_matches!(Request::parse(raw), Err(Error::Malformed(_)))
    }

    #[test]
    fn context_slot() {
        let mut req = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.context("user"), None);
        req.set_context("user", "alice");
        assert_eq!(req.context("user"), Some("alice"))
    }
}
