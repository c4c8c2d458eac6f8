// Copyright (c) 2019 heya developers
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Static file serving: thin registration helpers over the handler
//! registry plus extension-based content-type guessing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::response::Response;
use crate::server::Server;

impl Server {
    /// Register a handler that serves the file at `path` for `pattern`.
    ///
    /// The file is read per request; a file that has gone missing yields a
    /// 404 through the error handler.
    pub fn serve_file(&mut self, pattern: &str, path: impl Into<PathBuf>) -> Result<(), Error> {
        let path = path.into();
        let content_type = content_type(&path);
        self.handle(pattern, move |_req| {
            let body = fs::read(&path).map_err(|e| file_error(&path, e))?;
            let mut response = Response::new();
            response.add_header("Content-Type", content_type);
            response.set_body(body);
            Ok(response)
        })
    }

    /// Register one exact route per file under `dir`, rooted at `prefix`.
    ///
    /// Routing is exact-match only, so the directory is walked once at
    /// registration time; files created later are not picked up.
    pub fn serve_dir(&mut self, prefix: &str, dir: impl Into<PathBuf>) -> Result<(), Error> {
        let dir = dir.into();
        let mut files = Vec::new();
        walk(&dir, &mut files)?;
        for path in files {
            let rel = path.strip_prefix(&dir).unwrap_or(&path).to_string_lossy();
            let pattern = format!("GET {}/{}", prefix.trim_end_matches('/'), rel);
            self.serve_file(&pattern, path.clone())?;
        }
        Ok(())
    }
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, files)?
        } else {
            files.push(path)
        }
    }
    Ok(())
}

fn file_error(path: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::Http { code: 404, reason: format!("no such file: {}", path.display()) }
    } else {
        Error::Io(e)
    }
}

// Guess a content type from the file extension.
fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

// Tests //////////////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::content_type;
    use crate::server::{Options, Server};
    use std::fs;
    use std::path::{Path, PathBuf};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("heya-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("css")).unwrap();
        fs::write(dir.join("index.html"), "<h1>hi</h1>").unwrap();
        fs::write(dir.join("css/site.css"), "body {}").unwrap();
        dir
    }

    #[test]
    fn content_type_guessing() {
        assert_eq!(content_type(Path::new("a/index.html")), "text/html");
        assert_eq!(content_type(Path::new("site.css")), "text/css");
        assert_eq!(content_type(Path::new("data.bin")), "application/octet-stream");
        assert_eq!(content_type(Path::new("noext")), "application/octet-stream")
    }

    #[test]
    fn serve_dir_registers_each_file() {
        let dir = scratch_dir("serve-dir");
        let mut server = Server::new("127.0.0.1:0", Options::default());
        server.serve_dir("/static", dir.clone()).unwrap();

        // Registering again collides with the existing exact routes.
        assert!(server.serve_dir("/static", dir.clone()).is_err());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn serve_missing_dir_fails() {
        let mut server = Server::new("127.0.0.1:0", Options::default());
        assert!(server.serve_dir("/static", "/definitely/not/here").is_err())
    }
}
