#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct Route {
    pub path: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl Route {
    pub fn ok(path: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.to_string(),
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(path: &str, status: u16) -> Self {
        Self {
            path: path.to_string(),
            status,
            body: b"not here".to_vec(),
        }
    }
}

/// Serves exactly `expected_requests` connections, then stops.
pub struct TestServer {
    addr: SocketAddr,
    join: JoinHandle<Vec<String>>,
}

impl TestServer {
    pub fn start(routes: Vec<Route>, expected_requests: usize) -> Self {
        Self::start_with(expected_requests, |_| routes)
    }

    /// Like `start`, but routes are built from the server's base URL so a
    /// response body can point back at the same server.
    pub fn start_with(
        expected_requests: usize,
        routes: impl FnOnce(&str) -> Vec<Route>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind server");
        let addr = listener.local_addr().expect("server addr");
        let routes = routes(&format!("http://127.0.0.1:{}", addr.port()));
        let join = thread::spawn(move || {
            let mut seen = Vec::new();
            for _ in 0..expected_requests {
                let (mut stream, _) = listener.accept().expect("accept");
                let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
                let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
                let path = read_request_path(&mut stream);
                match routes.iter().find(|route| route.path == path) {
                    Some(route) => write_response(&mut stream, route.status, &route.body),
                    None => write_response(&mut stream, 404, b"not found"),
                }
                seen.push(path);
            }
            seen
        });
        Self { addr, join }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.addr.port())
    }

    /// Wait for all expected requests and return the paths that were hit.
    pub fn finish(self) -> Vec<String> {
        self.join.join().expect("server thread should finish")
    }
}

/// A URL on a port nothing listens on.
pub fn unreachable_url(path: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral port should bind");
    let port = listener.local_addr().expect("listener should have an address").port();
    drop(listener);
    format!("http://127.0.0.1:{port}{path}")
}

fn read_request_path(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut scratch = [0u8; 4096];
    loop {
        match stream.read(&mut scratch) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&scratch[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }

    let text = String::from_utf8_lossy(&buf);
    text.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string()
}

fn write_response(stream: &mut TcpStream, status: u16, body: &[u8]) {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}

pub fn manifest_json(current: &str, download_url: &str) -> String {
    serde_json::json!({
        "current_version": current,
        "tool_name": "FDMA2530-Modeling",
        "description": "Maya shelf tools",
        "releases": [
            {
                "version": current,
                "download_url": download_url,
                "description": "Checklist fixes"
            },
            {
                "version": "2.0.1",
                "download_url": "https://example.com/2.0.1.zip",
                "description": "Initial shelf"
            }
        ]
    })
    .to_string()
}

/// Build a ZIP archive in memory. `None` contents add a directory entry.
pub fn zip_bytes(entries: &[(&str, Option<&str>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
    for (name, contents) in entries {
        match contents {
            Some(text) => {
                writer.start_file(*name, options).expect("start file");
                writer.write_all(text.as_bytes()).expect("write file");
            }
            None => writer.add_directory(*name, options).expect("add directory"),
        }
    }
    writer.finish().expect("finish zip").into_inner()
}

pub fn dir_entry_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
