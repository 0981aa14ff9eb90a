//! Static site HTTP server for the form harness.
//!
//! Uses only `std::net` — no external HTTP framework dependencies. Serves a
//! provisioned workspace directory on loopback: the entry document, arbitrary
//! sibling files, the `styles/` and `scripts/` asset subtrees (with explicit
//! 404 bodies when an asset is absent), and the form submission endpoint.
//!
//! The accept loop runs on a named background thread so the test scope that
//! started the server keeps executing; each accepted connection is handled on
//! its own thread so concurrent browser sessions do not serialize. Shuts down
//! gracefully on drop.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::form;

/// 404 body returned for missing files under `styles/`.
pub const CSS_NOT_FOUND: &str = "CSS file not found\n";

/// 404 body returned for missing files under `scripts/`.
pub const JS_NOT_FOUND: &str = "JavaScript file not found\n";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn server thread: {0}")]
    Spawn(#[source] io::Error),
}

// ---------------------------------------------------------------------------
// SiteServer (constructed, not yet listening)
// ---------------------------------------------------------------------------

/// A configured but not-yet-started site server.
///
/// Immutable after construction; [`SiteServer::start`] consumes it and
/// produces the running instance.
#[derive(Debug, Clone)]
pub struct SiteServer {
    serve_dir: PathBuf,
    port: u16,
    submit_route: String,
}

impl SiteServer {
    /// Configure a server for `serve_dir` on loopback `port`, with form posts
    /// accepted at `submit_route`.
    pub fn new(serve_dir: impl Into<PathBuf>, port: u16, submit_route: impl Into<String>) -> Self {
        Self {
            serve_dir: serve_dir.into(),
            port,
            submit_route: submit_route.into(),
        }
    }

    /// Configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Directory this server will serve from.
    pub fn serve_dir(&self) -> &Path {
        &self.serve_dir
    }

    /// Bind the port and start the accept loop on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the port is already in use (not
    /// retried — the caller chose the port) and [`ServerError::Spawn`] if the
    /// thread cannot be created.
    pub fn start(self) -> Result<RunningServer, ServerError> {
        let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, self.port))
            .map_err(|source| ServerError::Bind {
                port: self.port,
                source,
            })?;

        // Non-blocking accept with short timeout for clean shutdown.
        listener
            .set_nonblocking(true)
            .map_err(|source| ServerError::Bind {
                port: self.port,
                source,
            })?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let serve_dir = self.serve_dir.clone();
        let submit_route = self.submit_route.clone();
        let port = self.port;

        let handle = thread::Builder::new()
            .name(format!("site-server-{port}"))
            .spawn(move || {
                serve_loop(listener, &serve_dir, &submit_route, &shutdown_clone);
            })
            .map_err(ServerError::Spawn)?;

        // Wait briefly for the accept loop to come up. Soft guarantee only;
        // callers that care poll `is_healthy`.
        thread::sleep(Duration::from_millis(10));

        tracing::info!(port, serve_dir = %self.serve_dir.display(), "site server started");

        Ok(RunningServer {
            port,
            shutdown,
            handle: Some(handle),
        })
    }
}

// ---------------------------------------------------------------------------
// RunningServer
// ---------------------------------------------------------------------------

/// A started site server. Shuts down gracefully on drop.
#[derive(Debug)]
pub struct RunningServer {
    port: u16,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RunningServer {
    /// Bound port number.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Build a full URL for the given path.
    ///
    /// Uses `localhost` to match the backend URL injected into the site
    /// config; the socket itself is bound on `127.0.0.1`.
    pub fn url(&self, path: &str) -> String {
        format!("http://localhost:{}{path}", self.port)
    }

    /// Check if the server is accepting connections.
    pub fn is_healthy(&self) -> bool {
        TcpStream::connect_timeout(
            &std::net::SocketAddr::from((Ipv4Addr::LOCALHOST, self.port)),
            Duration::from_secs(1),
        )
        .is_ok()
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Poke the listener to unblock accept.
        let _ = TcpStream::connect(format!("127.0.0.1:{}", self.port));
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        tracing::info!(port = self.port, "site server shut down");
    }
}

// ---------------------------------------------------------------------------
// Accept loop
// ---------------------------------------------------------------------------

fn serve_loop(listener: TcpListener, serve_dir: &Path, submit_route: &str, shutdown: &AtomicBool) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        match listener.accept() {
            Ok((stream, _addr)) => {
                let serve_dir = serve_dir.to_path_buf();
                let submit_route = submit_route.to_string();
                // One thread per connection so parallel browser sessions do
                // not block one another.
                let _ = thread::Builder::new()
                    .name("site-server-conn".to_string())
                    .spawn(move || {
                        handle_connection(stream, &serve_dir, &submit_route);
                    });
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(_) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                // Transient error — continue.
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Request handling
// ---------------------------------------------------------------------------

struct Request {
    method: String,
    path: String,
    content_type: Option<String>,
    body: Vec<u8>,
}

fn handle_connection(mut stream: TcpStream, serve_dir: &Path, submit_route: &str) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));

    let Some(request) = read_request(&mut stream) else {
        return;
    };

    tracing::debug!(method = %request.method, path = %request.path, "request");

    let (status, content_type, body) = route_request(&request, serve_dir, submit_route);

    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        body.len()
    );

    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

/// Read one HTTP request: header block, then `Content-Length` bytes of body.
fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];

    // Read until the end of the header block.
    let header_end = loop {
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => return None,
            Ok(n) => n,
        };
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = find_header_end(&raw) {
            break pos;
        }
        if raw.len() > 64 * 1024 {
            // Header block too large for a test fixture request.
            return None;
        }
    };

    let headers = String::from_utf8_lossy(&raw[..header_end]).into_owned();
    let mut lines = headers.lines();
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next().unwrap_or("/");
    // Strip query string.
    let path = path.split('?').next().unwrap_or("/").to_string();

    let mut content_type = None;
    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-type" => content_type = Some(value.trim().to_string()),
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                _ => {}
            }
        }
    }

    let body_start = header_end + 4;
    let mut body: Vec<u8> = raw.get(body_start..).unwrap_or_default().to_vec();
    while body.len() < content_length {
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    Some(Request {
        method,
        path,
        content_type,
        body,
    })
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

fn route_request(
    request: &Request,
    serve_dir: &Path,
    submit_route: &str,
) -> (&'static str, &'static str, Vec<u8>) {
    if request.method == "POST" && request.path == submit_route {
        return handle_submission(request);
    }

    // Prevent directory traversal before any path is joined onto the serving
    // directory; the asset subtrees are as reachable as the fallback.
    if request.path.contains("..") {
        return ("403 Forbidden", "text/plain", b"Forbidden".to_vec());
    }

    // Everything except the submission route is read-only.
    if request.method != "GET" {
        return (
            "405 Method Not Allowed",
            "text/plain",
            b"Method Not Allowed".to_vec(),
        );
    }

    match request.path.as_str() {
        "/" => serve_file(serve_dir, "index.html"),
        path if path.starts_with("/styles/") => {
            serve_asset(serve_dir, path.trim_start_matches('/'), CSS_NOT_FOUND)
        }
        path if path.starts_with("/scripts/") => {
            serve_asset(serve_dir, path.trim_start_matches('/'), JS_NOT_FOUND)
        }
        path => serve_file(serve_dir, path.trim_start_matches('/')),
    }
}

fn handle_submission(request: &Request) -> (&'static str, &'static str, Vec<u8>) {
    let pairs = form::decode_body(request.content_type.as_deref(), &request.body);
    tracing::debug!(fields = pairs.len(), "form data received");

    let processed = form::merge_fields(pairs);
    tracing::debug!(?processed, "processed form data");

    let html = form::render_response(&processed);
    ("200 OK", "text/html; charset=utf-8", html.into_bytes())
}

/// Serve a file relative to the serving directory with the framework-default
/// 404 body when absent.
fn serve_file(serve_dir: &Path, rel_path: &str) -> (&'static str, &'static str, Vec<u8>) {
    match std::fs::read(serve_dir.join(rel_path)) {
        Ok(content) => ("200 OK", guess_content_type(rel_path), content),
        Err(_) => (
            "404 Not Found",
            "text/plain",
            format!("Not Found: /{rel_path}").into_bytes(),
        ),
    }
}

/// Serve an asset-subtree file, or the subtree's designed 404 body.
fn serve_asset(
    serve_dir: &Path,
    rel_path: &str,
    not_found_body: &'static str,
) -> (&'static str, &'static str, Vec<u8>) {
    let file_path = serve_dir.join(rel_path);
    if file_path.exists() {
        serve_file(serve_dir, rel_path)
    } else {
        ("404 Not Found", "text/plain", not_found_body.as_bytes().to_vec())
    }
}

fn guess_content_type(path: &str) -> &'static str {
    if path.ends_with(".html") {
        "text/html; charset=utf-8"
    } else if path.ends_with(".js") {
        "application/javascript"
    } else if path.ends_with(".css") {
        "text/css"
    } else if path.ends_with(".json") {
        "application/json"
    } else if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".svg") {
        "image/svg+xml"
    } else {
        "application/octet-stream"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Reserve a free loopback port by binding port 0 and releasing it.
    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .expect("bind port 0")
            .local_addr()
            .expect("local addr")
            .port()
    }

    fn start_sample_server() -> (tempfile::TempDir, RunningServer) {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("index.html"), "<html><body>Index</body></html>").unwrap();
        fs::write(dir.path().join("config.json"), "{\"form_backend_url\": null}").unwrap();
        fs::create_dir(dir.path().join("styles")).unwrap();
        fs::write(dir.path().join("styles/main.css"), "body { margin: 0; }").unwrap();
        fs::create_dir(dir.path().join("scripts")).unwrap();
        fs::write(dir.path().join("scripts/form.js"), "// form wiring").unwrap();

        let server = SiteServer::new(dir.path(), free_port(), "/submit")
            .start()
            .expect("server should start");
        (dir, server)
    }

    fn send_request(port: u16, raw: &str) -> String {
        let mut stream = TcpStream::connect(format!("127.0.0.1:{port}")).expect("connect");
        stream.write_all(raw.as_bytes()).expect("write");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response);
        response
    }

    fn get(port: u16, path: &str) -> String {
        send_request(
            port,
            &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n"),
        )
    }

    fn post_form(port: u16, path: &str, body: &str) -> String {
        send_request(
            port,
            &format!(
                "POST {path} HTTP/1.1\r\nHost: localhost\r\n\
                 Content-Type: application/x-www-form-urlencoded\r\n\
                 Content-Length: {}\r\n\r\n{body}",
                body.len()
            ),
        )
    }

    fn body_of(response: &str) -> &str {
        response
            .split_once("\r\n\r\n")
            .map(|(_, body)| body)
            .unwrap_or("")
    }

    #[test]
    fn serves_index_at_root() {
        let (_dir, server) = start_sample_server();
        let response = get(server.port(), "/");
        assert!(response.contains("200 OK"));
        assert_eq!(body_of(&response), "<html><body>Index</body></html>");
    }

    #[test]
    fn serves_top_level_files() {
        let (_dir, server) = start_sample_server();
        let response = get(server.port(), "/config.json");
        assert!(response.contains("200 OK"));
        assert!(response.contains("application/json"));
        assert!(response.contains("form_backend_url"));
    }

    #[test]
    fn serves_existing_style_and_script_assets() {
        let (_dir, server) = start_sample_server();

        let css = get(server.port(), "/styles/main.css");
        assert!(css.contains("200 OK"));
        assert!(css.contains("text/css"));
        assert!(css.contains("margin: 0"));

        let js = get(server.port(), "/scripts/form.js");
        assert!(js.contains("200 OK"));
        assert!(js.contains("application/javascript"));
    }

    #[test]
    fn missing_css_gets_designed_404_body() {
        let (_dir, server) = start_sample_server();
        let response = get(server.port(), "/styles/missing.css");
        assert!(response.contains("404 Not Found"));
        assert_eq!(body_of(&response), CSS_NOT_FOUND);
    }

    #[test]
    fn missing_js_gets_designed_404_body() {
        let (_dir, server) = start_sample_server();
        let response = get(server.port(), "/scripts/missing.js");
        assert!(response.contains("404 Not Found"));
        assert_eq!(body_of(&response), JS_NOT_FOUND);
    }

    #[test]
    fn missing_top_level_file_gets_default_404() {
        let (_dir, server) = start_sample_server();
        let response = get(server.port(), "/nope.txt");
        assert!(response.contains("404 Not Found"));
        assert!(body_of(&response).starts_with("Not Found:"));
    }

    #[test]
    fn blocks_directory_traversal() {
        let (_dir, server) = start_sample_server();
        let response = get(server.port(), "/../../etc/passwd");
        assert!(response.contains("403"), "should block traversal");
    }

    #[test]
    fn blocks_traversal_inside_asset_subtrees() {
        // A file outside the serving directory must stay unreachable through
        // the styles/ and scripts/ routes.
        let outer = tempfile::tempdir().expect("tempdir");
        fs::write(outer.path().join("secret.txt"), "outside the workspace").unwrap();
        let serve_dir = outer.path().join("site");
        fs::create_dir(&serve_dir).unwrap();
        fs::create_dir(serve_dir.join("styles")).unwrap();
        fs::create_dir(serve_dir.join("scripts")).unwrap();

        let server = SiteServer::new(&serve_dir, free_port(), "/submit")
            .start()
            .expect("server should start");

        for path in ["/styles/../secret.txt", "/scripts/../../secret.txt"] {
            let response = get(server.port(), path);
            assert!(response.contains("403"), "{path} should be blocked");
            assert!(
                !response.contains("outside the workspace"),
                "{path} must not leak file contents"
            );
        }
    }

    #[test]
    fn post_to_static_path_is_method_not_allowed() {
        let (_dir, server) = start_sample_server();
        let response = post_form(server.port(), "/index.html", "name=x");
        assert!(response.contains("405 Method Not Allowed"), "got: {response}");

        let styles = post_form(server.port(), "/styles/main.css", "name=x");
        assert!(styles.contains("405 Method Not Allowed"), "got: {styles}");
    }

    #[test]
    fn submission_echoes_merged_fields() {
        let (_dir, server) = start_sample_server();
        let response = post_form(server.port(), "/submit", "name=x&name=y&name=z");
        assert!(response.contains("200 OK"));
        assert!(response.contains("text/html"));
        assert!(body_of(&response).contains("<dd>x, y, z</dd>"));
    }

    #[test]
    fn empty_submission_is_still_200() {
        let (_dir, server) = start_sample_server();
        let response = post_form(server.port(), "/submit", "");
        assert!(response.contains("200 OK"));
        assert!(body_of(&response).contains("form-data"));
    }

    #[test]
    fn bind_conflict_propagates() {
        let (dir, server) = start_sample_server();
        let err = SiteServer::new(dir.path(), server.port(), "/submit")
            .start()
            .expect_err("second bind on the same port should fail");
        assert!(matches!(err, ServerError::Bind { .. }), "got: {err}");
    }

    #[test]
    fn shuts_down_on_drop() {
        let (_dir, server) = start_sample_server();
        let port = server.port();
        assert!(server.is_healthy());
        drop(server);
        // The accept thread has been joined; nothing is listening anymore
        // (the bound port itself may take time to release).
        let refused = TcpStream::connect_timeout(
            &std::net::SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            Duration::from_millis(500),
        )
        .is_err();
        assert!(refused, "no listener should remain after drop");
    }

    #[test]
    fn running_server_is_debuggable() {
        // `expect_err` and friends need Debug on the success type.
        let (_dir, server) = start_sample_server();
        let repr = format!("{server:?}");
        assert!(repr.contains("RunningServer"), "got: {repr}");
    }

    #[test]
    fn url_uses_localhost_and_port() {
        let (_dir, server) = start_sample_server();
        let url = server.url("/config.json");
        assert_eq!(
            url,
            format!("http://localhost:{}/config.json", server.port())
        );
    }
}
