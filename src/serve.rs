//! Development server with live reload support.
//!
//! Built on `tiny_http`:
//!
//! - Static file serving from the build output directory
//! - Automatic `index.html` resolution for directories
//! - `/ws` upgraded to a WebSocket (framed by `tungstenite`) that receives a
//!   message after every rebuild
//! - The error page of the last failed build in place of any page
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐          ┌──────────────────┐
//! │   Main Thread   │          │  Watcher Thread  │
//! │  (HTTP Server)  │          │  (owns Builder)  │
//! └────────┬────────┘          └────────┬─────────┘
//!          │                            │
//!          ▼                            ▼
//!    serve files,               reset + build, then
//!    accept sockets  ◄── DevServer ──  set/clear error,
//!                                      broadcast reload
//! ```

use crate::{
    build::{BuildError, Builder, inject::inject_live_reload},
    diagnostics::{Style, html_page},
    log,
    watch::watch_for_changes_blocking,
};
use anyhow::{Context, Result, anyhow};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::{
    fs,
    io::Cursor,
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
};
use tiny_http::{Header, ReadWrite, Request, Response, Server, StatusCode};
use tungstenite::{Message, WebSocket, handshake::derive_accept_key, protocol::Role};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

const RELOAD_PATH: &str = "/ws";

type Socket = WebSocket<Box<dyn ReadWrite + Send>>;

/// State shared by the request loop and the watch loop.
pub struct DevServer {
    output: PathBuf,
    live_reload: bool,
    /// Error page of the last failed build, served instead of any page.
    error: ArcSwapOption<String>,
    clients: Mutex<Vec<Socket>>,
}

impl DevServer {
    pub fn new(output: PathBuf, live_reload: bool) -> Self {
        Self {
            output,
            live_reload,
            error: ArcSwapOption::empty(),
            clients: Mutex::new(Vec::new()),
        }
    }

    /// Record the outcome of a build.
    pub fn update(&self, result: Result<(), &BuildError>) {
        match result {
            Ok(()) => self.error.store(None),
            Err(err) => {
                let mut page = html_page(err);
                if self.live_reload {
                    inject_live_reload(&mut page);
                }
                self.error.store(Some(Arc::new(page)));
            }
        }
    }

    pub fn error_page(&self) -> Option<Arc<String>> {
        self.error.load_full()
    }

    /// Tell every connected page to reload, forgetting closed sockets.
    pub fn broadcast_reload(&self) {
        let mut clients = self.clients.lock();
        clients.retain_mut(|socket| socket.send(Message::Text("reload".into())).is_ok());
        if !clients.is_empty() {
            log!("reload"; "{} page(s)", clients.len());
        }
    }

    fn add_client(&self, stream: Box<dyn ReadWrite + Send>) {
        let socket = WebSocket::from_raw_socket(stream, Role::Server, None);
        self.clients.lock().push(socket);
    }
}

// ============================================================================
// Server Entry Point
// ============================================================================

/// Build once, then serve the output directory until Ctrl+C. A failed build
/// does not stop the server: its error page is served until a rebuild
/// succeeds.
pub fn serve_site(mut builder: Builder) -> Result<()> {
    let result = builder.build().map(|_| ());
    if let Err(err) = &result {
        log!("error"; "{}", err.render(Style::Terminal));
    }

    let config = builder.config().clone();
    let server_state = Arc::new(DevServer::new(
        config.build.output.clone(),
        config.serve.live_reload,
    ));
    server_state.update(result.as_ref().map(|_| ()));

    let (server, addr) = try_bind_port(config.serve.ip()?, config.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);

    // Set up Ctrl+C handler for graceful shutdown
    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    log!("serve"; "http://{}", addr);

    if config.serve.watch {
        let state = Arc::clone(&server_state);
        std::thread::spawn(move || {
            if let Err(err) = watch_for_changes_blocking(builder, state) {
                log!("watch"; "{err:#}");
            }
        });
    }

    for request in server.incoming_requests() {
        if let Err(err) = handle_request(request, &server_state) {
            log!("serve"; "request error: {err}");
        }
    }

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(err) => last_error = Some(err),
        }
    }
    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Request Handling
// ============================================================================

/// Handle a single HTTP request.
///
/// Resolution order:
/// 1. `/ws` with an upgrade header → live reload socket
/// 2. Page request while the last build failed → error page (500)
/// 3. Exact file, or directory `index.html` → file
/// 4. Nothing found → 404
fn handle_request(request: Request, state: &DevServer) -> Result<()> {
    let url_path = urlencoding::decode(request.url())
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_default();
    let path = url_path.split('?').next().unwrap_or(&url_path);

    if path == RELOAD_PATH {
        if let Some(key) = websocket_key(&request) {
            let response = Response::empty(StatusCode(101))
                .with_header(header("Upgrade", "websocket"))
                .with_header(header("Connection", "Upgrade"))
                .with_header(header("Sec-WebSocket-Accept", &derive_accept_key(key.as_bytes())));
            let stream = request.upgrade("websocket", response);
            state.add_client(stream);
            return Ok(());
        }
    }

    let local_path = resolve_path(&state.output, path);

    if let Some(page) = state.error_page()
        && local_path.as_deref().is_none_or(is_page)
    {
        let response = Response::from_string(page.as_str())
            .with_status_code(StatusCode(500))
            .with_header(header("Content-Type", "text/html; charset=utf-8"));
        request.respond(response)?;
        return Ok(());
    }

    match local_path {
        Some(path) => serve_file(request, &path),
        None => serve_not_found(request),
    }
}

fn websocket_key(request: &Request) -> Option<String> {
    let upgrade = request
        .headers()
        .iter()
        .any(|h| h.field.equiv("Upgrade") && h.value.as_str().eq_ignore_ascii_case("websocket"));
    if !upgrade {
        return None;
    }
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Sec-WebSocket-Key"))
        .map(|h| h.value.as_str().trim().to_owned())
}

/// File in `root` that answers `url_path`. Paths climbing out of `root`
/// resolve to nothing.
fn resolve_path(root: &Path, url_path: &str) -> Option<PathBuf> {
    let rel = url_path.trim_matches('/');
    if rel.split('/').any(|part| part == "..") {
        return None;
    }
    let local = root.join(rel);
    if local.is_file() {
        return Some(local);
    }
    let index = local.join("index.html");
    index.is_file().then_some(index)
}

fn is_page(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "html")
}

/// Fields and values passed here are ASCII.
fn header(field: &str, value: &str) -> Header {
    Header::from_bytes(field, value).unwrap()
}

// ============================================================================
// Response Helpers
// ============================================================================

fn serve_file(request: Request, path: &Path) -> Result<()> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let response = Response::from_data(content).with_header(header("Content-Type", guess_content_type(path)));
    request.respond(response)?;
    Ok(())
}

fn serve_not_found(request: Request) -> Result<()> {
    let response = Response::new(
        StatusCode(404),
        vec![header("Content-Type", "text/plain")],
        Cursor::new("404 Not Found"),
        Some(13),
        None,
    );
    request.respond(response)?;
    Ok(())
}

/// Guess MIME content type from file extension.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("map" | "json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",

        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::SourceError;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_path() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("posts")).unwrap();
        fs::write(dir.path().join("index.html"), "home").unwrap();
        fs::write(dir.path().join("posts/index.html"), "posts").unwrap();
        fs::write(dir.path().join("posts/a.html"), "a").unwrap();

        assert_eq!(resolve_path(dir.path(), "/"), Some(dir.path().join("index.html")));
        assert_eq!(resolve_path(dir.path(), "/posts/"), Some(dir.path().join("posts/index.html")));
        assert_eq!(resolve_path(dir.path(), "/posts/a.html"), Some(dir.path().join("posts/a.html")));
        assert_eq!(resolve_path(dir.path(), "/missing.html"), None);
        assert_eq!(resolve_path(dir.path(), "/posts/../../etc/passwd"), None);
    }

    #[test]
    fn test_error_page_follows_build_result() {
        let state = DevServer::new(PathBuf::from("/site/_site"), true);
        assert!(state.error_page().is_none());

        let err = BuildError::from(SourceError::new("posts/a.md", 3, "template: syntax error"));
        state.update(Err(&err));
        let page = state.error_page().unwrap();
        assert!(page.contains("posts/a.md"), "{page}");
        assert!(page.contains("/ws"), "error page reloads too");

        state.update(Ok(()));
        assert!(state.error_page().is_none());
    }

    #[test]
    fn test_error_page_without_live_reload() {
        let state = DevServer::new(PathBuf::from("/site/_site"), false);
        let err = BuildError::from(SourceError::new("posts/a.md", 3, "template: syntax error"));
        state.update(Err(&err));
        assert!(!state.error_page().unwrap().contains("WebSocket"));
    }

    #[test]
    fn test_broadcast_without_clients() {
        let state = DevServer::new(PathBuf::from("/site/_site"), true);
        state.broadcast_reload();
        assert!(state.clients.lock().is_empty());
    }

    #[test]
    fn test_accept_key() {
        // RFC 6455 section 1.3
        assert_eq!(
            derive_accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_content_types() {
        assert_eq!(guess_content_type(Path::new("a.js")), "application/javascript; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("a.js.map")), "application/json; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("a.bin")), "application/octet-stream");
        assert!(is_page(Path::new("/x/index.html")));
        assert!(!is_page(Path::new("/x/app.css")));
    }
}
