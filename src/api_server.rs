//! Local query API
//!
//! Minimal read-only JSON over HTTP for companion tools.
//! Features:
//! - HTTP server on 127.0.0.1:8899 (configurable)
//! - One request per connection, then close
//! - GET /health, /recent, /search, /item
//!
//! Handlers ask the store worker for data and block on the reply; the
//! server never mutates history.

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;
use uuid::Uuid;

use crate::clipboard_history::{Entry, ItemType, StoreHandle};
use crate::error::ApiError;

/// Default port for the query API
pub const DEFAULT_PORT: u16 = 8899;

/// Name reported by /health
pub const APP_NAME: &str = "cliphist";

/// Result size for /recent and /search when no limit is given
pub const DEFAULT_RESULT_LIMIT: usize = 50;

/// Upper bound for any requested limit
pub const MAX_RESULT_LIMIT: usize = 200;

/// Accept loop sleep when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Per-connection read timeout
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Query API server
///
/// Uses std::net with a thread per connection (no async runtime required).
pub struct ApiServer {
    port: u16,
    store: StoreHandle,
}

impl ApiServer {
    /// Create a server for `port` (0 picks a free port on start)
    pub fn new(port: u16, store: StoreHandle) -> Self {
        Self { port, store }
    }

    /// Start the HTTP server in a background thread
    ///
    /// Returns a handle that can be used to stop the server.
    pub fn start(&self) -> Result<ServerHandle> {
        let listener = TcpListener::bind(("127.0.0.1", self.port))
            .with_context(|| format!("Failed to bind to port {}", self.port))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read listener address")?;

        // Non-blocking accept so stop() is noticed within one poll tick
        listener
            .set_nonblocking(true)
            .context("Failed to set non-blocking mode")?;

        let running = Arc::new(AtomicBool::new(true));
        let loop_running = running.clone();
        let store = self.store.clone();

        let thread = thread::Builder::new()
            .name("api-server".to_string())
            .spawn(move || accept_loop(listener, store, loop_running))
            .context("Failed to spawn API server thread")?;

        info!(addr = %local_addr, "Clipboard history API listening");
        Ok(ServerHandle {
            running,
            local_addr,
            thread: Mutex::new(Some(thread)),
        })
    }
}

/// Handle for controlling the running server
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    local_addr: SocketAddr,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ServerHandle {
    /// Stop accepting and wait for the accept loop to exit. Safe to call more than once.
    ///
    /// Connections already being served are not waited for.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }

    /// Check if server is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, store: StoreHandle, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!(peer = %addr, "API connection");
                let store = store.clone();
                let spawned = thread::Builder::new()
                    .name("api-connection".to_string())
                    .spawn(move || {
                        if let Err(e) = handle_connection(stream, &store) {
                            warn!(error = %e, "Error handling API connection");
                        }
                    });
                if let Err(e) = spawned {
                    error!(error = %e, "Failed to spawn API connection thread");
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                error!(error = %e, "Accept error");
            }
        }
    }
    info!("Clipboard history API stopped");
}

/// Handle a single HTTP connection
fn handle_connection(mut stream: TcpStream, store: &StoreHandle) -> Result<()> {
    // Accepted sockets inherit non-blocking mode on some platforms
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut raw_line = Vec::new();
    reader.read_until(b'\n', &mut raw_line)?;
    let blank = |line: &[u8]| line.iter().all(u8::is_ascii_whitespace);

    // Headers are read and discarded so the client sees a clean close
    if !blank(&raw_line) {
        loop {
            let mut line = Vec::new();
            if reader.read_until(b'\n', &mut line)? == 0 || blank(&line) {
                break;
            }
        }
    }

    // A request line that is not UTF-8 is routed as empty and gets a 400
    let request_line = std::str::from_utf8(&raw_line)
        .map(str::trim)
        .unwrap_or_default();
    debug!(request = %request_line, "API request");

    let (status, body) = respond(request_line, store);
    send_response(&mut stream, status, &body)
}

/// Status and JSON body for one request line
pub fn respond(request_line: &str, store: &StoreHandle) -> (u16, String) {
    let (status, value) = match route(request_line, store) {
        Ok(value) => (200, value),
        Err(err) => {
            debug!(status = err.status(), error = %err, "API request rejected");
            (err.status(), error_body(err))
        }
    };
    let body = serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string());
    (status, body)
}

fn route(request_line: &str, store: &StoreHandle) -> Result<Value, ApiError> {
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(ApiError::BadRequest);
    };
    if method != "GET" {
        return Err(ApiError::MethodNotAllowed);
    }

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let params = parse_query(query);

    match path {
        "/health" => Ok(json!({ "app": APP_NAME, "ok": true })),
        "/recent" => {
            let limit = parse_limit(params.get("limit"));
            let entries = store.recent(limit)?;
            Ok(items_json(&entries))
        }
        "/search" => {
            let query = params.get("q").map(String::as_str);
            let limit = parse_limit(params.get("limit"));
            // Only exact type tags filter
            let item_type = params.get("type").and_then(|t| ItemType::parse(t));
            let pinned_only = params
                .get("pinned")
                .is_some_and(|p| p == "1" || p.eq_ignore_ascii_case("true"));

            let entries = store.search(query, item_type, pinned_only, limit)?;
            Ok(items_json(&entries))
        }
        "/item" => {
            let id = params
                .get("id")
                .and_then(|id| Uuid::parse_str(id.trim()).ok())
                .ok_or(ApiError::MissingId)?;
            match store.get(id)? {
                Some(entry) => Ok(item_json(&entry)),
                None => Err(ApiError::NotFound),
            }
        }
        _ => Err(ApiError::NotFound),
    }
}

/// Percent-decoded query parameters; the first occurrence of a key wins
fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

fn parse_limit(raw: Option<&String>) -> usize {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .map(|limit| limit.clamp(1, MAX_RESULT_LIMIT as i64) as usize)
        .unwrap_or(DEFAULT_RESULT_LIMIT)
}

fn error_body(err: ApiError) -> Value {
    json!({ "error": err.code() })
}

fn items_json(entries: &[Entry]) -> Value {
    Value::Array(entries.iter().map(item_json).collect())
}

/// Wire form of one entry. Keys are kept in a BTreeMap so output is sorted.
pub fn item_json(entry: &Entry) -> Value {
    let item = &entry.item;
    let content = &entry.content;
    let mut fields: BTreeMap<&'static str, Value> = BTreeMap::new();

    fields.insert("id", json!(item.id.to_string()));
    fields.insert(
        "created_at",
        json!(item.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    fields.insert("type", json!(item.item_type.as_str()));
    fields.insert("preview", json!(item.preview));
    fields.insert("pinned", json!(item.pinned));

    if let Some(text) = &content.text {
        fields.insert("text", json!(text));
    }
    if let Some(url) = &content.url {
        fields.insert("url", json!(url.as_str()));
    }
    if let Some(path) = &content.file_path {
        fields.insert("file_path", json!(path.to_string_lossy()));
    }
    if let Some(path) = &content.image_path {
        fields.insert("image_path", json!(path.to_string_lossy()));
    }
    if let Some((width, height)) = content.image_size {
        fields.insert("image_width", json!(width));
        fields.insert("image_height", json!(height));
    }
    if let Some(name) = &item.source_app_name {
        fields.insert("source_app_name", json!(name));
    }
    if let Some(bundle_id) = &item.source_app_bundle_id {
        fields.insert("source_app_bundle_id", json!(bundle_id));
    }

    json!(fields)
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

/// Send an HTTP response
fn send_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        reason_phrase(status),
        body.len(),
        body
    );

    stream.write_all(response.as_bytes())?;
    stream.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard_history::test_support::{entry_from, text_entry};
    use crate::clipboard_history::{type_tags, HistoryStore, RawPayload, StoreWorker};
    use std::io::Read;

    struct Fixture {
        worker: StoreWorker,
        server: ServerHandle,
    }

    impl Fixture {
        fn start() -> Self {
            let worker = StoreWorker::spawn(HistoryStore::new(100, None)).unwrap();
            let server = ApiServer::new(0, worker.handle()).start().unwrap();
            Self { worker, server }
        }

        fn store(&self) -> StoreHandle {
            self.worker.handle()
        }

        fn get(&self, path: &str) -> (u16, String, String) {
            raw_request(
                self.server.port(),
                &format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path),
            )
        }
    }

    /// Send raw bytes and split the response into status, headers and body
    fn raw_request(port: u16, request: &str) -> (u16, String, String) {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        stream.flush().unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();

        let status_code = response
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let (head, body) = response.split_once("\r\n\r\n").unwrap_or((&response, ""));
        (status_code, head.to_string(), body.to_string())
    }

    fn parse(body: &str) -> Value {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_health_endpoint() {
        let fixture = Fixture::start();
        let (status, head, body) = fixture.get("/health");
        assert_eq!(status, 200);
        assert_eq!(parse(&body), json!({"app": "cliphist", "ok": true}));
        assert!(head.contains("Content-Type: application/json"));
        assert!(head.contains("Access-Control-Allow-Origin: *"));
        assert!(head.contains("Connection: close"));
        assert!(head.contains(&format!("Content-Length: {}", body.len())));
    }

    #[test]
    fn test_recent_in_store_order_with_limit() {
        let fixture = Fixture::start();
        fixture
            .store()
            .add((0..5).map(|i| text_entry(&format!("item {}", i), i)).collect())
            .unwrap();

        let (status, _, body) = fixture.get("/recent?limit=2");
        assert_eq!(status, 200);
        let items = parse(&body);
        let items = items.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["preview"], "item 0");
        assert_eq!(items[1]["preview"], "item 1");

        let (_, _, body) = fixture.get("/recent?limit=0");
        assert_eq!(parse(&body).as_array().unwrap().len(), 1);
        let (_, _, body) = fixture.get("/recent?limit=abc");
        assert_eq!(parse(&body).as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_search_returns_most_recent_match() {
        let fixture = Fixture::start();
        let store = fixture.store();
        store.add(vec![text_entry("abc one", 0)]).unwrap();
        store.add(vec![text_entry("abc two", 10)]).unwrap();
        store.add(vec![text_entry("abc three", 20)]).unwrap();

        let (status, _, body) = fixture.get("/search?q=abc&limit=1");
        assert_eq!(status, 200);
        let items = parse(&body);
        assert_eq!(items.as_array().unwrap().len(), 1);
        assert_eq!(items[0]["preview"], "abc three");
    }

    #[test]
    fn test_search_filters_and_decoding() {
        let fixture = Fixture::start();
        let store = fixture.store();
        let items = store
            .add(vec![
                text_entry("hello world", 0),
                entry_from(RawPayload::new().with(type_tags::URL, "https://hello.example/"), 0),
            ])
            .unwrap();
        store.toggle_pinned(items[1].id).unwrap();

        let (_, _, body) = fixture.get("/search?q=hello+world");
        assert_eq!(parse(&body).as_array().unwrap().len(), 1);
        let (_, _, body) = fixture.get("/search?q=%48ELLO");
        assert_eq!(parse(&body).as_array().unwrap().len(), 2);
        let (_, _, body) = fixture.get("/search?q=hello&type=url");
        assert_eq!(parse(&body)[0]["type"], "url");
        let (_, _, body) = fixture.get("/search?q=hello&type=bogus");
        assert_eq!(parse(&body).as_array().unwrap().len(), 2);
        let (_, _, body) = fixture.get("/search?pinned=TRUE");
        let pinned = parse(&body);
        assert_eq!(pinned.as_array().unwrap().len(), 1);
        assert_eq!(pinned[0]["pinned"], true);
    }

    #[test]
    fn test_item_endpoint() {
        let fixture = Fixture::start();
        let items = fixture.store().add(vec![text_entry("find me", 0)]).unwrap();
        let id = items[0].id;

        let (status, _, body) = fixture.get(&format!("/item?id={}", id));
        assert_eq!(status, 200);
        let item = parse(&body);
        assert_eq!(item["id"], id.to_string());
        assert_eq!(item["type"], "text");
        assert_eq!(item["text"], "find me");
        assert_eq!(item["created_at"], "2025-06-01T08:00:00.000Z");
        assert_eq!(item["source_app_name"], "Editor");
        assert!(item.get("url").is_none());

        let (status, _, body) = fixture.get(&format!("/item?id={}", Uuid::new_v4()));
        assert_eq!(status, 404);
        assert_eq!(parse(&body), json!({"error": "not_found"}));

        let (status, _, body) = fixture.get("/item");
        assert_eq!(status, 400);
        assert_eq!(parse(&body), json!({"error": "missing_id"}));
        let (status, _, _) = fixture.get("/item?id=not-a-uuid");
        assert_eq!(status, 400);
    }

    #[test]
    fn test_error_statuses() {
        let fixture = Fixture::start();
        let (status, _, body) = fixture.get("/nope");
        assert_eq!(status, 404);
        assert_eq!(parse(&body), json!({"error": "not_found"}));

        let (status, _, body) = raw_request(
            fixture.server.port(),
            "POST /health HTTP/1.1\r\nContent-Length: 0\r\n\r\n",
        );
        assert_eq!(status, 405);
        assert_eq!(parse(&body), json!({"error": "method_not_allowed"}));

        let (status, _, body) = raw_request(fixture.server.port(), "garbage\r\n\r\n");
        assert_eq!(status, 400);
        assert_eq!(parse(&body), json!({"error": "bad_request"}));
    }

    #[test]
    fn test_non_utf8_request_line_is_bad_request() {
        let fixture = Fixture::start();
        let mut stream = TcpStream::connect(("127.0.0.1", fixture.server.port())).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.write_all(b"\xff\xfe /health HTTP/1.1\r\n\r\n").unwrap();
        stream.flush().unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).unwrap();
        let response = String::from_utf8(response).unwrap();
        assert!(response.starts_with("HTTP/1.1 400"));
        let (_, body) = response.split_once("\r\n\r\n").unwrap();
        assert_eq!(parse(body), json!({"error": "bad_request"}));
    }

    #[test]
    fn test_type_filter_requires_exact_tag() {
        let fixture = Fixture::start();
        fixture
            .store()
            .add(vec![
                text_entry("hello world", 0),
                entry_from(RawPayload::new().with(type_tags::URL, "https://hello.example/"), 0),
            ])
            .unwrap();

        let (_, _, body) = fixture.get("/search?q=hello&type=url");
        assert_eq!(parse(&body).as_array().unwrap().len(), 1);
        let (_, _, body) = fixture.get("/search?q=hello&type=URL");
        assert_eq!(parse(&body).as_array().unwrap().len(), 2);
        let (_, _, body) = fixture.get("/search?q=hello&type=%20url");
        assert_eq!(parse(&body).as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_keys_sorted_and_pretty() {
        let fixture = Fixture::start();
        fixture.store().add(vec![text_entry("x", 0)]).unwrap();
        let (_, _, body) = fixture.get("/recent");

        assert!(body.contains('\n'));
        let keys = [
            "created_at",
            "id",
            "pinned",
            "preview",
            "source_app_bundle_id",
            "source_app_name",
            "text",
            "type",
        ];
        let positions: Vec<usize> = keys
            .iter()
            .map(|key| body.find(&format!("\"{}\"", key)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_unavailable_worker_is_503() {
        let fixture = Fixture::start();
        fixture.worker.shutdown();
        let (status, _, body) = fixture.get("/recent");
        assert_eq!(status, 503);
        assert_eq!(parse(&body), json!({"error": "unavailable"}));
    }

    #[test]
    fn test_stop_is_idempotent_and_closes_listener() {
        let fixture = Fixture::start();
        let port = fixture.server.port();
        assert!(fixture.server.is_running());

        fixture.server.stop();
        fixture.server.stop();
        assert!(!fixture.server.is_running());
        assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
    }

    #[test]
    fn test_respond_without_network() {
        let worker = StoreWorker::spawn(HistoryStore::new(10, None)).unwrap();
        let (status, body) = respond("GET /health HTTP/1.1", &worker.handle());
        assert_eq!(status, 200);
        assert_eq!(parse(&body)["ok"], true);
        assert_eq!(respond("", &worker.handle()).0, 400);
    }
}
