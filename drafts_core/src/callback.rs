// src/callback.rs
// x-callback-url correlation: a loopback HTTP listener that turns the
// fire-and-forget callbacks Drafts sends (x-success / x-error / x-cancel)
// into resolutions of registered, id-keyed pending requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::DraftsError;

/// Default correlation window. A request that sees no callback within this
/// interval is rejected with a timeout error.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

const CANCELLED_REASON: &str = "User cancelled";
const UNKNOWN_ERROR_REASON: &str = "Unknown error";

/// Settled result of one x-callback-url round trip.
///
/// Both variants are resolutions, not rejections: an explicit error or a
/// cancellation from the app is a completed exchange at this layer. Timeouts
/// and shutdown are the rejection paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The app called x-success; carries the echoed query parameters.
    Success(HashMap<String, String>),
    /// The app called x-error or x-cancel; carries the reason.
    Failure(String),
}

/// The three callback endpoints for one request id. Derived purely from the
/// bound port and the id; never stored.
#[derive(Debug, Clone)]
pub struct CallbackUrls {
    pub success: String,
    pub error: String,
    pub cancel: String,
}

struct Pending {
    tx: oneshot::Sender<Result<CallbackOutcome, DraftsError>>,
    timer: JoinHandle<()>,
}

struct Listening {
    port: u16,
    accept_task: JoinHandle<()>,
}

type PendingTable = Arc<Mutex<HashMap<String, Pending>>>;

/// Loopback HTTP listener plus the table of outstanding requests.
///
/// The table is an instance field so independent servers (e.g. in tests)
/// never interfere. Removal from the table is the linearization point:
/// whichever of callback, timeout, or shutdown removes the entry first is
/// the one that settles the future.
pub struct CallbackServer {
    pending: PendingTable,
    timeout: Duration,
    state: Mutex<Option<Listening>>,
}

impl CallbackServer {
    pub fn new() -> Self {
        Self::with_timeout(CALLBACK_TIMEOUT)
    }

    /// Override the correlation window. Tests use short windows; production
    /// code sticks with [`CALLBACK_TIMEOUT`].
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
            state: Mutex::new(None),
        }
    }

    /// Bind to an ephemeral loopback port and start accepting callbacks.
    /// Returns the bound port.
    pub async fn start(&self) -> Result<u16, DraftsError> {
        if self.port().is_some() {
            return Err(DraftsError::InternalError(
                "callback server already started".to_string(),
            ));
        }
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();

        let pending = Arc::clone(&self.pending);
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!(%addr, "callback connection");
                        let pending = Arc::clone(&pending);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, pending, port).await {
                                warn!("callback connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("callback accept error: {}", e);
                    }
                }
            }
        });

        let mut state = self.state.lock().expect("callback state lock poisoned");
        *state = Some(Listening { port, accept_task });
        info!(port, "callback listener started");
        Ok(port)
    }

    /// The bound port, if the listener is running.
    pub fn port(&self) -> Option<u16> {
        self.state
            .lock()
            .expect("callback state lock poisoned")
            .as_ref()
            .map(|l| l.port)
    }

    /// Build the callback URL triple for a request id. Pure function of the
    /// bound port and the id; callers may invoke it before registering.
    pub fn callback_urls(&self, request_id: &str) -> Result<CallbackUrls, DraftsError> {
        let port = self.port().ok_or_else(|| {
            DraftsError::InternalError("callback server is not running".to_string())
        })?;
        Ok(CallbackUrls {
            success: format!("http://localhost:{}/x-success/{}", port, request_id),
            error: format!("http://localhost:{}/x-error/{}", port, request_id),
            cancel: format!("http://localhost:{}/x-cancel/{}", port, request_id),
        })
    }

    /// Register interest in a request id. The returned handle settles exactly
    /// once: with a [`CallbackOutcome`] when a callback arrives, or with a
    /// timeout error after the correlation window, or with a shutdown error
    /// if [`stop`](Self::stop) runs first.
    ///
    /// Registering an id that is still outstanding is an error; callers mint
    /// a fresh UUID per attempt.
    pub fn register(&self, request_id: &str) -> Result<PendingCallback, DraftsError> {
        let (tx, rx) = oneshot::channel();

        let mut table = self.pending.lock().expect("pending table lock poisoned");
        if table.contains_key(request_id) {
            return Err(DraftsError::InvalidInput(format!(
                "request '{}' is already registered",
                request_id
            )));
        }

        let timer = {
            let pending = Arc::clone(&self.pending);
            let id = request_id.to_string();
            let timeout = self.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let entry = pending
                    .lock()
                    .expect("pending table lock poisoned")
                    .remove(&id);
                if let Some(p) = entry {
                    warn!(request_id = %id, "callback timed out");
                    let _ = p.tx.send(Err(DraftsError::Timeout(format!(
                        "no callback received for request '{}'",
                        id
                    ))));
                }
            })
        };

        table.insert(request_id.to_string(), Pending { tx, timer });
        debug!(request_id, "registered pending request");
        Ok(PendingCallback { rx })
    }

    /// Drop a registration without settling it. Used when the outbound launch
    /// fails before the app could ever call back.
    pub fn discard(&self, request_id: &str) {
        let entry = self
            .pending
            .lock()
            .expect("pending table lock poisoned")
            .remove(request_id);
        if let Some(p) = entry {
            p.timer.abort();
        }
    }

    /// Reject every outstanding request and release the listener. Safe to
    /// call with no requests outstanding, and safe to call twice.
    pub async fn stop(&self) {
        let drained: Vec<(String, Pending)> = {
            let mut table = self.pending.lock().expect("pending table lock poisoned");
            table.drain().collect()
        };
        for (id, p) in drained {
            debug!(request_id = %id, "rejecting pending request on shutdown");
            p.timer.abort();
            let _ = p.tx.send(Err(DraftsError::Shutdown));
        }

        let listening = self
            .state
            .lock()
            .expect("callback state lock poisoned")
            .take();
        if let Some(l) = listening {
            l.accept_task.abort();
            let _ = l.accept_task.await;
            info!(port = l.port, "callback listener stopped");
        }
    }
}

impl Default for CallbackServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered request; settles exactly once.
pub struct PendingCallback {
    rx: oneshot::Receiver<Result<CallbackOutcome, DraftsError>>,
}

impl PendingCallback {
    pub async fn wait(self) -> Result<CallbackOutcome, DraftsError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            // Sender dropped without settling: the table entry was destroyed
            // out of band, which only happens when the server goes away.
            Err(_) => Err(DraftsError::Shutdown),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Health,
    Success(String, HashMap<String, String>),
    Error(String, String),
    Cancel(String),
    Unknown,
}

fn parse_target(target: &str) -> Route {
    // The request target is origin-form; give it a synthetic base so the
    // url crate can split path and query.
    let parsed = match url::Url::parse(&format!("http://localhost{}", target)) {
        Ok(u) => u,
        Err(_) => return Route::Unknown,
    };
    let path = parsed.path().to_string();

    if path == "/health" {
        return Route::Health;
    }

    let query: HashMap<String, String> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if let Some(id) = path.strip_prefix("/x-success/") {
        if !id.is_empty() && !id.contains('/') {
            return Route::Success(id.to_string(), query);
        }
    }
    if let Some(id) = path.strip_prefix("/x-error/") {
        if !id.is_empty() && !id.contains('/') {
            let reason = query
                .get("error")
                .cloned()
                .unwrap_or_else(|| UNKNOWN_ERROR_REASON.to_string());
            return Route::Error(id.to_string(), reason);
        }
    }
    if let Some(id) = path.strip_prefix("/x-cancel/") {
        if !id.is_empty() && !id.contains('/') {
            return Route::Cancel(id.to_string());
        }
    }
    Route::Unknown
}

/// Settle the matching pending request, if any. A callback for an unknown or
/// already-settled id is a silent no-op so duplicate and late callbacks are
/// harmless.
fn resolve(pending: &PendingTable, request_id: &str, outcome: CallbackOutcome) {
    let entry = pending
        .lock()
        .expect("pending table lock poisoned")
        .remove(request_id);
    match entry {
        Some(p) => {
            p.timer.abort();
            debug!(request_id, "resolving pending request");
            let _ = p.tx.send(Ok(outcome));
        }
        None => {
            debug!(request_id, "callback for unknown request, ignoring");
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    pending: PendingTable,
    port: u16,
) -> Result<(), DraftsError> {
    // Callbacks are tiny GETs; read until the end of the header block.
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() > 16 * 1024 {
            break;
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();

    if method != "GET" {
        write_response(&mut stream, "405 Method Not Allowed", "text/plain", "method not allowed")
            .await?;
        return Ok(());
    }

    match parse_target(target) {
        Route::Health => {
            let body = serde_json::json!({"status": "ok", "port": port}).to_string();
            write_response(&mut stream, "200 OK", "application/json", &body).await?;
        }
        Route::Success(id, params) => {
            resolve(&pending, &id, CallbackOutcome::Success(params));
            write_response(&mut stream, "200 OK", "text/plain", "OK").await?;
        }
        Route::Error(id, reason) => {
            resolve(&pending, &id, CallbackOutcome::Failure(reason));
            write_response(&mut stream, "200 OK", "text/plain", "OK").await?;
        }
        Route::Cancel(id) => {
            resolve(&pending, &id, CallbackOutcome::Failure(CANCELLED_REASON.to_string()));
            write_response(&mut stream, "200 OK", "text/plain", "OK").await?;
        }
        Route::Unknown => {
            write_response(&mut stream, "404 Not Found", "text/plain", "not found").await?;
        }
    }
    Ok(())
}

async fn write_response(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &str,
) -> Result<(), DraftsError> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
