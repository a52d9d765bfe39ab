//! TCP listener and request routing.
//!
//! One thread per connection; each connection submits its batch to the
//! bounded worker pool and blocks on the reply. Under saturation the
//! request is answered 503 rather than queued without limit.

use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use monxml_config::Settings;

use crate::http::{read_request, Request, RequestError, Response};
use crate::pool::{SubmitError, WorkerPool};

/// The processing route. A trailing slash is tolerated.
pub const PROCESS_ROUTE: &str = "/processar-zip";

/// Fixed name the browser saves the response archive under.
const OUTPUT_FILENAME: &str = "xmls_processados.zip";

const COUNT_HEADERS: [&str; 3] = ["X-Count-Approved", "X-Count-Contingency", "X-Count-Rejected"];

/// Operational counters, shared across connection threads.
#[derive(Clone, Default)]
pub struct ServerMetrics {
    /// Batches processed to completion.
    pub batches_served: Arc<AtomicU64>,
    /// Requests refused because the pool queue was full.
    pub requests_saturated: Arc<AtomicU64>,
    /// Requests refused for size or malformed syntax.
    pub requests_bad: Arc<AtomicU64>,
}

/// The processing server: listener thread plus worker pool.
pub struct Server {
    settings: Arc<Settings>,
    pool: Arc<WorkerPool>,
    shutdown: Arc<AtomicBool>,
    listener_handle: Option<JoinHandle<()>>,
    bound_addr: Option<SocketAddr>,
    metrics: ServerMetrics,
}

impl Server {
    pub fn new(settings: Settings) -> Self {
        let pool = WorkerPool::new(settings.workers, settings.queue_depth);
        Self {
            settings: Arc::new(settings),
            pool: Arc::new(pool),
            shutdown: Arc::new(AtomicBool::new(false)),
            listener_handle: None,
            bound_addr: None,
            metrics: ServerMetrics::default(),
        }
    }

    /// Bind and start accepting connections on a background thread.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.listener_handle.is_some() {
            return Ok(());
        }
        self.shutdown.store(false, Ordering::SeqCst);

        let listener = TcpListener::bind(self.settings.bind_addr.as_str())?;
        let addr = listener.local_addr()?;
        self.bound_addr = Some(addr);

        // Non-blocking accept so the loop can observe the shutdown flag.
        listener.set_nonblocking(true)?;

        let shutdown = Arc::clone(&self.shutdown);
        let settings = Arc::clone(&self.settings);
        let pool = Arc::clone(&self.pool);
        let metrics = self.metrics.clone();
        self.listener_handle = Some(thread::spawn(move || {
            run_listener(listener, shutdown, settings, pool, metrics);
        }));

        log::info!(
            "Listening on {} ({} workers, queue depth {})",
            addr,
            self.settings.workers,
            self.settings.queue_depth
        );
        Ok(())
    }

    /// Stop accepting connections and join the listener thread.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.listener_handle.take() {
            let _ = handle.join();
        }
        self.bound_addr = None;
        log::info!("Server stopped");
    }

    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_listener(
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    settings: Arc<Settings>,
    pool: Arc<WorkerPool>,
    metrics: ServerMetrics,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, addr)) => {
                log::debug!("Accepted connection from {}", addr);
                let settings = Arc::clone(&settings);
                let pool = Arc::clone(&pool);
                let metrics = metrics.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_connection(stream, &settings, &pool, &metrics) {
                        log::warn!("Connection error from {}: {}", addr, e);
                    }
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                log::error!("Accept error: {}", e);
                break;
            }
        }
    }
}

fn handle_connection(
    mut stream: TcpStream,
    settings: &Settings,
    pool: &WorkerPool,
    metrics: &ServerMetrics,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    stream.set_write_timeout(Some(Duration::from_secs(30)))?;

    let mut reader = BufReader::new(stream.try_clone()?);
    let (origin, response) = match read_request(&mut reader, settings.max_body_bytes) {
        Ok(request) => {
            let origin = request.header("origin").map(str::to_string);
            (origin, route(&request, settings, pool, metrics))
        }
        Err(RequestError::BodyTooLarge { declared, limit }) => {
            metrics.requests_bad.fetch_add(1, Ordering::Relaxed);
            log::warn!("Rejected oversized body: {} bytes (limit {})", declared, limit);
            (None, Response::text(413, "Payload Too Large", "request body exceeds the configured limit"))
        }
        Err(e) => {
            metrics.requests_bad.fetch_add(1, Ordering::Relaxed);
            log::debug!("Bad request: {}", e);
            (None, Response::text(400, "Bad Request", "malformed HTTP request"))
        }
    };

    with_cors(response, origin.as_deref(), settings).write_to(&mut stream)
}

fn route(request: &Request, settings: &Settings, pool: &WorkerPool, metrics: &ServerMetrics) -> Response {
    match (request.method.as_str(), request.route()) {
        ("POST", PROCESS_ROUTE) => process(request, pool, metrics),
        ("OPTIONS", PROCESS_ROUTE) => preflight(),
        (_, PROCESS_ROUTE) => Response::text(405, "Method Not Allowed", "use POST")
            .header("Allow", "POST, OPTIONS"),
        _ => Response::text(404, "Not Found", "no such route"),
    }
}

/// Run one batch through the pool and wrap the finished archive.
fn process(request: &Request, pool: &WorkerPool, metrics: &ServerMetrics) -> Response {
    let started = Instant::now();

    let reply = match pool.submit(request.body.clone()) {
        Ok(reply) => reply,
        Err(SubmitError::Saturated) => {
            metrics.requests_saturated.fetch_add(1, Ordering::Relaxed);
            log::warn!("Processing queue full, rejecting request");
            return Response::text(503, "Service Unavailable", "processing queue is full, retry later");
        }
        Err(SubmitError::Closed) => {
            return Response::text(503, "Service Unavailable", "server is shutting down");
        }
    };

    let result = match reply.blocking_recv() {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            log::error!("Batch failed: {}", e);
            return Response::text(500, "Internal Server Error", "batch processing failed");
        }
        Err(_) => {
            log::error!("Worker dropped the reply channel");
            return Response::text(500, "Internal Server Error", "batch processing failed");
        }
    };

    metrics.batches_served.fetch_add(1, Ordering::Relaxed);
    log::info!(
        "Batch done in {:.2?}: {} approved, {} contingency, {} rejected",
        started.elapsed(),
        result.stats.approved,
        result.stats.contingency,
        result.stats.rejected
    );

    Response::new(200, "OK")
        .header("Content-Type", "application/x-zip-compressed")
        .header(
            "Content-Disposition",
            &format!("attachment; filename={OUTPUT_FILENAME}"),
        )
        .header(COUNT_HEADERS[0], &result.stats.approved.to_string())
        .header(COUNT_HEADERS[1], &result.stats.contingency.to_string())
        .header(COUNT_HEADERS[2], &result.stats.rejected.to_string())
        .body(result.archive)
}

fn preflight() -> Response {
    Response::new(204, "No Content")
        .header("Access-Control-Allow-Methods", "POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type")
        .header("Access-Control-Max-Age", "3600")
}

/// Add CORS headers when the request's Origin is in the allow-list.
fn with_cors(response: Response, origin: Option<&str>, settings: &Settings) -> Response {
    match origin {
        Some(origin) if settings.allowed_origins.iter().any(|o| o == origin) => response
            .header("Access-Control-Allow-Origin", origin)
            .header("Access-Control-Allow-Credentials", "true")
            .header("Access-Control-Expose-Headers", &COUNT_HEADERS.join(", ")),
        _ => response,
    }
}
