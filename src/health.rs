//! Liveness endpoint for container platforms.
//!
//! A tiny HTTP server answering `GET`/`HEAD` on `/` and `/health` with
//! `200 {"status":"ok","service":"mcp-redmine"}` and everything else with
//! `404`. It runs on its own OS thread with its own runtime, so it keeps
//! answering while the MCP loop blocks on stdin or on a slow Redmine call.
//!
//! Nothing here is fatal: if the port cannot be bound, the failure is
//! logged and the MCP server runs without a liveness endpoint.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

/// Service name reported by the liveness endpoint.
pub const SERVICE_NAME: &str = "mcp-redmine";

/// Readiness probe attempts after spawning the listener.
pub const READY_ATTEMPTS: u32 = 10;

/// Delay before each readiness probe attempt.
pub const READY_INTERVAL: Duration = Duration::from_millis(200);

/// Builds the liveness router.
pub fn router() -> Router {
    Router::new()
        .route("/", get(health).fallback(not_found))
        .route("/health", get(health).fallback(not_found))
        .fallback(not_found)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": SERVICE_NAME}))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// A running liveness endpoint.
///
/// The server thread lives for the rest of the process; dropping this
/// handle does not stop it.
#[derive(Debug)]
pub struct HealthServer {
    addr: SocketAddr,
    _thread: JoinHandle<()>,
}

impl HealthServer {
    /// Binds `addr` and starts serving on a dedicated thread.
    ///
    /// Binding happens on the calling thread, so an unavailable port is
    /// reported here rather than inside the server thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the thread cannot
    /// be spawned.
    pub fn spawn(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let thread = thread::Builder::new()
            .name("health".to_string())
            .spawn(move || serve(listener))?;

        Ok(Self {
            addr,
            _thread: thread,
        })
    }

    /// The bound address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }
}

fn serve(listener: TcpListener) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create health check runtime");
            return;
        }
    };

    let result = runtime.block_on(async move {
        let listener = tokio::net::TcpListener::from_std(listener)?;
        axum::serve(listener, router()).await
    });

    if let Err(e) = result {
        error!(error = %e, "Health check server stopped");
    }
}

/// Probes `127.0.0.1:port` until it accepts a connection.
///
/// Sleeps `interval` before each of up to `attempts` probes. Returns whether
/// the port became reachable.
pub fn wait_until_ready(port: u16, attempts: u32, interval: Duration) -> bool {
    let target = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));

    for attempt in 1..=attempts {
        thread::sleep(interval);
        if TcpStream::connect_timeout(&target, Duration::from_secs(1)).is_ok() {
            return true;
        }
        debug!(attempt, attempts, "Waiting for health check server to be ready");
    }
    false
}

/// Starts the liveness endpoint on all interfaces and verifies it.
///
/// Returns `None` if the server could not be started. A failed readiness
/// check is only logged; the server handle is still returned.
pub fn start(port: u16) -> Option<HealthServer> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    info!(%addr, "Starting health check server");

    let server = match HealthServer::spawn(addr) {
        Ok(server) => server,
        Err(e) => {
            warn!(%addr, error = %e, "Could not start health check server, continuing without it");
            return None;
        }
    };

    if wait_until_ready(server.port(), READY_ATTEMPTS, READY_INTERVAL) {
        info!(addr = %server.local_addr(), "Health check server is listening");
    } else {
        warn!(
            attempts = READY_ATTEMPTS,
            "Health check server started but verification failed"
        );
    }

    Some(server)
}
