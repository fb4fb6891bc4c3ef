//! Exposes an in-process HTTP target for use in integration tests.
//!
//! ```
//! use varload_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/ok");
//!    // attack the URL in tests...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::any;

/// Latency of the `/slow` endpoint.
pub const SLOW_LATENCY: Duration = Duration::from_millis(50);

/// An in-process HTTP target for use in integration tests.
///
/// The server listens on a random available port on localhost and counts every request it
/// receives. It serves the following endpoints for any method:
///
/// - `/ok`: responds `200 OK` with a short body.
/// - `/slow`: responds `200 OK` after [`SLOW_LATENCY`].
/// - `/error`: responds `500 Internal Server Error`.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    hits: Arc<AtomicU64>,
}

impl TestServer {
    /// Binds the server and starts serving in the background.
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let hits = Arc::new(AtomicU64::new(0));
        let app = Router::new()
            .route("/ok", any(ok))
            .route("/slow", any(slow))
            .route("/error", any(error))
            .with_state(Arc::clone(&hits));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            hits,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Returns the number of requests received so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn ok(State(hits): State<Arc<AtomicU64>>) -> &'static str {
    hits.fetch_add(1, Ordering::Relaxed);
    "ok"
}

async fn slow(State(hits): State<Arc<AtomicU64>>) -> &'static str {
    hits.fetch_add(1, Ordering::Relaxed);
    tokio::time::sleep(SLOW_LATENCY).await;
    "slow"
}

async fn error(State(hits): State<Arc<AtomicU64>>) -> StatusCode {
    hits.fetch_add(1, Ordering::Relaxed);
    StatusCode::INTERNAL_SERVER_ERROR
}
