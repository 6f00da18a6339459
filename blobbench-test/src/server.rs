//! Exposes an in-process stand-in for the target object store.
//!
//! ```
//! use blobbench_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = TestServer::new().await;
//!     let url = server.url("/health");
//!     // use the URL in tests...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

/// Scripted behavior of the object routes.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Respond 200 to everything, after an optional artificial latency.
    Ok {
        /// Delay before every response.
        latency: Duration,
    },
    /// Respond with the given status to every object request.
    Status(u16),
    /// Accept requests but never respond.
    Hang,
}

#[derive(Debug)]
struct AppState {
    behavior: Behavior,
    requests: AtomicU64,
}

/// An in-process test target for use in integration tests.
///
/// This server binds a random available port on localhost. The `/health`
/// route always answers 200; PUT/GET object routes and the bucket listing
/// follow the configured [`Behavior`]. It keeps no object state, since the
/// harness under test measures outcomes and latencies, not storage
/// semantics.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: Arc<AppState>,
}

impl TestServer {
    /// Creates a server that answers 200 to everything without delay.
    pub async fn new() -> Self {
        Self::with_behavior(Behavior::Ok {
            latency: Duration::ZERO,
        })
        .await
    }

    /// Creates a server with the given scripted behavior.
    pub async fn with_behavior(behavior: Behavior) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = Arc::new(AppState {
            behavior,
            requests: AtomicU64::new(0),
        });

        let app = Router::new()
            .route("/health", get(health))
            .route("/{bucket}", get(list_bucket))
            .route("/{bucket}/{*key}", get(get_object).put(put_object))
            .with_state(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Number of object requests (excluding health probes) received so far.
    pub fn requests(&self) -> u64 {
        self.state.requests.load(Ordering::Relaxed)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn put_object(State(state): State<Arc<AppState>>, _body: Bytes) -> Response {
    respond(&state, || StatusCode::OK.into_response()).await
}

async fn get_object(State(state): State<Arc<AppState>>) -> Response {
    respond(&state, || "payload".into_response()).await
}

async fn list_bucket(State(state): State<Arc<AppState>>) -> Response {
    respond(&state, || {
        Json(serde_json::json!({ "keys": [] })).into_response()
    })
    .await
}

async fn respond(state: &AppState, ok: impl FnOnce() -> Response) -> Response {
    state.requests.fetch_add(1, Ordering::Relaxed);

    match state.behavior {
        Behavior::Ok { latency } => {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            ok()
        }
        Behavior::Status(code) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        Behavior::Hang => std::future::pending().await,
    }
}
