use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub mod grpc;
pub use grpc::{GrpcBehavior, GrpcTestServer};

pub const PATH_PAYMENTS: &str = "/payments";

/// Protobuf schema of the mock payments service.
pub const PAYMENTS_PROTO: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../proto/payments/v1/payments.proto"
);

/// Compiled `FileDescriptorSet` of [`PAYMENTS_PROTO`].
pub const PAYMENTS_DESCRIPTOR_SET: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/payments_descriptor.bin"));

/// How the HTTP payments endpoint answers well-formed requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpBehavior {
    /// 200 with `{"status":"ok","id":...}`.
    AlwaysOk,
    /// The given status with `{"status":"error","message":"upstream failed"}`.
    AlwaysStatus(u16),
    /// 200 with `{"status":"error",...}`.
    OkWithErrorBody,
    /// Every n-th request fails with 500, the rest succeed.
    FailEvery(u64),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PaymentBody {
    pub id: String,
    pub currency: String,
    pub amount: f64,
    pub source_account: String,
    pub destination_account: String,
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    json_content_type_total: Arc<AtomicU64>,
    last_payment: Arc<Mutex<Option<PaymentBody>>>,
}

impl TestServerStats {
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn json_content_type_total(&self) -> u64 {
        self.json_content_type_total.load(Ordering::Relaxed)
    }

    pub fn last_payment(&self) -> Option<PaymentBody> {
        self.last_payment
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[derive(Clone)]
struct AppState {
    behavior: HttpBehavior,
    delay: Duration,
    stats: TestServerStats,
}

#[derive(Serialize)]
struct Reply<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

fn json_reply(status: StatusCode, reply: &Reply<'_>) -> Response {
    match serde_json::to_vec(reply) {
        Ok(body) => (status, [("content-type", "application/json")], body).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn handle_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let n = state.stats.requests_total.fetch_add(1, Ordering::Relaxed) + 1;

    if headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"))
    {
        state
            .stats
            .json_content_type_total
            .fetch_add(1, Ordering::Relaxed);
    }

    let payment: PaymentBody = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            return json_reply(
                StatusCode::BAD_REQUEST,
                &Reply {
                    status: "error",
                    id: None,
                    message: Some("bad json"),
                },
            );
        }
    };
    *state
        .stats
        .last_payment
        .lock()
        .unwrap_or_else(|p| p.into_inner()) = Some(payment.clone());

    if !state.delay.is_zero() {
        sleep(state.delay).await;
    }

    let failed_status = match state.behavior {
        HttpBehavior::AlwaysOk | HttpBehavior::OkWithErrorBody => None,
        HttpBehavior::AlwaysStatus(code) => Some(code),
        HttpBehavior::FailEvery(every) => (every > 0 && n % every == 0).then_some(500),
    };

    match failed_status {
        Some(code) => json_reply(
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            &Reply {
                status: "error",
                id: None,
                message: Some("upstream failed"),
            },
        ),
        None if state.behavior == HttpBehavior::OkWithErrorBody => json_reply(
            StatusCode::OK,
            &Reply {
                status: "error",
                id: Some(payment.id.as_str()),
                message: Some("declined"),
            },
        ),
        None => json_reply(
            StatusCode::OK,
            &Reply {
                status: "ok",
                id: Some(payment.id.as_str()),
                message: None,
            },
        ),
    }
}

pub fn router(behavior: HttpBehavior, delay: Duration, stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_PAYMENTS, post(handle_payment))
        .with_state(AppState {
            behavior,
            delay,
            stats,
        })
}

/// Mock payments HTTP service bound to an ephemeral localhost port.
pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(HttpBehavior::AlwaysOk, Duration::ZERO).await
    }

    pub async fn start_with(behavior: HttpBehavior, delay: Duration) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(behavior, delay, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn payments_url(&self) -> String {
        format!("{}{PATH_PAYMENTS}", self.base_url)
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
