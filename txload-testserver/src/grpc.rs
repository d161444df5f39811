use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Code, Request, Response, Status};

pub mod payments {
    tonic::include_proto!("payments.v1");
}

use payments::payments_service_server::{PaymentsService, PaymentsServiceServer};
use payments::{CreatePaymentRequest, CreatePaymentResponse};

/// How the mock `PaymentsService/CreatePayment` answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrpcBehavior {
    AlwaysOk,
    AlwaysStatus(Code),
}

#[derive(Debug, Clone, Default)]
pub struct GrpcServerStats {
    calls_total: Arc<AtomicU64>,
    last_request: Arc<std::sync::Mutex<Option<CreatePaymentRequest>>>,
}

impl GrpcServerStats {
    pub fn calls_total(&self) -> u64 {
        self.calls_total.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<CreatePaymentRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[derive(Debug)]
struct PaymentsSvc {
    behavior: GrpcBehavior,
    stats: GrpcServerStats,
}

#[tonic::async_trait]
impl PaymentsService for PaymentsSvc {
    async fn create_payment(
        &self,
        request: Request<CreatePaymentRequest>,
    ) -> Result<Response<CreatePaymentResponse>, Status> {
        let n = self.stats.calls_total.fetch_add(1, Ordering::Relaxed) + 1;
        let req = request.into_inner();
        *self
            .stats
            .last_request
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(req);

        match self.behavior {
            GrpcBehavior::AlwaysOk => Ok(Response::new(CreatePaymentResponse {
                payment_id: format!("pay_{n}"),
            })),
            GrpcBehavior::AlwaysStatus(code) => Err(Status::new(code, "payment rejected")),
        }
    }
}

/// Mock payments gRPC service bound to an ephemeral localhost port.
pub struct GrpcTestServer {
    addr: SocketAddr,
    stats: GrpcServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl GrpcTestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(GrpcBehavior::AlwaysOk).await
    }

    pub async fn start_with(behavior: GrpcBehavior) -> std::io::Result<Self> {
        Self::start_on(SocketAddr::from(([127, 0, 0, 1], 0)), behavior).await
    }

    /// Binds `addr`, e.g. a port a client was already pointed at.
    pub async fn start_on(addr: SocketAddr, behavior: GrpcBehavior) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let stats = GrpcServerStats::default();

        let svc = PaymentsServiceServer::new(PaymentsSvc {
            behavior,
            stats: stats.clone(),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let incoming = TcpListenerStream::new(listener);
            let server = tonic::transport::Server::builder()
                .add_service(svc)
                .serve_with_incoming_shutdown(incoming, async move {
                    let _ = shutdown_rx.await;
                });
            let _ = server.await;
        });

        Ok(Self {
            addr,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `host:port`, without scheme.
    pub fn target(&self) -> String {
        format!("{}:{}", self.addr.ip(), self.addr.port())
    }

    pub fn stats(&self) -> &GrpcServerStats {
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

impl Drop for GrpcTestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
