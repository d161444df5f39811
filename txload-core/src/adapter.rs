use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use txload_grpc::{ConnectOptions, GrpcClient, GrpcMethod, InvokeOptions};
use txload_http::{HttpClient, HttpRequest};

use crate::connection::ConnectionState;
use crate::request::PaymentRequest;
use crate::{CurrencyCodeTable, Outcome, Protocol, RawStatus};

/// Turns a payment into one call on the wire and reports what happened.
///
/// `invoke` never fails: every transport problem becomes a failure [`Outcome`].
pub trait ProtocolAdapter {
    fn protocol(&self) -> Protocol;

    fn invoke(
        &mut self,
        req: &PaymentRequest,
        timeout: Duration,
    ) -> impl Future<Output = Outcome> + Send;
}

/// `POST <base_url><path>` with a JSON body. One instance per worker.
#[derive(Debug)]
pub struct HttpAdapter {
    client: HttpClient,
    url: Arc<str>,
}

impl HttpAdapter {
    pub fn new(url: impl Into<Arc<str>>, connect_timeout: Duration) -> Self {
        Self {
            client: HttpClient::new(Some(connect_timeout)),
            url: url.into(),
        }
    }
}

impl ProtocolAdapter for HttpAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    async fn invoke(&mut self, req: &PaymentRequest, timeout: Duration) -> Outcome {
        let started = Instant::now();
        let body = match serde_json::to_vec(&req.to_http_body()) {
            Ok(b) => b,
            Err(err) => {
                tracing::debug!(error = %err, id = %req.id, "failed to encode payment body");
                return Outcome::transport("encode", started.elapsed());
            }
        };

        let request = HttpRequest::post_json(self.url.as_ref(), body).with_timeout(timeout);
        match self.client.request(request).await {
            Ok(res) => {
                let body = serde_json::from_slice(&res.body).ok();
                Outcome::new(RawStatus::Http(res.status), started.elapsed(), body)
            }
            Err(err) => {
                let kind = err.transport_error_kind();
                tracing::debug!(error = %err, %kind, url = %self.url, "http call failed");
                Outcome::transport(kind.to_string(), started.elapsed())
            }
        }
    }
}

/// Unary call to a bound method over a per-worker channel.
#[derive(Debug)]
pub struct GrpcAdapter {
    target: Arc<str>,
    method: Arc<GrpcMethod>,
    currencies: Arc<CurrencyCodeTable>,
    connect_timeout: Duration,
    state: ConnectionState<GrpcClient>,
    warned: bool,
}

impl GrpcAdapter {
    pub fn new(
        target: impl Into<Arc<str>>,
        method: Arc<GrpcMethod>,
        currencies: Arc<CurrencyCodeTable>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            target: target.into(),
            method,
            currencies,
            connect_timeout,
            state: ConnectionState::default(),
            warned: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }
}

impl ProtocolAdapter for GrpcAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Grpc
    }

    async fn invoke(&mut self, req: &PaymentRequest, timeout: Duration) -> Outcome {
        let started = Instant::now();
        let target = self.target.clone();
        let opts = ConnectOptions {
            timeout: Some(self.connect_timeout),
        };

        let dialing = !self.is_connected();
        let client = match self
            .state
            .ensure(|| async move { GrpcClient::connect(&target, opts).await })
            .await
        {
            Ok(client) => {
                if dialing {
                    tracing::debug!(target = %self.target, "grpc channel connected");
                }
                self.warned = false;
                client
            }
            Err(err) => {
                if !self.warned {
                    tracing::warn!(error = %err, target = %self.target, "grpc connect failed");
                    self.warned = true;
                }
                return Outcome::transport("connect", started.elapsed());
            }
        };

        let json = req.to_grpc_json(&self.currencies);
        let opts = InvokeOptions {
            timeout: Some(timeout),
        };
        let result = match client.unary_json(&self.method, &json, opts).await {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!(error = %err, id = %req.id, "grpc call not sent");
                let kind = err.transport_error_kind().to_string();
                return Outcome::transport(kind, started.elapsed());
            }
        };

        if result.breaks_connection() && self.state.reset() {
            tracing::debug!(status = ?result.status, target = %self.target, "dropped grpc channel");
        }
        if !result.ok {
            tracing::debug!(status = ?result.status, message = ?result.message, "grpc call failed");
        }

        Outcome::new(RawStatus::Grpc(result.status), started.elapsed(), result.response)
    }
}

/// Adapter picked at startup from the configured protocol.
#[derive(Debug)]
pub enum AnyAdapter {
    Http(HttpAdapter),
    Grpc(GrpcAdapter),
}

impl ProtocolAdapter for AnyAdapter {
    fn protocol(&self) -> Protocol {
        match self {
            Self::Http(a) => a.protocol(),
            Self::Grpc(a) => a.protocol(),
        }
    }

    async fn invoke(&mut self, req: &PaymentRequest, timeout: Duration) -> Outcome {
        match self {
            Self::Http(a) => a.invoke(req, timeout).await,
            Self::Grpc(a) => a.invoke(req, timeout).await,
        }
    }
}
