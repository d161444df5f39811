use std::time::Instant;

use prost_reflect::{DynamicMessage, ReflectMessage as _};
use tonic::transport::{Channel, Endpoint};

use crate::codec::DynamicMessageCodec;
use crate::convert::{json_to_message, message_to_json};
use crate::proto::GrpcMethod;
use crate::{ConnectOptions, Error, InvokeOptions, Result, UnaryResult};

/// One HTTP/2 channel to a gRPC server. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct GrpcClient {
    channel: Channel,
}

impl GrpcClient {
    /// Dials `target` eagerly. Plaintext only; a bare `host:port` gets an `http://` scheme.
    pub async fn connect(target: &str, opts: ConnectOptions) -> Result<Self> {
        let uri = if target.contains("://") {
            target.to_string()
        } else {
            format!("http://{target}")
        };

        let mut endpoint = Endpoint::from_shared(uri)?.tcp_nodelay(true);
        if let Some(timeout) = opts.timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }

        let channel = endpoint.connect().await.map_err(Error::Connect)?;
        Ok(Self { channel })
    }

    /// Converts `req` with the method's input descriptor, then calls [`Self::unary`].
    pub async fn unary_json(
        &self,
        method: &GrpcMethod,
        req: &serde_json::Value,
        opts: InvokeOptions,
    ) -> Result<UnaryResult> {
        let msg = json_to_message(&method.input(), req)?;
        self.unary(method, msg, opts).await
    }

    /// Performs one unary call.
    ///
    /// `Err` is returned only for problems on this side of the wire. Every status the
    /// server (or the channel) reports, including deadline and unavailable, comes back
    /// as an `Ok` result with `ok == false`.
    pub async fn unary(
        &self,
        method: &GrpcMethod,
        req: DynamicMessage,
        opts: InvokeOptions,
    ) -> Result<UnaryResult> {
        let expected = method.input();
        if req.descriptor() != expected {
            return Err(Error::InputMismatch {
                expected: expected.full_name().to_string(),
                actual: req.descriptor().full_name().to_string(),
            });
        }

        let mut request = tonic::Request::new(req);
        if let Some(timeout) = opts.timeout {
            request.set_timeout(timeout);
        }

        let started = Instant::now();
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        let codec = DynamicMessageCodec::new(method.output());

        let res = async {
            grpc.ready()
                .await
                .map_err(|e| tonic::Status::unavailable(format!("channel not ready: {e}")))?;
            grpc.unary(request, method.path(), codec).await
        }
        .await;
        let elapsed = started.elapsed();

        Ok(match res {
            Ok(res) => UnaryResult {
                ok: true,
                status: tonic::Code::Ok,
                message: None,
                response: Some(message_to_json(res.get_ref())),
                elapsed,
            },
            Err(status) => UnaryResult {
                ok: false,
                status: status.code(),
                message: Some(status.message().to_string()),
                response: None,
                elapsed,
            },
        })
    }
}
