use std::fmt;
use std::time::Duration;

use txload_grpc::Code;

/// What the transport reported for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawStatus {
    Http(u16),
    Grpc(Code),
    /// Network, connect, timeout or encode failure before any status was received.
    Transport(String),
    /// The dataset had nothing to send.
    NoData,
}

impl RawStatus {
    pub fn is_success(&self) -> bool {
        match self {
            Self::Http(code) => (200..300).contains(code),
            Self::Grpc(code) => *code == Code::Ok,
            Self::Transport(_) | Self::NoData => false,
        }
    }

    /// Tag value for the `status` tag on request metrics.
    pub fn tag(&self) -> String {
        match self {
            Self::Http(code) => code.to_string(),
            Self::Grpc(code) => format!("{code:?}"),
            Self::Transport(kind) => format!("transport_{kind}"),
            Self::NoData => "no_data".to_string(),
        }
    }
}

impl fmt::Display for RawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(code) => write!(f, "HTTP {code}"),
            Self::Grpc(code) => write!(f, "gRPC {code:?}"),
            Self::Transport(kind) => write!(f, "transport: {kind}"),
            Self::NoData => f.write_str("no_data"),
        }
    }
}

/// Result of one call, consumed by the checks and the metrics right away.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub success: bool,
    pub latency: Duration,
    pub status: RawStatus,
    /// Parsed response body, when there was one and it was JSON.
    pub body: Option<serde_json::Value>,
    /// Check name and verdict, in check-set order. Filled in after validation.
    pub checks: Vec<(String, bool)>,
}

impl Outcome {
    pub fn new(status: RawStatus, latency: Duration, body: Option<serde_json::Value>) -> Self {
        Self {
            success: status.is_success(),
            latency,
            status,
            body,
            checks: Vec::new(),
        }
    }

    pub fn transport(kind: impl Into<String>, latency: Duration) -> Self {
        Self::new(RawStatus::Transport(kind.into()), latency, None)
    }

    pub fn no_data() -> Self {
        Self::new(RawStatus::NoData, Duration::ZERO, None)
    }

    pub fn checks_passed(&self) -> bool {
        self.checks.iter().all(|(_, ok)| *ok)
    }
}
