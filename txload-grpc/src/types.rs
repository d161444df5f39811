use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub timeout: Option<Duration>,
}

/// Outcome of one unary call. A non-OK status is a result, not an error.
#[derive(Debug, Clone)]
pub struct UnaryResult {
    pub ok: bool,
    pub status: tonic::Code,
    pub message: Option<String>,
    /// Response message as JSON, present only on OK.
    pub response: Option<serde_json::Value>,
    pub elapsed: Duration,
}

impl UnaryResult {
    /// Whether the channel that produced this result should be dropped and re-dialed.
    #[must_use]
    pub fn breaks_connection(&self) -> bool {
        matches!(self.status, tonic::Code::Unavailable | tonic::Code::Unknown)
    }
}
