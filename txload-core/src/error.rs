use crate::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read dataset: {0}")]
    Dataset(#[from] csv::Error),

    #[error("dataset has no usable rows ({rows_total} read, {rows_rejected} rejected)")]
    EmptyDataset { rows_total: u64, rows_rejected: u64 },

    #[error("failed to load protobuf schema: {0}")]
    Schema(#[from] txload_grpc::ProtoError),

    #[error(transparent)]
    Metrics(#[from] txload_metrics::Error),

    #[error("invalid threshold expression for metric `{metric}`: {error}")]
    InvalidThreshold { metric: String, error: String },

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether the failure traces back to flags, the dataset or the schema rather than the
    /// run itself.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Dataset(_)
                | Self::EmptyDataset { .. }
                | Self::Schema(_)
                | Self::InvalidThreshold { .. }
        )
    }
}
