use crate::ConvertError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum GrpcTransportErrorKind {
    InvalidEndpoint,
    Connect,
    Encode,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] tonic::transport::Error),

    #[error("failed to connect: {0}")]
    Connect(#[source] tonic::transport::Error),

    #[error("request message `{actual}` does not match method input `{expected}`")]
    InputMismatch { expected: String, actual: String },

    #[error("failed to encode request: {0}")]
    Encode(#[from] ConvertError),
}

impl Error {
    #[must_use]
    pub fn transport_error_kind(&self) -> GrpcTransportErrorKind {
        match self {
            Self::InvalidEndpoint(_) => GrpcTransportErrorKind::InvalidEndpoint,
            Self::Connect(_) => GrpcTransportErrorKind::Connect,
            Self::InputMismatch { .. } | Self::Encode(_) => GrpcTransportErrorKind::Encode,
        }
    }
}
