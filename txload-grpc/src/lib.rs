#![forbid(unsafe_code)]

mod client;
mod codec;
mod convert;
mod error;
mod proto;
mod types;

pub use client::GrpcClient;
pub use convert::{ConvertError, json_to_message, message_to_json};
pub use error::{Error, GrpcTransportErrorKind, Result};
pub use proto::{Error as ProtoError, GrpcMethod, ProtoSchema};
pub use types::{ConnectOptions, InvokeOptions, UnaryResult};

pub use prost_reflect::DynamicMessage;
pub use tonic::Code;
