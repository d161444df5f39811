use std::collections::HashSet;
use std::path::{Path, PathBuf};

use prost::Message as _;
use prost_reflect::{DescriptorPool, MessageDescriptor, MethodDescriptor};
use tonic::codegen::http::uri::PathAndQuery;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to locate protoc binary: {0}")]
    ProtocBin(String),

    #[error("failed to run protoc: {0}")]
    ProtocIo(#[from] std::io::Error),

    #[error("protoc failed (exit={exit}): {stderr}")]
    ProtocFailed { exit: i32, stderr: String },

    #[error("failed to build descriptor pool: {0}")]
    DescriptorPool(#[from] prost_reflect::DescriptorError),

    #[error("failed to decode FileDescriptorSet: {0}")]
    DescriptorDecode(#[from] prost::DecodeError),

    #[error("invalid full method name (expected 'pkg.Service/Method'): {0}")]
    InvalidFullMethod(String),

    #[error("service not found in descriptors: {0}")]
    ServiceNotFound(String),

    #[error("method not found in service '{service}': {method}")]
    MethodNotFound { service: String, method: String },

    #[error("method is streaming, only unary calls are supported: {0}")]
    NotUnary(String),
}

/// Descriptor pool loaded once at startup.
#[derive(Debug, Clone)]
pub struct ProtoSchema {
    pool: DescriptorPool,
}

/// A resolved unary method and its HTTP/2 request path.
#[derive(Debug, Clone)]
pub struct GrpcMethod {
    method: MethodDescriptor,
    path: PathAndQuery,
}

impl GrpcMethod {
    /// `pkg.Service/Method`.
    pub fn full_name(&self) -> String {
        format!(
            "{}/{}",
            self.method.parent_service().full_name(),
            self.method.name()
        )
    }

    pub fn input(&self) -> MessageDescriptor {
        self.method.input()
    }

    pub fn output(&self) -> MessageDescriptor {
        self.method.output()
    }

    pub(crate) fn path(&self) -> PathAndQuery {
        self.path.clone()
    }
}

impl ProtoSchema {
    fn resolve_protoc() -> Result<std::ffi::OsString> {
        if let Some(p) = std::env::var_os("PROTOC").filter(|v| !v.is_empty()) {
            return Ok(p);
        }

        let runnable = std::process::Command::new("protoc")
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success());
        if runnable {
            return Ok(std::ffi::OsString::from("protoc"));
        }

        Err(Error::ProtocBin(
            "no runnable protoc found; install protoc, set PROTOC=/path/to/protoc, or pass a precompiled descriptor set"
                .to_string(),
        ))
    }

    /// `.proto` files are compiled with `protoc`; anything else is read as a serialized
    /// `FileDescriptorSet`.
    pub fn load(path: &Path, include_paths: &[PathBuf]) -> Result<Self> {
        if path.extension().and_then(|e| e.to_str()) == Some("proto") {
            Self::compile_from_proto(path, include_paths)
        } else {
            let bytes = std::fs::read(path)?;
            Self::from_descriptor_set_bytes(&bytes)
        }
    }

    pub fn from_descriptor_set_bytes(bytes: &[u8]) -> Result<Self> {
        let fds = prost_types::FileDescriptorSet::decode(bytes)?;
        let pool = DescriptorPool::from_file_descriptor_set(fds)?;
        Ok(Self { pool })
    }

    pub fn compile_from_proto(proto_file: &Path, include_paths: &[PathBuf]) -> Result<Self> {
        let mut include_paths: Vec<PathBuf> = include_paths.to_vec();
        if let Some(dir) = proto_file.parent() {
            include_paths.push(dir.to_path_buf());
        }

        let mut seen: HashSet<PathBuf> = HashSet::new();
        include_paths.retain(|p| seen.insert(p.clone()));

        let protoc = Self::resolve_protoc()?;
        let out = tempfile::NamedTempFile::new()?;

        let mut cmd = std::process::Command::new(protoc);
        cmd.arg("--include_imports")
            .arg(format!("--descriptor_set_out={}", out.path().display()));
        for p in &include_paths {
            cmd.arg("-I").arg(p);
        }
        cmd.arg(proto_file);

        let output = cmd.output()?;
        if !output.status.success() {
            return Err(Error::ProtocFailed {
                exit: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let bytes = std::fs::read(out.path())?;
        Self::from_descriptor_set_bytes(&bytes)
    }

    pub fn method(&self, full_method: &str) -> Result<GrpcMethod> {
        let (service_name, method_name) = full_method
            .trim_start_matches('/')
            .split_once('/')
            .ok_or_else(|| Error::InvalidFullMethod(full_method.to_string()))?;

        let service = self
            .pool
            .get_service_by_name(service_name)
            .ok_or_else(|| Error::ServiceNotFound(service_name.to_string()))?;

        let method = service
            .methods()
            .find(|m| m.name() == method_name)
            .ok_or_else(|| Error::MethodNotFound {
                service: service_name.to_string(),
                method: method_name.to_string(),
            })?;

        if method.is_client_streaming() || method.is_server_streaming() {
            return Err(Error::NotUnary(full_method.to_string()));
        }

        let path = PathAndQuery::try_from(format!("/{service_name}/{method_name}"))
            .map_err(|_| Error::InvalidFullMethod(full_method.to_string()))?;

        Ok(GrpcMethod { method, path })
    }
}
