use std::path::PathBuf;
use std::time::Duration;

use crate::record::ColumnNames;
use crate::thresholds::{ThresholdSet, parse_threshold_expr};
use crate::{IdStrategy, NoDataPolicy, Protocol, RunMetrics};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("dataset is missing required column `{column}`")]
    MissingColumn { column: String },

    #[error("`workers` must be a positive integer")]
    InvalidWorkers,

    #[error("`iterations` must be a positive integer")]
    InvalidIterations,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`timeout` must be a positive duration")]
    InvalidTimeout,

    #[error("invalid base url `{0}` (expected http://host[:port])")]
    InvalidBaseUrl(String),

    #[error("invalid request path `{0}` (must start with `/`)")]
    InvalidPath(String),

    #[error("gRPC target must not be empty")]
    EmptyGrpcTarget,

    #[error("invalid gRPC method `{0}` (expected `pkg.Service/Method`)")]
    InvalidMethod(String),

    #[error("threshold references unknown metric `{0}`")]
    UnknownThresholdMetric(String),

    #[error("invalid threshold for metric `{metric}`: {error}")]
    InvalidThreshold { metric: String, error: String },
}

/// Where the gRPC method descriptors come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// Compiled with `protoc` at startup.
    Proto {
        path: PathBuf,
        includes: Vec<PathBuf>,
    },
    /// A serialized `FileDescriptorSet`.
    DescriptorSet(PathBuf),
    /// Already-loaded `FileDescriptorSet` bytes.
    DescriptorBytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetConfig {
    Http {
        base_url: String,
        path: String,
    },
    Grpc {
        target: String,
        schema: SchemaSource,
        method: String,
    },
}

impl TargetConfig {
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Http { .. } => Protocol::Http,
            Self::Grpc { .. } => Protocol::Grpc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataConfig {
    pub path: PathBuf,
    pub columns: ColumnNames,
    /// Fail at startup instead of running with an empty dataset.
    pub require_data: bool,
}

/// Everything one run needs, validated once before any worker starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub target: TargetConfig,
    pub data: DataConfig,
    pub workers: u64,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    /// Per-call timeout.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pacing: Duration,
    pub thresholds: Vec<ThresholdSet>,
    pub no_data_policy: NoDataPolicy,
    pub id_strategy: IdStrategy,
    pub seed: u64,
}

impl RunConfig {
    pub fn protocol(&self) -> Protocol {
        self.target.protocol()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers);
        }
        if self.iterations == Some(0) {
            return Err(ConfigError::InvalidIterations);
        }
        if self.duration.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidDuration);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }

        match &self.target {
            TargetConfig::Http { base_url, path } => {
                let parsed = url::Url::parse(base_url)
                    .map_err(|_| ConfigError::InvalidBaseUrl(base_url.clone()))?;
                let plain = parsed.scheme() == "http"
                    && parsed.host_str().is_some_and(|h| !h.is_empty())
                    && parsed.query().is_none()
                    && parsed.fragment().is_none();
                if !plain {
                    return Err(ConfigError::InvalidBaseUrl(base_url.clone()));
                }
                if !path.starts_with('/') {
                    return Err(ConfigError::InvalidPath(path.clone()));
                }
            }
            TargetConfig::Grpc { target, method, .. } => {
                if target.trim().is_empty() {
                    return Err(ConfigError::EmptyGrpcTarget);
                }
                let valid = method
                    .trim_start_matches('/')
                    .split_once('/')
                    .is_some_and(|(svc, m)| !svc.is_empty() && !m.is_empty() && !m.contains('/'));
                if !valid {
                    return Err(ConfigError::InvalidMethod(method.clone()));
                }
            }
        }

        let known = RunMetrics::metric_names(self.protocol());
        for set in &self.thresholds {
            if !known.contains(&set.metric.as_str()) {
                return Err(ConfigError::UnknownThresholdMetric(set.metric.clone()));
            }
            for expr in &set.expressions {
                parse_threshold_expr(expr).map_err(|error| ConfigError::InvalidThreshold {
                    metric: set.metric.clone(),
                    error,
                })?;
            }
        }

        Ok(())
    }

    /// Full URL the HTTP adapter posts to.
    pub fn http_url(&self) -> Option<String> {
        match &self.target {
            TargetConfig::Http { base_url, path } => {
                Some(format!("{}{path}", base_url.trim_end_matches('/')))
            }
            TargetConfig::Grpc { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_config() -> RunConfig {
        RunConfig {
            target: TargetConfig::Http {
                base_url: "http://localhost:8081/".to_string(),
                path: "/payments".to_string(),
            },
            data: DataConfig {
                path: PathBuf::from("data/transactions.csv"),
                columns: ColumnNames::default(),
                require_data: false,
            },
            workers: 1,
            iterations: Some(1),
            duration: None,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
            pacing: Duration::ZERO,
            thresholds: ThresholdSet::defaults(Protocol::Http),
            no_data_policy: NoDataPolicy::Fail,
            id_strategy: IdStrategy::Record,
            seed: 7,
        }
    }

    #[test]
    fn defaults_validate() {
        let cfg = http_config();
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(
            cfg.http_url().as_deref(),
            Some("http://localhost:8081/payments")
        );
    }

    #[test]
    fn shape_errors_are_reported() {
        let mut cfg = http_config();
        cfg.workers = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidWorkers));

        let mut cfg = http_config();
        cfg.iterations = Some(0);
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidIterations));

        let mut cfg = http_config();
        cfg.target = TargetConfig::Http {
            base_url: "https://example.com".to_string(),
            path: "/payments".to_string(),
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidBaseUrl(_))));
    }

    #[test]
    fn base_url_must_be_a_plain_http_url() {
        let with_base = |base_url: &str| {
            let mut cfg = http_config();
            cfg.target = TargetConfig::Http {
                base_url: base_url.to_string(),
                path: "/payments".to_string(),
            };
            cfg.validate()
        };

        assert_eq!(with_base("http://127.0.0.1:8081"), Ok(()));
        assert_eq!(with_base("http://payments.internal/api/"), Ok(()));
        for bad in [
            "http://",
            "http://bad host:80",
            "http://localhost:99999",
            "localhost:8081",
            "ftp://localhost",
            "http://localhost/?a=1",
        ] {
            assert_eq!(
                with_base(bad),
                Err(ConfigError::InvalidBaseUrl(bad.to_string())),
                "{bad}"
            );
        }
    }

    #[test]
    fn thresholds_must_name_protocol_metrics() {
        let mut cfg = http_config();
        cfg.thresholds = vec![ThresholdSet {
            metric: "grpc_req_duration".to_string(),
            expressions: vec!["p(95)<500".to_string()],
        }];
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::UnknownThresholdMetric(
                "grpc_req_duration".to_string()
            ))
        );

        cfg.thresholds = vec![ThresholdSet {
            metric: "http_req_duration".to_string(),
            expressions: vec!["p95<500".to_string()],
        }];
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn grpc_method_needs_service_and_name() {
        let mut cfg = http_config();
        cfg.target = TargetConfig::Grpc {
            target: "localhost:9091".to_string(),
            schema: SchemaSource::DescriptorBytes(Vec::new()),
            method: "CreatePayment".to_string(),
        };
        cfg.thresholds = Vec::new();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidMethod(_))));
    }
}
