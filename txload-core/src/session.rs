use std::sync::Arc;

use txload_grpc::{GrpcMethod, ProtoSchema};
use txload_metrics::Registry;

use crate::adapter::{AnyAdapter, GrpcAdapter, HttpAdapter};
use crate::checks::CheckSet;
use crate::config::{RunConfig, SchemaSource, TargetConfig};
use crate::dataset::{CsvFileSource, DatasetSource, SharedDataset};
use crate::driver::DriverSettings;
use crate::gate::IterationGate;
use crate::record::Requirements;
use crate::runner::{RunSummary, WorkerPlan, run_workers};
use crate::thresholds_eval::{ThresholdViolation, evaluate_thresholds};
use crate::{CurrencyCodeTable, Error, IdStrategy, Protocol, Result, RunMetrics};

/// Dataset numbers reported alongside the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetStats {
    pub rows_total: u64,
    pub rows_rejected: u64,
    pub accepted: u64,
}

/// Final result of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub protocol: Protocol,
    pub dataset: DatasetStats,
    pub summary: RunSummary,
    pub violations: Vec<ThresholdViolation>,
}

impl RunReport {
    pub fn checks_failed(&self) -> bool {
        self.summary.checks_failed()
    }

    pub fn thresholds_failed(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn passed(&self) -> bool {
        !self.checks_failed() && !self.thresholds_failed()
    }
}

enum Target {
    Http { url: Arc<str> },
    Grpc { target: Arc<str>, method: Arc<GrpcMethod> },
}

/// A validated run with its dataset loaded and schema bound, ready to start.
pub struct Session {
    cfg: RunConfig,
    dataset: SharedDataset,
    stats: DatasetStats,
    target: Target,
    checks: Arc<CheckSet>,
    currencies: Arc<CurrencyCodeTable>,
    gate: Arc<IterationGate>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("protocol", &self.cfg.protocol())
            .field("workers", &self.cfg.workers)
            .field("dataset", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Reads the dataset from the configured CSV file.
    pub async fn prepare(cfg: RunConfig) -> Result<Self> {
        let source = Arc::new(CsvFileSource::new(cfg.data.path.clone()));
        Self::with_source(cfg, source).await
    }

    /// Validates `cfg`, builds the dataset once and binds the gRPC method. Every error here
    /// is a setup error; nothing has been sent yet.
    pub async fn with_source(cfg: RunConfig, source: Arc<dyn DatasetSource>) -> Result<Self> {
        cfg.validate()?;

        let requirements = Requirements {
            id_required: cfg.id_strategy == IdStrategy::Record,
        };
        let dataset = SharedDataset::new(source, cfg.data.columns.clone(), requirements);
        let loaded = dataset.get().await?;
        let stats = DatasetStats {
            rows_total: loaded.rows_total(),
            rows_rejected: loaded.rows_rejected(),
            accepted: loaded.len() as u64,
        };
        if loaded.is_empty() {
            if cfg.data.require_data {
                return Err(Error::EmptyDataset {
                    rows_total: stats.rows_total,
                    rows_rejected: stats.rows_rejected,
                });
            }
            tracing::warn!(
                rows_total = stats.rows_total,
                "dataset is empty; every iteration will record a data error"
            );
        }
        for (reason, count) in loaded.rejections() {
            tracing::info!(reason = reason.as_ref(), count, "rows rejected");
        }

        let target = match &cfg.target {
            TargetConfig::Http { .. } => Target::Http {
                url: cfg.http_url().unwrap_or_default().into(),
            },
            TargetConfig::Grpc {
                target,
                schema,
                method,
            } => {
                let schema = match schema {
                    SchemaSource::Proto { path, includes } => ProtoSchema::load(path, includes)?,
                    SchemaSource::DescriptorSet(path) => ProtoSchema::load(path, &[])?,
                    SchemaSource::DescriptorBytes(bytes) => {
                        ProtoSchema::from_descriptor_set_bytes(bytes)?
                    }
                };
                let method = schema.method(method)?;
                tracing::debug!(method = %method.full_name(), "grpc method bound");
                Target::Grpc {
                    target: target.as_str().into(),
                    method: Arc::new(method),
                }
            }
        };

        let gate = Arc::new(IterationGate::new(cfg.iterations, cfg.duration));

        Ok(Self {
            checks: Arc::new(CheckSet::default_for(cfg.protocol())),
            currencies: Arc::new(CurrencyCodeTable::default()),
            cfg,
            dataset,
            stats,
            target,
            gate,
        })
    }

    pub fn dataset_stats(&self) -> DatasetStats {
        self.stats
    }

    /// Closing this gate stops the run early; in-flight calls finish within their timeout.
    pub fn gate(&self) -> Arc<IterationGate> {
        self.gate.clone()
    }

    /// Replaces the default check set of the protocol.
    pub fn with_checks(mut self, checks: CheckSet) -> Self {
        self.checks = Arc::new(checks);
        self
    }

    pub async fn run(self) -> Result<RunReport> {
        let protocol = self.cfg.protocol();
        let registry = Arc::new(Registry::default());
        let metrics = Arc::new(RunMetrics::register(registry.clone(), protocol)?);

        let plan = WorkerPlan {
            workers: self.cfg.workers,
            seed: self.cfg.seed,
            settings: DriverSettings {
                timeout: self.cfg.timeout,
                pacing: self.cfg.pacing,
                id_strategy: self.cfg.id_strategy,
            },
        };
        let connect_timeout = self.cfg.connect_timeout;
        let currencies = self.currencies.clone();

        let summary = match &self.target {
            Target::Http { url } => {
                tracing::info!(%url, workers = plan.workers, "starting http run");
                run_workers(
                    self.gate.clone(),
                    self.dataset.clone(),
                    self.checks.clone(),
                    metrics.clone(),
                    plan,
                    |_| AnyAdapter::Http(HttpAdapter::new(url.clone(), connect_timeout)),
                )
                .await?
            }
            Target::Grpc { target, method } => {
                tracing::info!(%target, workers = plan.workers, "starting grpc run");
                run_workers(
                    self.gate.clone(),
                    self.dataset.clone(),
                    self.checks.clone(),
                    metrics.clone(),
                    plan,
                    |_| {
                        AnyAdapter::Grpc(GrpcAdapter::new(
                            target.clone(),
                            method.clone(),
                            currencies.clone(),
                            connect_timeout,
                        ))
                    },
                )
                .await?
            }
        };

        let violations =
            evaluate_thresholds(&registry, &self.cfg.thresholds, self.cfg.no_data_policy)?;
        tracing::info!(
            requests = summary.requests_total,
            failed = summary.requests_failed,
            violations = violations.len(),
            "run finished"
        );

        Ok(RunReport {
            protocol,
            dataset: self.stats,
            summary,
            violations,
        })
    }
}

/// Validates, prepares and runs `cfg` to completion.
pub async fn run_session(cfg: RunConfig) -> Result<RunReport> {
    Session::prepare(cfg).await?.run().await
}
