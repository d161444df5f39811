#![forbid(unsafe_code)]

mod adapter;
mod checks;
mod config;
mod connection;
mod currency;
mod dataset;
mod driver;
mod error;
mod gate;
mod metrics;
mod outcome;
mod record;
mod request;
mod runner;
mod session;
mod thresholds;
mod thresholds_eval;

pub use adapter::{AnyAdapter, GrpcAdapter, HttpAdapter, ProtocolAdapter};
pub use checks::{Check, CheckPredicate, CheckSet};
pub use config::{ConfigError, DataConfig, RunConfig, SchemaSource, TargetConfig};
pub use connection::ConnectionState;
pub use currency::{Currency, CurrencyCodeTable};
pub use dataset::{
    CsvFileSource, CsvTextSource, Dataset, DatasetSource, RawTable, Sample, SharedDataset,
    VecSource, random_seed, worker_rng,
};
pub use driver::{DriverSettings, IterationReport, Worker};
pub use error::{Error, Result};
pub use gate::IterationGate;
pub use metrics::{Protocol, RunMetrics};
pub use outcome::{Outcome, RawStatus};
pub use record::{
    ColumnIndex, ColumnNames, NormalizedRecord, Rejection, Requirements, normalize,
    parse_amount_minor,
};
pub use request::{HttpPaymentBody, IdStrategy, IterationIds, PaymentRequest};
pub use runner::{CheckSummary, RunSummary, StartSignal, WorkerPlan, run_workers};
pub use session::{DatasetStats, RunReport, Session, run_session};
pub use thresholds::{
    ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdSet, parse_threshold_expr,
    parse_threshold_sets,
};
pub use thresholds_eval::{NoDataPolicy, ThresholdViolation, evaluate_thresholds};
