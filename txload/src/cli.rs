use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use txload_core::{Check, IdStrategy, NoDataPolicy, Protocol};

fn parse_duration(input: &str) -> Result<Duration, String> {
    let d = humantime::parse_duration(input.trim())
        .map_err(|e| format!("invalid duration '{input}' ({e}; expected e.g. 10s, 250ms, 1m)"))?;
    Ok(d)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain-text summary.
    Human,
    /// One JSON summary line on stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "txload",
    version,
    about = "Dataset-driven load generator for payment APIs over HTTP and gRPC",
    long_about = "txload replays payment records from a CSV dataset against an HTTP or gRPC payments service from many concurrent workers, validates each response with checks and evaluates k6-style thresholds once the run ends.\n\nEvery `run` flag can also be set through the environment variable shown in its help.",
    after_help = "Examples:\n  txload run --data data/transactions.csv --workers 20 --duration 30s\n  txload run --protocol grpc --proto proto/payments/v1/payments.proto --iterations 1000\n  txload run --threshold 'http_req_duration: p(99)<800' --output json\n  txload inspect --data data/transactions.csv"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test against the payments target
    Run(Box<RunArgs>),

    /// Load a dataset and report what the normalizer accepts
    Inspect(InspectArgs),
}

/// Header names of the dataset columns.
#[derive(Debug, Clone, Args)]
pub struct ColumnArgs {
    #[arg(long = "column-id", env = "TXLOAD_COLUMN_ID", default_value = "id")]
    pub id: String,

    #[arg(long = "column-currency", env = "TXLOAD_COLUMN_CURRENCY", default_value = "currency")]
    pub currency: String,

    #[arg(long = "column-amount", env = "TXLOAD_COLUMN_AMOUNT", default_value = "amount")]
    pub amount: String,

    #[arg(
        long = "column-source",
        env = "TXLOAD_COLUMN_SOURCE",
        default_value = "source_account"
    )]
    pub source_account: String,

    #[arg(
        long = "column-destination",
        env = "TXLOAD_COLUMN_DESTINATION",
        default_value = "destination_account"
    )]
    pub destination_account: String,
}

impl From<&ColumnArgs> for txload_core::ColumnNames {
    fn from(c: &ColumnArgs) -> Self {
        Self {
            id: c.id.clone(),
            currency: c.currency.clone(),
            amount: c.amount.clone(),
            source_account: c.source_account.clone(),
            destination_account: c.destination_account.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// CSV dataset to load
    #[arg(long, env = "TXLOAD_DATA", default_value = "data/transactions.csv")]
    pub data: PathBuf,

    /// Reject rows without an id, as HTTP runs with record ids do
    #[arg(long)]
    pub require_id: bool,

    #[command(flatten)]
    pub columns: ColumnArgs,

    /// Output format
    #[arg(long, value_enum, env = "TXLOAD_OUTPUT", default_value_t = OutputFormat::Human)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Wire protocol (http or grpc)
    #[arg(long, env = "TXLOAD_PROTOCOL", default_value = "http")]
    pub protocol: Protocol,

    /// Base URL of the HTTP payments service
    #[arg(long, env = "TXLOAD_BASE_URL", default_value = "http://localhost:8081")]
    pub base_url: String,

    /// Request path appended to the base URL
    #[arg(long, env = "TXLOAD_HTTP_PATH", default_value = "/payments")]
    pub path: String,

    /// gRPC server as host:port (plaintext)
    #[arg(long, env = "TXLOAD_GRPC_TARGET", default_value = "localhost:9091")]
    pub grpc_target: String,

    /// .proto file compiled with protoc at startup
    #[arg(long, env = "TXLOAD_PROTO", conflicts_with = "descriptor_set")]
    pub proto: Option<PathBuf>,

    /// Precompiled FileDescriptorSet
    #[arg(long, env = "TXLOAD_DESCRIPTOR_SET")]
    pub descriptor_set: Option<PathBuf>,

    /// Extra protoc include path (repeatable)
    #[arg(long = "include", value_name = "DIR")]
    pub includes: Vec<PathBuf>,

    /// Fully-qualified unary method (`pkg.Service/Method`)
    #[arg(
        long,
        env = "TXLOAD_GRPC_METHOD",
        default_value = "payments.v1.PaymentsService/CreatePayment"
    )]
    pub method: String,

    /// CSV dataset
    #[arg(long, env = "TXLOAD_DATA", default_value = "data/transactions.csv")]
    pub data: PathBuf,

    #[command(flatten)]
    pub columns: ColumnArgs,

    /// Fail at startup when no dataset row is usable
    #[arg(long, env = "TXLOAD_REQUIRE_DATA")]
    pub require_data: bool,

    /// Number of concurrent workers
    #[arg(long, env = "TXLOAD_WORKERS", default_value_t = 10)]
    pub workers: u64,

    /// Total iterations shared by all workers
    #[arg(long, env = "TXLOAD_ITERATIONS")]
    pub iterations: Option<u64>,

    /// Run duration (default 1m unless --iterations is given)
    #[arg(long, env = "TXLOAD_DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Per-call timeout
    #[arg(long, env = "TXLOAD_TIMEOUT", value_parser = parse_duration, default_value = "10s")]
    pub timeout: Duration,

    /// Connection establishment timeout
    #[arg(
        long,
        env = "TXLOAD_CONNECT_TIMEOUT",
        value_parser = parse_duration,
        default_value = "30s"
    )]
    pub connect_timeout: Duration,

    /// Delay between iterations of a worker (default 1s for http, 50ms for grpc)
    #[arg(long, env = "TXLOAD_PACING", value_parser = parse_duration)]
    pub pacing: Option<Duration>,

    /// `metric: expr[, expr]` (repeatable or `;`-separated). Replaces the defaults.
    #[arg(long = "threshold", env = "TXLOAD_THRESHOLDS", value_name = "METRIC: EXPR")]
    pub thresholds: Vec<String>,

    /// `name=predicate` (repeatable or `;`-separated). Replaces the default checks.
    ///
    /// Predicates: status_success, has_field(path), field_not_equal(path, value),
    /// status_in(code, ...).
    #[arg(
        long = "check",
        env = "TXLOAD_CHECKS",
        value_name = "NAME=PREDICATE",
        value_delimiter = ';'
    )]
    pub checks: Vec<Check>,

    /// What a threshold does when its metric has no samples (fail or pass)
    #[arg(long, env = "TXLOAD_NO_DATA_POLICY", default_value = "fail")]
    pub no_data_policy: NoDataPolicy,

    /// Payment id source (fresh or record; default record for http, fresh for grpc)
    #[arg(long, env = "TXLOAD_ID_STRATEGY")]
    pub id_strategy: Option<IdStrategy>,

    /// RNG seed for record sampling (random when unset)
    #[arg(long, env = "TXLOAD_SEED")]
    pub seed: Option<u64>,

    /// Output format
    #[arg(long, value_enum, env = "TXLOAD_OUTPUT", default_value_t = OutputFormat::Human)]
    pub output: OutputFormat,
}
