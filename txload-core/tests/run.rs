use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use txload_core::{
    Check, CheckPredicate, CheckSet, ColumnNames, Currency, CurrencyCodeTable, DataConfig,
    DatasetSource, DriverSettings, Error, GrpcAdapter, IdStrategy, NoDataPolicy, Outcome,
    PaymentRequest, Protocol, ProtocolAdapter, RawStatus, RunConfig, RunMetrics, SchemaSource,
    Session, SharedDataset, TargetConfig, ThresholdSet, VecSource, WorkerPlan,
    evaluate_thresholds, run_workers,
};
use txload_grpc::{Code, ProtoSchema};
use txload_metrics::Registry;
use txload_testserver::{
    GrpcBehavior, GrpcTestServer, HttpBehavior, PAYMENTS_DESCRIPTOR_SET, TestServer,
};

const HEADERS: &[&str] = &[
    "id",
    "currency",
    "amount",
    "source_account",
    "destination_account",
];

/// Answers every call with a fixed status and JSON body.
#[derive(Debug, Clone)]
struct FixedAdapter {
    status: RawStatus,
    body: Option<serde_json::Value>,
}

impl FixedAdapter {
    fn http(code: u16) -> Self {
        let status = if (200..300).contains(&code) { "ok" } else { "error" };
        Self {
            status: RawStatus::Http(code),
            body: Some(serde_json::json!({ "status": status })),
        }
    }
}

impl ProtocolAdapter for FixedAdapter {
    fn protocol(&self) -> Protocol {
        match self.status {
            RawStatus::Grpc(_) => Protocol::Grpc,
            _ => Protocol::Http,
        }
    }

    async fn invoke(&mut self, _req: &PaymentRequest, _timeout: Duration) -> Outcome {
        Outcome::new(self.status.clone(), Duration::from_millis(2), self.body.clone())
    }
}

fn one_record_source() -> Arc<dyn DatasetSource> {
    Arc::new(VecSource::new(HEADERS).row(&["T1", "USD", "10.50", "A", "B"]))
}

fn shared(source: Arc<dyn DatasetSource>) -> SharedDataset {
    SharedDataset::new(
        source,
        ColumnNames::default(),
        txload_core::Requirements { id_required: true },
    )
}

fn plan(workers: u64) -> WorkerPlan {
    WorkerPlan {
        workers,
        seed: 42,
        settings: DriverSettings {
            timeout: Duration::from_secs(2),
            pacing: Duration::ZERO,
            id_strategy: IdStrategy::Record,
        },
    }
}

async fn run_fixed(
    adapter: FixedAdapter,
    iterations: u64,
    checks: CheckSet,
) -> anyhow::Result<(Arc<Registry>, txload_core::RunSummary)> {
    let protocol = adapter.protocol();
    let registry = Arc::new(Registry::default());
    let metrics = Arc::new(RunMetrics::register(registry.clone(), protocol)?);
    let gate = Arc::new(txload_core::IterationGate::new(Some(iterations), None));

    let summary = run_workers(
        gate,
        shared(one_record_source()),
        Arc::new(checks),
        metrics,
        plan(4),
        |_| adapter.clone(),
    )
    .await?;
    Ok((registry, summary))
}

#[tokio::test]
async fn always_ok_backend_passes_every_check() -> anyhow::Result<()> {
    let (registry, summary) =
        run_fixed(FixedAdapter::http(200), 1000, CheckSet::http_default()).await?;

    anyhow::ensure!(summary.iterations_total == 1000);
    anyhow::ensure!(summary.requests_total == 1000);
    anyhow::ensure!(summary.requests_failed == 0);
    let status = summary
        .checks
        .iter()
        .find(|c| c.name == "status is 2xx")
        .context("status check missing")?;
    anyhow::ensure!(status.passed == 1000 && status.total == 1000);
    anyhow::ensure!(!summary.checks_failed());

    let violations = evaluate_thresholds(
        &registry,
        &ThresholdSet::defaults(Protocol::Http),
        NoDataPolicy::Fail,
    )?;
    anyhow::ensure!(violations.is_empty(), "violations: {violations:?}");
    Ok(())
}

#[tokio::test]
async fn always_500_backend_fails_rate_threshold() -> anyhow::Result<()> {
    let (registry, summary) =
        run_fixed(FixedAdapter::http(500), 200, CheckSet::http_default()).await?;

    anyhow::ensure!(summary.requests_failed == summary.requests_total);
    anyhow::ensure!(summary.checks_failed());

    let violations = evaluate_thresholds(
        &registry,
        &[ThresholdSet {
            metric: "http_req_failed".to_string(),
            expressions: vec!["rate<0.05".to_string()],
        }],
        NoDataPolicy::Fail,
    )?;
    anyhow::ensure!(violations.len() == 1);
    anyhow::ensure!(violations[0].observed == Some(1.0));
    Ok(())
}

#[tokio::test]
async fn grpc_non_ok_fails_status_check() -> anyhow::Result<()> {
    let adapter = FixedAdapter {
        status: RawStatus::Grpc(Code::Unavailable),
        body: None,
    };
    let (_, summary) = run_fixed(adapter, 10, CheckSet::grpc_default()).await?;

    let status_ok = summary
        .checks
        .iter()
        .find(|c| c.name == "status OK")
        .context("status OK check missing")?;
    anyhow::ensure!(status_ok.passed == 0 && status_ok.total == 10);
    anyhow::ensure!(summary.requests_failed == 10);
    Ok(())
}

fn csv_file(rows: &[&str]) -> anyhow::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile()?;
    writeln!(file, "{}", HEADERS.join(","))?;
    for row in rows {
        writeln!(file, "{row}")?;
    }
    file.flush()?;
    Ok(file)
}

fn config(target: TargetConfig, data: PathBuf, iterations: u64) -> RunConfig {
    let protocol = target.protocol();
    RunConfig {
        target,
        data: DataConfig {
            path: data,
            columns: ColumnNames::default(),
            require_data: true,
        },
        workers: 1,
        iterations: Some(iterations),
        duration: None,
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        pacing: Duration::ZERO,
        thresholds: ThresholdSet::defaults(protocol),
        no_data_policy: NoDataPolicy::Fail,
        id_strategy: protocol.default_id_strategy(),
        seed: 1,
    }
}

#[tokio::test]
async fn http_end_to_end_single_record() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start http server")?;
    let data = csv_file(&["T1,USD,10.50,A,B"])?;
    let cfg = config(
        TargetConfig::Http {
            base_url: server.base_url().to_string(),
            path: "/payments".to_string(),
        },
        data.path().to_path_buf(),
        5,
    );

    let report = Session::prepare(cfg).await?.run().await?;

    anyhow::ensure!(report.summary.requests_total == 5);
    anyhow::ensure!(report.summary.requests_failed == 0);
    anyhow::ensure!(report.passed(), "report: {report:?}");
    anyhow::ensure!(report.dataset.accepted == 1);

    let last = server.stats().last_payment().context("no payment seen")?;
    anyhow::ensure!(last.id == "T1");
    anyhow::ensure!((last.amount - 10.5).abs() < f64::EPSILON);
    anyhow::ensure!(server.stats().json_content_type_total() == 5);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn http_error_body_fails_checks_only() -> anyhow::Result<()> {
    let server = TestServer::start_with(HttpBehavior::OkWithErrorBody, Duration::ZERO)
        .await
        .context("start http server")?;
    let data = csv_file(&["T1,USD,1,A,B"])?;
    let cfg = config(
        TargetConfig::Http {
            base_url: server.base_url().to_string(),
            path: "/payments".to_string(),
        },
        data.path().to_path_buf(),
        3,
    );

    let report = Session::prepare(cfg).await?.run().await?;
    anyhow::ensure!(report.checks_failed());
    anyhow::ensure!(!report.thresholds_failed(), "{:?}", report.violations);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn grpc_end_to_end_uses_fresh_ids() -> anyhow::Result<()> {
    let server = GrpcTestServer::start().await.context("start grpc server")?;
    let data = csv_file(&["T1,IDR,1.000,A,B"])?;
    let cfg = config(
        TargetConfig::Grpc {
            target: server.target(),
            schema: SchemaSource::DescriptorBytes(PAYMENTS_DESCRIPTOR_SET.to_vec()),
            method: "payments.v1.PaymentsService/CreatePayment".to_string(),
        },
        data.path().to_path_buf(),
        4,
    );

    let report = Session::prepare(cfg).await?.run().await?;
    anyhow::ensure!(report.summary.requests_total == 4);
    anyhow::ensure!(report.passed(), "report: {report:?}");

    let last = server.stats().last_request().context("no call seen")?;
    anyhow::ensure!(last.id.starts_with("PAY-"), "id {}", last.id);
    anyhow::ensure!(last.currency == 2);
    anyhow::ensure!(last.amount_minor == 100);
    anyhow::ensure!(server.stats().calls_total() == 4);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn grpc_rejections_fail_checks() -> anyhow::Result<()> {
    let server = GrpcTestServer::start_with(GrpcBehavior::AlwaysStatus(Code::InvalidArgument))
        .await
        .context("start grpc server")?;
    let data = csv_file(&["T1,USD,1,A,B"])?;
    let cfg = config(
        TargetConfig::Grpc {
            target: server.target(),
            schema: SchemaSource::DescriptorBytes(PAYMENTS_DESCRIPTOR_SET.to_vec()),
            method: "payments.v1.PaymentsService/CreatePayment".to_string(),
        },
        data.path().to_path_buf(),
        3,
    );

    let report = Session::prepare(cfg).await?.run().await?;
    anyhow::ensure!(report.summary.requests_failed == 3);
    anyhow::ensure!(report.checks_failed() && report.thresholds_failed());

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unreachable_grpc_target_counts_connect_failures() -> anyhow::Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let target = listener.local_addr()?.to_string();
    drop(listener);

    let data = csv_file(&["T1,USD,1,A,B"])?;
    let cfg = config(
        TargetConfig::Grpc {
            target,
            schema: SchemaSource::DescriptorBytes(PAYMENTS_DESCRIPTOR_SET.to_vec()),
            method: "payments.v1.PaymentsService/CreatePayment".to_string(),
        },
        data.path().to_path_buf(),
        3,
    );

    let report = Session::prepare(cfg).await?.run().await?;
    anyhow::ensure!(report.summary.requests_failed == 3);
    let statuses: Vec<_> = report
        .summary
        .metrics
        .iter()
        .filter(|m| m.name == "grpc_reqs")
        .flat_map(|m| m.tags.iter().map(|(_, v)| v.clone()))
        .collect();
    anyhow::ensure!(statuses == ["transport_connect"], "statuses {statuses:?}");
    Ok(())
}

fn payment() -> PaymentRequest {
    PaymentRequest {
        id: "PAY-1".to_string(),
        currency: Currency::from_code("USD"),
        amount_minor: 1050,
        source_account: "A".to_string(),
        destination_account: "B".to_string(),
    }
}

fn grpc_adapter(target: String) -> anyhow::Result<GrpcAdapter> {
    let schema = ProtoSchema::from_descriptor_set_bytes(PAYMENTS_DESCRIPTOR_SET)?;
    let method = schema.method("payments.v1.PaymentsService/CreatePayment")?;
    Ok(GrpcAdapter::new(
        target,
        Arc::new(method),
        Arc::new(CurrencyCodeTable::default()),
        Duration::from_secs(1),
    ))
}

#[tokio::test]
async fn grpc_adapter_reconnects_after_failed_connect() -> anyhow::Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let mut adapter = grpc_adapter(addr.to_string())?;
    let timeout = Duration::from_secs(2);

    let outcome = adapter.invoke(&payment(), timeout).await;
    anyhow::ensure!(
        outcome.status == RawStatus::Transport("connect".to_string()),
        "status {}",
        outcome.status
    );
    anyhow::ensure!(!adapter.is_connected());

    let server = GrpcTestServer::start_on(addr, GrpcBehavior::AlwaysOk)
        .await
        .context("bind grpc server on the freed port")?;

    let outcome = adapter.invoke(&payment(), timeout).await;
    anyhow::ensure!(outcome.status == RawStatus::Grpc(Code::Ok), "status {}", outcome.status);
    anyhow::ensure!(
        outcome.body == Some(serde_json::json!({ "payment_id": "pay_1" })),
        "body {:?}",
        outcome.body
    );
    anyhow::ensure!(adapter.is_connected());

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn grpc_adapter_drops_channel_on_unavailable_only() -> anyhow::Result<()> {
    let unavailable = GrpcTestServer::start_with(GrpcBehavior::AlwaysStatus(Code::Unavailable))
        .await
        .context("start grpc server")?;
    let mut adapter = grpc_adapter(unavailable.target())?;
    let timeout = Duration::from_secs(2);

    for _ in 0..2 {
        let outcome = adapter.invoke(&payment(), timeout).await;
        anyhow::ensure!(outcome.status == RawStatus::Grpc(Code::Unavailable));
        anyhow::ensure!(!adapter.is_connected());
    }
    anyhow::ensure!(unavailable.stats().calls_total() == 2);
    unavailable.shutdown().await;

    let rejecting = GrpcTestServer::start_with(GrpcBehavior::AlwaysStatus(Code::InvalidArgument))
        .await
        .context("start grpc server")?;
    let mut adapter = grpc_adapter(rejecting.target())?;
    let outcome = adapter.invoke(&payment(), timeout).await;
    anyhow::ensure!(outcome.status == RawStatus::Grpc(Code::InvalidArgument));
    anyhow::ensure!(adapter.is_connected());

    rejecting.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn custom_checks_count_server_errors_as_passing() -> anyhow::Result<()> {
    let server = TestServer::start_with(HttpBehavior::AlwaysStatus(500), Duration::ZERO)
        .await
        .context("start test server")?;
    let data = csv_file(&["T1,USD,1,A,B"])?;
    let cfg = config(
        TargetConfig::Http {
            base_url: server.base_url().to_string(),
            path: "/payments".to_string(),
        },
        data.path().to_path_buf(),
        4,
    );
    let checks = CheckSet::new(vec![Check::new(
        "payments 2xx/5xx",
        CheckPredicate::StatusIn(vec![200, 500]),
    )]);

    let report = Session::prepare(cfg).await?.with_checks(checks).run().await?;
    anyhow::ensure!(!report.checks_failed(), "checks {:?}", report.summary.checks);
    anyhow::ensure!(report.summary.requests_failed == 4);
    anyhow::ensure!(report.thresholds_failed());

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn empty_dataset_is_rejected_when_data_is_required() -> anyhow::Result<()> {
    let data = csv_file(&["T1,USD,,A,B", "T2,USD,abc,A,B"])?;
    let cfg = config(
        TargetConfig::Http {
            base_url: "http://127.0.0.1:9".to_string(),
            path: "/payments".to_string(),
        },
        data.path().to_path_buf(),
        1,
    );

    match Session::prepare(cfg).await {
        Err(Error::EmptyDataset {
            rows_total,
            rows_rejected,
        }) => {
            anyhow::ensure!(rows_total == 2 && rows_rejected == 2);
        }
        other => anyhow::bail!("unexpected: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn empty_dataset_records_data_errors_when_allowed() -> anyhow::Result<()> {
    let data = csv_file(&[])?;
    let mut cfg = config(
        TargetConfig::Http {
            base_url: "http://127.0.0.1:9".to_string(),
            path: "/payments".to_string(),
        },
        data.path().to_path_buf(),
        3,
    );
    cfg.data.require_data = false;

    let report = Session::prepare(cfg).await?.run().await?;
    anyhow::ensure!(report.summary.data_errors == 3);
    anyhow::ensure!(report.summary.requests_total == 0);
    // Request metrics never saw a sample, so both default thresholds fail.
    anyhow::ensure!(report.violations.len() == 2);
    anyhow::ensure!(report.violations.iter().all(|v| v.observed.is_none()));
    Ok(())
}

#[tokio::test]
async fn invalid_config_fails_before_reading_data() -> anyhow::Result<()> {
    let cfg = config(
        TargetConfig::Http {
            base_url: "localhost:8081".to_string(),
            path: "/payments".to_string(),
        },
        PathBuf::from("does/not/exist.csv"),
        1,
    );

    let err = Session::prepare(cfg).await.err().context("expected error")?;
    anyhow::ensure!(matches!(err, Error::Config(_)), "got {err}");
    anyhow::ensure!(err.is_invalid_input());
    Ok(())
}

#[tokio::test]
async fn stop_ends_a_duration_run_early() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start http server")?;
    let data = csv_file(&["T1,USD,1,A,B"])?;
    let mut cfg = config(
        TargetConfig::Http {
            base_url: server.base_url().to_string(),
            path: "/payments".to_string(),
        },
        data.path().to_path_buf(),
        1,
    );
    cfg.iterations = None;
    cfg.duration = Some(Duration::from_secs(60));
    cfg.pacing = Duration::from_secs(1);

    let session = Session::prepare(cfg).await?;
    let gate = session.gate();
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        gate.stop();
    });

    let report = tokio::time::timeout(Duration::from_secs(10), session.run())
        .await
        .context("run did not stop")??;
    stopper.await?;
    anyhow::ensure!(report.summary.iterations_total >= 1);
    anyhow::ensure!(report.summary.elapsed < Duration::from_secs(10));

    server.shutdown().await;
    Ok(())
}
