use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Barrier, Notify};
use txload_metrics::MetricSeriesSummary;

use crate::adapter::ProtocolAdapter;
use crate::checks::CheckSet;
use crate::dataset::SharedDataset;
use crate::driver::{DriverSettings, Worker};
use crate::gate::IterationGate;
use crate::{Result, RunMetrics};

/// Released once every worker is spawned so they begin together.
#[derive(Debug, Default)]
pub struct StartSignal {
    started: AtomicBool,
    notify: Notify,
}

impl StartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.started.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

/// Shape of the worker pool.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPlan {
    pub workers: u64,
    pub seed: u64,
    pub settings: DriverSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passed: u64,
    pub total: u64,
}

impl CheckSummary {
    pub fn failed(&self) -> u64 {
        self.total.saturating_sub(self.passed)
    }
}

/// Totals collected after every worker stopped.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub elapsed: Duration,
    pub requests_total: u64,
    pub requests_failed: u64,
    pub iterations_total: u64,
    pub data_errors: u64,
    pub checks: Vec<CheckSummary>,
    pub metrics: Vec<MetricSeriesSummary>,
}

impl RunSummary {
    pub fn collect(metrics: &RunMetrics, elapsed: Duration) -> Self {
        Self {
            elapsed,
            requests_total: metrics.requests_total(),
            requests_failed: metrics.requests_failed(),
            iterations_total: metrics.iterations_total(),
            data_errors: metrics.data_errors_total(),
            checks: metrics
                .checks_by_name()
                .into_iter()
                .map(|(name, passed, total)| CheckSummary {
                    name,
                    passed,
                    total,
                })
                .collect(),
            metrics: metrics.registry().summarize(),
        }
    }

    pub fn checks_failed(&self) -> bool {
        self.checks.iter().any(|c| c.failed() > 0)
    }

    pub fn requests_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.requests_total as f64 / secs
        } else {
            0.0
        }
    }
}

/// Runs `plan.workers` workers until `gate` closes.
///
/// Each worker resolves the shared dataset itself and gets its own adapter from
/// `make_adapter`. The first setup error aborts the run.
pub async fn run_workers<A, F>(
    gate: Arc<IterationGate>,
    dataset: SharedDataset,
    checks: Arc<CheckSet>,
    metrics: Arc<RunMetrics>,
    plan: WorkerPlan,
    make_adapter: F,
) -> Result<RunSummary>
where
    A: ProtocolAdapter + Send + 'static,
    F: Fn(u64) -> A,
{
    let worker_count = usize::try_from(plan.workers).unwrap_or(usize::MAX);
    let ready = Arc::new(Barrier::new(worker_count.saturating_add(1)));
    let start = Arc::new(StartSignal::new());
    let mut handles = Vec::with_capacity(worker_count);

    for id in 0..plan.workers {
        let adapter = make_adapter(id);
        let gate = gate.clone();
        let dataset = dataset.clone();
        let checks = checks.clone();
        let metrics = metrics.clone();
        let ready = ready.clone();
        let start = start.clone();

        handles.push(tokio::spawn(async move {
            let resolved = dataset.get().await;
            ready.wait().await;
            let resolved = resolved?;

            start.wait().await;
            let mut worker =
                Worker::new(id, plan.seed, resolved, adapter, checks, metrics, plan.settings);
            let done = worker.run(&gate).await;
            tracing::debug!(worker = id, iterations = done, "worker finished");
            Ok::<_, crate::Error>(done)
        }));
    }

    ready.wait().await;
    let started = Instant::now();
    gate.start_at(started);
    start.start();
    tracing::info!(workers = plan.workers, "workers started");

    let mut first_err = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                gate.stop();
                first_err.get_or_insert(err);
            }
            Err(err) => {
                gate.stop();
                first_err.get_or_insert(err.into());
            }
        }
    }
    if let Some(err) = first_err {
        return Err(err);
    }

    let elapsed = started.elapsed();
    Ok(RunSummary::collect(&metrics, elapsed))
}
