use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;

use crate::adapter::ProtocolAdapter;
use crate::checks::CheckSet;
use crate::dataset::{Dataset, Sample, worker_rng};
use crate::gate::IterationGate;
use crate::request::{IdStrategy, IterationIds, PaymentRequest};
use crate::{Outcome, RunMetrics};

/// Knobs every worker of one run shares.
#[derive(Debug, Clone, Copy)]
pub struct DriverSettings {
    /// Upper bound on one call, connection setup included.
    pub timeout: Duration,
    /// Delay after every iteration, successful or not.
    pub pacing: Duration,
    pub id_strategy: IdStrategy,
}

/// What one iteration did.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub iteration: u64,
    /// `None` when the dataset had nothing to send.
    pub request_id: Option<String>,
    pub outcome: Outcome,
    pub duration: Duration,
}

impl IterationReport {
    /// The call succeeded and every check passed.
    pub fn passed(&self) -> bool {
        self.outcome.success && self.outcome.checks_passed()
    }
}

/// One sequential request loop with its own RNG and connection.
#[derive(Debug)]
pub struct Worker<A> {
    id: u64,
    dataset: Arc<Dataset>,
    rng: StdRng,
    adapter: A,
    checks: Arc<CheckSet>,
    metrics: Arc<RunMetrics>,
    settings: DriverSettings,
    iteration: u64,
}

impl<A: ProtocolAdapter> Worker<A> {
    pub fn new(
        id: u64,
        seed: u64,
        dataset: Arc<Dataset>,
        adapter: A,
        checks: Arc<CheckSet>,
        metrics: Arc<RunMetrics>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            id,
            dataset,
            rng: worker_rng(seed, id),
            adapter,
            checks,
            metrics,
            settings,
            iteration: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Sample, call, validate and record. Pacing is left to the caller.
    pub async fn run_iteration(&mut self) -> IterationReport {
        let started = Instant::now();
        let iteration = self.iteration;
        self.iteration += 1;

        let request = match self.dataset.sample(&mut self.rng) {
            Sample::Record(record) => PaymentRequest::build(
                record,
                self.settings.id_strategy,
                IterationIds::now(self.id, iteration),
            ),
            Sample::NoData => {
                self.metrics.record_no_data();
                let duration = started.elapsed();
                self.metrics.record_iteration(false, duration);
                return IterationReport {
                    iteration,
                    request_id: None,
                    outcome: Outcome::no_data(),
                    duration,
                };
            }
        };

        let timeout = self.settings.timeout;
        let call_started = Instant::now();
        let mut outcome =
            match tokio::time::timeout(timeout, self.adapter.invoke(&request, timeout)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::debug!(worker = self.id, id = %request.id, "call timed out");
                    Outcome::transport("timeout", call_started.elapsed())
                }
            };

        outcome.checks = self.checks.validate(&outcome);
        self.metrics.record_request(&outcome);
        self.metrics.record_checks(&outcome.checks);

        let duration = started.elapsed();
        let passed = outcome.success && outcome.checks_passed();
        self.metrics.record_iteration(passed, duration);

        IterationReport {
            iteration,
            request_id: Some(request.id),
            outcome,
            duration,
        }
    }

    /// Iterates until the gate closes, pausing between iterations. Returns iterations run.
    pub async fn run(&mut self, gate: &IterationGate) -> u64 {
        let mut done = 0;
        while gate.next() {
            let report = self.run_iteration().await;
            done += 1;
            if !report.passed() {
                tracing::trace!(
                    worker = self.id,
                    iteration = report.iteration,
                    status = %report.outcome.status,
                    "iteration failed"
                );
            }
            gate.pause(self.settings.pacing).await;
        }
        done
    }
}
