use std::sync::Arc;
use std::time::Duration;

use txload_metrics::{MetricId, MetricKind, Registry, TagSet};

use crate::{Outcome, Result};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Protocol {
    Http,
    Grpc,
}

impl Protocol {
    /// Delay between iterations of one worker.
    pub fn default_pacing(self) -> Duration {
        match self {
            Self::Http => Duration::from_secs(1),
            Self::Grpc => Duration::from_millis(50),
        }
    }

    pub fn default_id_strategy(self) -> crate::IdStrategy {
        match self {
            Self::Http => crate::IdStrategy::Record,
            Self::Grpc => crate::IdStrategy::Fresh,
        }
    }
}

/// Ids of the k6-style metrics one run records.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    registry: Arc<Registry>,
    protocol: Protocol,
    reqs: MetricId,
    req_duration: MetricId,
    req_failed: MetricId,
    checks: MetricId,
    iterations: MetricId,
    iteration_duration: MetricId,
    iteration_failed: MetricId,
    data_errors: MetricId,
}

impl RunMetrics {
    pub const CHECKS: &'static str = "checks";
    pub const ITERATIONS: &'static str = "iterations";
    pub const ITERATION_DURATION: &'static str = "iteration_duration";
    pub const ITERATION_FAILED: &'static str = "iteration_failed";
    pub const DATA_ERRORS: &'static str = "data_errors";

    pub fn reqs_name(protocol: Protocol) -> &'static str {
        match protocol {
            Protocol::Http => "http_reqs",
            Protocol::Grpc => "grpc_reqs",
        }
    }

    pub fn req_duration_name(protocol: Protocol) -> &'static str {
        match protocol {
            Protocol::Http => "http_req_duration",
            Protocol::Grpc => "grpc_req_duration",
        }
    }

    pub fn req_failed_name(protocol: Protocol) -> &'static str {
        match protocol {
            Protocol::Http => "http_req_failed",
            Protocol::Grpc => "grpc_req_failed",
        }
    }

    /// Every metric a run with `protocol` records.
    pub fn metric_names(protocol: Protocol) -> [&'static str; 8] {
        [
            Self::reqs_name(protocol),
            Self::req_duration_name(protocol),
            Self::req_failed_name(protocol),
            Self::CHECKS,
            Self::ITERATIONS,
            Self::ITERATION_DURATION,
            Self::ITERATION_FAILED,
            Self::DATA_ERRORS,
        ]
    }

    pub fn register(registry: Arc<Registry>, protocol: Protocol) -> Result<Self> {
        Ok(Self {
            reqs: registry.register(Self::reqs_name(protocol), MetricKind::Counter)?,
            req_duration: registry
                .register(Self::req_duration_name(protocol), MetricKind::Trend)?,
            req_failed: registry.register(Self::req_failed_name(protocol), MetricKind::Rate)?,
            checks: registry.register(Self::CHECKS, MetricKind::Rate)?,
            iterations: registry.register(Self::ITERATIONS, MetricKind::Counter)?,
            iteration_duration: registry.register(Self::ITERATION_DURATION, MetricKind::Trend)?,
            iteration_failed: registry.register(Self::ITERATION_FAILED, MetricKind::Rate)?,
            data_errors: registry.register(Self::DATA_ERRORS, MetricKind::Counter)?,
            registry,
            protocol,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn tags(&self, pairs: &[(&str, &str)]) -> TagSet {
        self.registry.resolve_tags(pairs)
    }

    /// Records one issued call: count, latency and failure flag, tagged with the raw status.
    pub fn record_request(&self, outcome: &Outcome) {
        let status = outcome.status.tag();
        let tags = self.tags(&[("status", status.as_str())]);

        if let Some(h) = self.registry.handle(self.reqs, &tags) {
            h.add(1);
        }
        if let Some(h) = self.registry.handle(self.req_duration, &tags) {
            h.observe(outcome.latency);
        }
        if let Some(h) = self.registry.handle(self.req_failed, &tags) {
            h.add_rate(!outcome.success);
        }
    }

    pub fn record_checks(&self, results: &[(String, bool)]) {
        for (name, passed) in results {
            let tags = self.tags(&[("check", name.as_str())]);
            if let Some(h) = self.registry.handle(self.checks, &tags) {
                h.add_rate(*passed);
            }
        }
    }

    pub fn record_no_data(&self) {
        if let Some(h) = self.registry.handle(self.data_errors, &TagSet::default()) {
            h.add(1);
        }
    }

    pub fn record_iteration(&self, success: bool, duration: Duration) {
        let status = if success { "success" } else { "failure" };
        let tags = self.tags(&[("status", status)]);

        if let Some(h) = self.registry.handle(self.iterations, &tags) {
            h.add(1);
        }
        if let Some(h) = self.registry.handle(self.iteration_duration, &tags) {
            h.observe(duration);
        }
        if let Some(h) = self.registry.handle(self.iteration_failed, &TagSet::default()) {
            h.add_rate(!success);
        }
    }

    pub fn requests_total(&self) -> u64 {
        self.registry.query(self.reqs).sum_counter_total()
    }

    pub fn requests_failed(&self) -> u64 {
        self.registry.rate_totals(self.req_failed).hits
    }

    pub fn iterations_total(&self) -> u64 {
        self.registry.query(self.iterations).sum_counter_total()
    }

    pub fn data_errors_total(&self) -> u64 {
        self.registry.query(self.data_errors).sum_counter_total()
    }

    /// Passed and evaluated check totals across every check.
    pub fn checks_totals(&self) -> txload_metrics::RateTotals {
        self.registry.rate_totals(self.checks)
    }

    /// Per-check `(name, passed, total)`, sorted by name.
    pub fn checks_by_name(&self) -> Vec<(String, u64, u64)> {
        let key = self.registry.resolve_key("check");
        let mut out: Vec<(String, u64, u64)> = self
            .registry
            .query(self.checks)
            .group_by(&["check"])
            .sum_rate()
            .into_iter()
            .map(|(tags, totals)| {
                let name = tags
                    .get(key)
                    .map(|v| self.registry.resolve_name(v))
                    .unwrap_or_default();
                (name, totals.hits, totals.total)
            })
            .collect();
        out.sort();
        out
    }
}
