use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use txload_core::{Dataset, DatasetStats, RunConfig, RunReport};
use txload_metrics::MetricValue;

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _cfg: &RunConfig, _dataset: DatasetStats) {}

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        emit_json_line(&build_summary_line(report))
    }

    fn print_inspect(&self, path: &Path, dataset: &Dataset) -> anyhow::Result<()> {
        emit_json_line(&build_inspect_line(path, dataset))
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub protocol: String,
    pub passed: bool,
    pub checks_failed: bool,
    pub thresholds_failed: bool,
    pub elapsed_secs: f64,
    pub requests_total: u64,
    pub requests_failed: u64,
    pub requests_per_sec: f64,
    pub iterations_total: u64,
    pub data_errors: u64,
    pub dataset: JsonDataset,
    pub checks: Vec<JsonCheck>,
    pub thresholds: Vec<JsonViolation>,
    pub metrics: Vec<JsonMetric>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonDataset {
    pub rows_total: u64,
    pub accepted: u64,
    pub rows_rejected: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck {
    pub name: String,
    pub passed: u64,
    pub failed: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonViolation {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub margin: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonMetric {
    pub name: String,
    pub kind: String,
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<JsonTrend>,
}

/// Milliseconds.
#[derive(Debug, Serialize)]
pub(crate) struct JsonTrend {
    pub count: u64,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

fn build_summary_line(report: &RunReport) -> JsonSummaryLine {
    let s = &report.summary;
    JsonSummaryLine {
        kind: "summary",
        protocol: report.protocol.to_string(),
        passed: report.passed(),
        checks_failed: report.checks_failed(),
        thresholds_failed: report.thresholds_failed(),
        elapsed_secs: s.elapsed.as_secs_f64(),
        requests_total: s.requests_total,
        requests_failed: s.requests_failed,
        requests_per_sec: s.requests_per_sec(),
        iterations_total: s.iterations_total,
        data_errors: s.data_errors,
        dataset: JsonDataset {
            rows_total: report.dataset.rows_total,
            accepted: report.dataset.accepted,
            rows_rejected: report.dataset.rows_rejected,
        },
        checks: s
            .checks
            .iter()
            .map(|c| JsonCheck {
                name: c.name.clone(),
                passed: c.passed,
                failed: c.failed(),
            })
            .collect(),
        thresholds: report
            .violations
            .iter()
            .map(|v| JsonViolation {
                metric: v.metric.clone(),
                expression: v.expression.clone(),
                observed: v.observed,
                margin: v.margin,
            })
            .collect(),
        metrics: s
            .metrics
            .iter()
            .map(|m| {
                let mut metric = JsonMetric {
                    name: m.name.clone(),
                    kind: m.kind.to_string(),
                    tags: m.tags.iter().cloned().collect(),
                    count: None,
                    rate: None,
                    trend: None,
                };
                match &m.value {
                    MetricValue::Counter(n) => metric.count = Some(*n),
                    MetricValue::Rate(r) => {
                        metric.count = Some(r.total);
                        metric.rate = r.rate();
                    }
                    MetricValue::Trend(t) => {
                        metric.trend = Some(JsonTrend {
                            count: t.count,
                            avg: t.mean,
                            min: t.min,
                            max: t.max,
                            p50: t.p50,
                            p90: t.p90,
                            p95: t.p95,
                            p99: t.p99,
                        });
                    }
                }
                metric
            })
            .collect(),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonInspectLine {
    pub kind: &'static str,
    pub path: String,
    pub rows_total: u64,
    pub accepted: u64,
    pub rows_rejected: u64,
    pub rejections: BTreeMap<String, u64>,
    pub currencies: BTreeMap<String, u64>,
}

fn build_inspect_line(path: &Path, dataset: &Dataset) -> JsonInspectLine {
    JsonInspectLine {
        kind: "dataset",
        path: path.display().to_string(),
        rows_total: dataset.rows_total(),
        accepted: dataset.len() as u64,
        rows_rejected: dataset.rows_rejected(),
        rejections: dataset
            .rejections()
            .iter()
            .map(|(r, n)| (r.as_ref().to_string(), *n))
            .collect(),
        currencies: dataset
            .currency_breakdown()
            .into_iter()
            .map(|(c, n)| (c.to_string(), n))
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, line)?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}
