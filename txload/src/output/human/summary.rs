use std::fmt::Write as _;
use std::path::Path;

use txload_core::{Dataset, DatasetStats, RunConfig, RunReport, TargetConfig, ThresholdViolation};
use txload_metrics::MetricValue;

use super::format::*;

pub(crate) fn render_header(cfg: &RunConfig, dataset: DatasetStats) -> String {
    let mut out = String::new();
    match &cfg.target {
        TargetConfig::Http { .. } => {
            let url = cfg.http_url().unwrap_or_default();
            writeln!(out, "target: POST {url}").ok();
        }
        TargetConfig::Grpc { target, method, .. } => {
            writeln!(out, "target: grpc {target} {method}").ok();
        }
    }
    writeln!(
        out,
        "dataset: {} ({} rows, {} accepted, {} rejected)",
        cfg.data.path.display(),
        dataset.rows_total,
        dataset.accepted,
        dataset.rows_rejected
    )
    .ok();
    writeln!(
        out,
        "workers: {} iterations={} duration={} pacing={} timeout={}",
        cfg.workers,
        cfg.iterations.map_or_else(|| "-".to_string(), |n| n.to_string()),
        cfg.duration
            .map_or_else(|| "-".to_string(), |d| humantime::format_duration(d).to_string()),
        humantime::format_duration(cfg.pacing),
        humantime::format_duration(cfg.timeout),
    )
    .ok();
    out
}

pub(crate) fn render(report: &RunReport) -> String {
    let s = &report.summary;
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(
        out,
        "  requests: {} (failed {}, {})",
        s.requests_total,
        s.requests_failed,
        format_percent(s.requests_failed, s.requests_total)
    )
    .ok();
    writeln!(out, "  iterations: {}", s.iterations_total).ok();
    if s.data_errors > 0 {
        writeln!(out, "  data_errors: {}", s.data_errors).ok();
    }
    writeln!(
        out,
        "  elapsed: {} rps={}",
        format_ms(s.elapsed.as_secs_f64() * 1000.0),
        format_rate(s.requests_per_sec())
    )
    .ok();

    if !s.checks.is_empty() {
        out.push_str("\nchecks\n");
        for c in &s.checks {
            let mark = if c.failed() == 0 { "ok  " } else { "FAIL" };
            writeln!(
                out,
                "  {mark} {}: {}/{} ({})",
                c.name,
                c.passed,
                c.total,
                format_percent(c.passed, c.total)
            )
            .ok();
        }
    }

    render_metrics(report, &mut out);

    out.push('\n');
    let verdict = if report.passed() { "PASS" } else { "FAIL" };
    writeln!(
        out,
        "result: {verdict} (checks {}, thresholds {})",
        if report.checks_failed() { "failed" } else { "passed" },
        if report.thresholds_failed() {
            "failed"
        } else {
            "passed"
        }
    )
    .ok();
    out
}

fn render_metrics(report: &RunReport, out: &mut String) {
    if report.summary.metrics.is_empty() {
        return;
    }

    out.push_str("\nmetrics\n");
    for m in &report.summary.metrics {
        let tags = format_tags_inline(&m.tags, &[]);
        let value = match &m.value {
            MetricValue::Counter(n) => n.to_string(),
            MetricValue::Rate(r) => format!(
                "{} ({}/{})",
                format_percent(r.hits, r.total),
                r.hits,
                r.total
            ),
            MetricValue::Trend(t) => format!(
                "avg={} min={} p50={} p90={} p95={} p99={} max={} (n={})",
                format_ms_opt(t.mean),
                format_ms_opt(t.min),
                format_ms_opt(t.p50),
                format_ms_opt(t.p90),
                format_ms_opt(t.p95),
                format_ms_opt(t.p99),
                format_ms_opt(t.max),
                t.count
            ),
        };
        writeln!(out, "  {}{tags}: {value}", m.name).ok();
    }
}

pub(crate) fn render_violations(violations: &[ThresholdViolation]) -> String {
    let mut out = String::new();
    for v in violations {
        match (v.observed, v.margin) {
            (Some(observed), Some(margin)) => writeln!(
                out,
                "threshold failed: {}: {} (observed {observed:.4}, off by {margin:+.4})",
                v.metric, v.expression
            ),
            _ => writeln!(
                out,
                "threshold failed: {}: {} (no samples)",
                v.metric, v.expression
            ),
        }
        .ok();
    }
    out
}

pub(crate) fn render_inspect(path: &Path, dataset: &Dataset) -> String {
    let mut out = String::new();
    writeln!(out, "dataset: {}", path.display()).ok();
    writeln!(out, "  rows: {}", dataset.rows_total()).ok();
    writeln!(out, "  accepted: {}", dataset.len()).ok();
    writeln!(out, "  rejected: {}", dataset.rows_rejected()).ok();
    for (reason, count) in dataset.rejections() {
        writeln!(out, "    {}: {count}", reason.as_ref()).ok();
    }

    let breakdown = dataset.currency_breakdown();
    if !breakdown.is_empty() {
        out.push_str("currencies\n");
        for (currency, count) in breakdown {
            writeln!(out, "  {currency}: {count}").ok();
        }
    }
    out
}
