use txload_metrics::{MetricId, MetricKind, Registry};

use crate::thresholds::{ThresholdAgg, ThresholdExpr, ThresholdSet, parse_threshold_expr};
use crate::{Error, Result};

/// What a threshold does when its metric recorded nothing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum NoDataPolicy {
    /// Report a violation without an observed value.
    #[default]
    Fail,
    /// Skip the threshold.
    Pass,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdViolation {
    pub metric: String,
    pub expression: String,
    /// `None` when the metric had no samples.
    pub observed: Option<f64>,
    /// `observed - bound`, signed.
    pub margin: Option<f64>,
}

pub fn evaluate_thresholds(
    metrics: &Registry,
    sets: &[ThresholdSet],
    policy: NoDataPolicy,
) -> Result<Vec<ThresholdViolation>> {
    let mut out = Vec::new();

    for set in sets {
        let lookup = metrics.lookup(&set.metric);

        for expr_raw in &set.expressions {
            let expr =
                parse_threshold_expr(expr_raw).map_err(|error| Error::InvalidThreshold {
                    metric: set.metric.clone(),
                    error,
                })?;

            let sampled = lookup.and_then(|(id, kind)| {
                has_samples(metrics, id, kind).then(|| observed_value(metrics, id, kind, &expr))
            });

            let observed = match sampled {
                None if policy == NoDataPolicy::Pass => continue,
                None => None,
                Some(observed) => observed,
            };

            if observed.is_some_and(|v| expr.passes(v)) {
                continue;
            }

            out.push(ThresholdViolation {
                metric: set.metric.clone(),
                expression: expr_raw.clone(),
                observed,
                margin: observed.map(|v| v - expr.value),
            });
        }
    }

    Ok(out)
}

fn has_samples(metrics: &Registry, metric: MetricId, kind: MetricKind) -> bool {
    let q = metrics.query(metric);
    match kind {
        MetricKind::Counter => !q.sum_counter().is_empty(),
        MetricKind::Rate => q.sum_rate_total().total > 0,
        MetricKind::Trend => q.merge_trend_total().count() > 0,
    }
}

/// `None` for aggregations that make no sense on the metric kind.
fn observed_value(
    metrics: &Registry,
    metric: MetricId,
    kind: MetricKind,
    expr: &ThresholdExpr,
) -> Option<f64> {
    let q = metrics.query(metric);
    match (kind, expr.agg) {
        (MetricKind::Counter, ThresholdAgg::Count) => Some(q.sum_counter_total() as f64),

        (MetricKind::Rate, ThresholdAgg::Rate) => q.sum_rate_total().rate(),
        (MetricKind::Rate, ThresholdAgg::Count) => Some(q.sum_rate_total().total as f64),

        (MetricKind::Trend, agg) => {
            let trend = q.merge_trend_total();
            match agg {
                ThresholdAgg::Count => Some(trend.count() as f64),
                ThresholdAgg::P(p) => trend.percentile_ms(p),
                ThresholdAgg::Avg => trend.summary().mean,
                ThresholdAgg::Min => trend.summary().min,
                ThresholdAgg::Max => trend.summary().max,
                ThresholdAgg::Rate => None,
            }
        }

        _ => None,
    }
}
