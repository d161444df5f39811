use std::collections::HashMap;
use std::sync::atomic::Ordering;

use hdrhistogram::Histogram;
use smallvec::SmallVec;

use crate::key::KeyId;
use crate::registry::{MetricId, Registry};
use crate::series::{RateTotals, Series, Trend, new_trend_histogram};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy)]
enum TagFilter {
    Eq(KeyId, KeyId),
    Missing(KeyId),
}

impl TagFilter {
    fn matches(&self, tags: &TagSet) -> bool {
        match *self {
            TagFilter::Eq(k, v) => tags.get(k) == Some(v),
            TagFilter::Missing(k) => tags.get(k).is_none(),
        }
    }
}

/// Filtered, optionally grouped read over the series of one metric.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    registry: &'a Registry,
    metric: MetricId,
    filters: SmallVec<[TagFilter; 4]>,
    group_keys: SmallVec<[KeyId; 4]>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(registry: &'a Registry, metric: MetricId) -> Self {
        Self {
            registry,
            metric,
            filters: SmallVec::new(),
            group_keys: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn where_eq(mut self, key: &str, value: &str) -> Self {
        let key = self.registry.resolve_key(key);
        let value = self.registry.resolve_key(value);
        self.filters.push(TagFilter::Eq(key, value));
        self
    }

    #[must_use]
    pub fn where_missing(mut self, key: &str) -> Self {
        let key = self.registry.resolve_key(key);
        self.filters.push(TagFilter::Missing(key));
        self
    }

    #[must_use]
    pub fn group_by(mut self, keys: &[&str]) -> Self {
        self.group_keys = keys.iter().map(|k| self.registry.resolve_key(k)).collect();
        self.group_keys.sort_unstable();
        self.group_keys.dedup();
        self
    }

    fn visit(&self, mut f: impl FnMut(TagSet, &Series)) {
        self.registry.visit_series(self.metric, |tags, series| {
            if self.filters.iter().all(|flt| flt.matches(tags)) {
                f(tags.project(&self.group_keys), series);
            }
        });
    }

    pub fn sum_counter(self) -> HashMap<TagSet, u64> {
        let mut out: HashMap<TagSet, u64> = HashMap::new();
        self.visit(|group, series| {
            if let Series::Counter(c) = series {
                let cur = out.entry(group).or_default();
                *cur = cur.saturating_add(c.load(Ordering::Relaxed));
            }
        });
        out
    }

    pub fn sum_counter_total(self) -> u64 {
        self.sum_counter().values().copied().sum()
    }

    pub fn sum_rate(self) -> HashMap<TagSet, RateTotals> {
        let mut out: HashMap<TagSet, RateTotals> = HashMap::new();
        self.visit(|group, series| {
            if let Series::Rate(r) = series {
                out.entry(group).or_default().merge(RateTotals {
                    hits: r.hits.load(Ordering::Relaxed),
                    total: r.total.load(Ordering::Relaxed),
                });
            }
        });
        out
    }

    pub fn sum_rate_total(self) -> RateTotals {
        let mut totals = RateTotals::default();
        for v in self.sum_rate().into_values() {
            totals.merge(v);
        }
        totals
    }

    pub fn merge_trend(self) -> HashMap<TagSet, Trend> {
        let mut acc: HashMap<TagSet, Histogram<u64>> = HashMap::new();
        self.visit(|group, series| {
            if let Series::Trend(h) = series {
                let merged = acc.entry(group).or_insert_with(new_trend_histogram);
                let _ = merged.add(&*h.lock());
            }
        });
        acc.into_iter().map(|(k, h)| (k, Trend::new(h))).collect()
    }

    /// The whole metric merged into one distribution, ignoring `group_by`.
    pub fn merge_trend_total(self) -> Trend {
        let mut merged = new_trend_histogram();
        for trend in self.merge_trend().into_values() {
            let _ = merged.add(trend.histogram());
        }
        Trend::new(merged)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::series::MetricKind;
    use crate::{Registry, TagSet};

    #[test]
    fn sum_counter_groups_and_filters() {
        let reg = Registry::default();
        let metric = reg
            .register("iterations", MetricKind::Counter)
            .unwrap_or_else(|e| panic!("{e}"));

        for (status, protocol, n) in [("ok", "http", 10), ("failed", "http", 3), ("ok", "grpc", 5)]
        {
            let tags = reg.resolve_tags(&[("status", status), ("protocol", protocol)]);
            if let Some(h) = reg.handle(metric, &tags) {
                h.add(n);
            }
        }

        let by_status = reg.query(metric).group_by(&["status"]).sum_counter();
        assert_eq!(by_status.len(), 2);
        assert_eq!(
            by_status.get(&reg.resolve_tags(&[("status", "ok")])),
            Some(&15)
        );

        let http_ok = reg
            .query(metric)
            .where_eq("protocol", "http")
            .where_eq("status", "ok")
            .sum_counter_total();
        assert_eq!(http_ok, 10);
        assert_eq!(reg.query(metric).sum_counter_total(), 18);
        assert_eq!(reg.query(metric).where_missing("status").sum_counter_total(), 0);
    }

    #[test]
    fn rates_and_trends_merge_across_series() {
        let reg = Registry::default();
        let checks = reg
            .register("checks", MetricKind::Rate)
            .unwrap_or_else(|e| panic!("{e}"));
        let latency = reg
            .register("http_req_duration", MetricKind::Trend)
            .unwrap_or_else(|e| panic!("{e}"));

        let a = reg.resolve_tags(&[("check", "status is 2xx")]);
        let b = reg.resolve_tags(&[("check", "response not error")]);
        for (tags, hit) in [(&a, true), (&a, true), (&b, false), (&b, true)] {
            if let Some(h) = reg.handle(checks, tags) {
                h.add_rate(hit);
            }
            if let Some(h) = reg.handle(latency, tags) {
                h.observe(Duration::from_millis(100));
            }
        }

        let total = reg.query(checks).sum_rate_total();
        assert_eq!((total.hits, total.total), (3, 4));
        let first = reg
            .query(checks)
            .where_eq("check", "status is 2xx")
            .sum_rate_total();
        assert_eq!(first.rate(), Some(1.0));

        let merged = reg.query(latency).merge_trend_total();
        assert_eq!(merged.count(), 4);
        assert_eq!(reg.query(latency).group_by(&["check"]).merge_trend().len(), 2);
        assert!(reg.query(latency).merge_trend().contains_key(&TagSet::default()));
    }
}
