use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    /// Monotonic sum.
    Counter,
    /// Share of non-zero samples (`hits / total`).
    Rate,
    /// Latency distribution. Samples are durations, summaries are milliseconds.
    Trend,
}

#[derive(Debug, Default)]
pub(crate) struct RateCell {
    pub(crate) hits: AtomicU64,
    pub(crate) total: AtomicU64,
}

#[derive(Debug, Clone)]
pub(crate) enum Series {
    Counter(Arc<AtomicU64>),
    Rate(Arc<RateCell>),
    Trend(Arc<Mutex<Histogram<u64>>>),
}

impl Series {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Series::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Rate => Series::Rate(Arc::new(RateCell::default())),
            MetricKind::Trend => Series::Trend(Arc::new(Mutex::new(new_trend_histogram()))),
        }
    }
}

/// Microsecond resolution, up to one hour, three significant digits.
pub(crate) fn new_trend_histogram() -> Histogram<u64> {
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("invalid histogram bounds: {err}"),
    }
}

/// Write side of one series. Cheap to clone and safe to share between workers.
#[derive(Debug, Clone)]
pub struct MetricHandle(pub(crate) Series);

impl MetricHandle {
    pub fn kind(&self) -> MetricKind {
        match &self.0 {
            Series::Counter(_) => MetricKind::Counter,
            Series::Rate(_) => MetricKind::Rate,
            Series::Trend(_) => MetricKind::Trend,
        }
    }

    #[inline]
    pub fn add(&self, value: u64) {
        if let Series::Counter(c) = &self.0 {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add_rate(&self, hit: bool) {
        if let Series::Rate(r) = &self.0 {
            if hit {
                r.hits.fetch_add(1, Ordering::Relaxed);
            }
            r.total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn observe(&self, value: Duration) {
        if let Series::Trend(h) = &self.0 {
            let micros = u64::try_from(value.as_micros()).unwrap_or(u64::MAX);
            h.lock().saturating_record(micros);
        }
    }

    pub fn counter_value(&self) -> u64 {
        match &self.0 {
            Series::Counter(c) => c.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    pub fn rate_value(&self) -> RateTotals {
        match &self.0 {
            Series::Rate(r) => RateTotals {
                hits: r.hits.load(Ordering::Relaxed),
                total: r.total.load(Ordering::Relaxed),
            },
            _ => RateTotals::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateTotals {
    pub hits: u64,
    pub total: u64,
}

impl RateTotals {
    pub fn rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.hits as f64 / self.total as f64)
    }

    pub(crate) fn merge(&mut self, other: RateTotals) {
        self.hits = self.hits.saturating_add(other.hits);
        self.total = self.total.saturating_add(other.total);
    }
}

/// A trend distribution merged across series.
#[derive(Debug, Clone)]
pub struct Trend {
    hist: Histogram<u64>,
}

impl Trend {
    pub(crate) fn new(hist: Histogram<u64>) -> Self {
        Self { hist }
    }

    pub(crate) fn histogram(&self) -> &Histogram<u64> {
        &self.hist
    }

    pub fn count(&self) -> u64 {
        self.hist.len()
    }

    /// Value in milliseconds at percentile `p` (0..=100).
    pub fn percentile_ms(&self, p: f64) -> Option<f64> {
        if self.hist.len() == 0 || !(0.0..=100.0).contains(&p) {
            return None;
        }
        Some(micros_to_ms(self.hist.value_at_quantile(p / 100.0) as f64))
    }

    pub fn summary(&self) -> TrendSummary {
        let h = &self.hist;
        let some = h.len() > 0;
        let ms = |v: u64| micros_to_ms(v as f64);

        TrendSummary {
            count: h.len(),
            min: some.then(|| ms(h.min())),
            max: some.then(|| ms(h.max())),
            mean: some.then(|| micros_to_ms(h.mean())),
            stdev: some.then(|| micros_to_ms(h.stdev())),
            p50: some.then(|| ms(h.value_at_quantile(0.50))),
            p90: some.then(|| ms(h.value_at_quantile(0.90))),
            p95: some.then(|| ms(h.value_at_quantile(0.95))),
            p99: some.then(|| ms(h.value_at_quantile(0.99))),
        }
    }
}

fn micros_to_ms(v: f64) -> f64 {
    v / 1000.0
}

/// Milliseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrendSummary {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

#[derive(Debug, Clone)]
pub enum MetricValue {
    Counter(u64),
    Rate(RateTotals),
    Trend(TrendSummary),
}

#[derive(Debug, Clone)]
pub struct MetricSeriesSummary {
    pub name: String,
    pub kind: MetricKind,
    pub tags: Vec<(String, String)>,
    pub value: MetricValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_ignore_writes_of_the_wrong_kind() {
        let counter = MetricHandle(Series::new(MetricKind::Counter));
        counter.add(2);
        counter.add_rate(true);
        counter.observe(Duration::from_millis(5));
        assert_eq!(counter.counter_value(), 2);
        assert_eq!(counter.rate_value(), RateTotals::default());
    }

    #[test]
    fn rate_counts_hits_and_total() {
        let rate = MetricHandle(Series::new(MetricKind::Rate));
        rate.add_rate(true);
        rate.add_rate(false);
        rate.add_rate(false);
        rate.add_rate(true);
        let totals = rate.rate_value();
        assert_eq!(totals, RateTotals { hits: 2, total: 4 });
        assert_eq!(totals.rate(), Some(0.5));
        assert_eq!(RateTotals::default().rate(), None);
    }

    #[test]
    fn trend_summary_reports_milliseconds() {
        let mut h = new_trend_histogram();
        for ms in [10u64, 20, 30, 40] {
            h.saturating_record(ms * 1000);
        }
        let trend = Trend::new(h);
        let s = trend.summary();
        assert_eq!(s.count, 4);
        assert_eq!(s.min, Some(10.0));
        assert!(s.max.is_some_and(|v| (v - 40.0).abs() < 0.1));
        assert!(s.mean.is_some_and(|v| (v - 25.0).abs() < 0.1));
        assert!(trend.percentile_ms(50.0).is_some_and(|v| (v - 20.0).abs() < 0.1));
        assert!(trend.percentile_ms(101.0).is_none());
    }

    #[test]
    fn empty_trend_has_no_stats() {
        let trend = Trend::new(new_trend_histogram());
        let s = trend.summary();
        assert_eq!(s.count, 0);
        assert!(s.p95.is_none());
        assert!(s.mean.is_none());
        assert!(trend.percentile_ms(95.0).is_none());
    }
}
