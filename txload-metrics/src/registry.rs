use dashmap::DashMap;
use parking_lot::RwLock;

use crate::key::{Interner, KeyId};
use crate::query::Query;
use crate::series::{
    MetricHandle, MetricKind, MetricSeriesSummary, MetricValue, RateTotals, Series, Trend,
};
use crate::tags::TagSet;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
struct MetricDef {
    name: KeyId,
    kind: MetricKind,
}

/// Concurrent store of every metric series recorded during a run.
#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    storage: DashMap<MetricId, DashMap<TagSet, Series>>,
}

impl Registry {
    /// Registers `name`, or returns the existing id when it is already registered with the
    /// same kind.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<MetricId> {
        let name_id = self.interner.intern(name);

        let mut defs = self.defs.write();
        if let Some((idx, def)) = defs.iter().enumerate().find(|(_, d)| d.name == name_id) {
            if def.kind != kind {
                return Err(Error::KindMismatch {
                    name: name.to_string(),
                    registered: def.kind,
                    requested: kind,
                });
            }
            return Ok(MetricId(idx as u32));
        }

        let id = MetricId(defs.len() as u32);
        defs.push(MetricDef {
            name: name_id,
            kind,
        });
        self.storage.insert(id, DashMap::new());
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<(MetricId, MetricKind)> {
        let name_id = self.interner.get(name)?;
        let defs = self.defs.read();
        defs.iter()
            .enumerate()
            .find(|(_, d)| d.name == name_id)
            .map(|(idx, d)| (MetricId(idx as u32), d.kind))
    }

    pub fn kind(&self, metric: MetricId) -> Option<MetricKind> {
        self.defs.read().get(metric.0 as usize).map(|d| d.kind)
    }

    pub fn resolve_key(&self, key: &str) -> KeyId {
        self.interner.intern(key)
    }

    pub fn resolve_tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::from_pairs(
            tags.iter()
                .map(|(k, v)| (self.interner.intern(k), self.interner.intern(v))),
        )
    }

    /// Returns the write handle of one series, creating it on first use.
    pub fn handle(&self, metric: MetricId, tags: &TagSet) -> Option<MetricHandle> {
        // Read the kind before touching storage: `register` takes the locks in the other order.
        let kind = self.kind(metric)?;
        let series_map = self.storage.get(&metric)?;
        if let Some(series) = series_map.get(tags) {
            return Some(MetricHandle(series.value().clone()));
        }

        let series = series_map
            .entry(tags.clone())
            .or_insert_with(|| Series::new(kind));
        Some(MetricHandle(series.value().clone()))
    }

    pub fn query(&self, metric: MetricId) -> Query<'_> {
        Query::new(self, metric)
    }

    pub(crate) fn visit_series(&self, metric: MetricId, mut f: impl FnMut(&TagSet, &Series)) {
        let Some(series_map) = self.storage.get(&metric) else {
            return;
        };
        for entry in series_map.iter() {
            f(entry.key(), entry.value());
        }
    }

    /// The interned string behind a tag key or value.
    pub fn resolve_name(&self, id: KeyId) -> String {
        self.interner
            .resolve(id)
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    /// Snapshot of every series, sorted by metric name then tags.
    pub fn summarize(&self) -> Vec<MetricSeriesSummary> {
        let defs: Vec<(MetricId, KeyId, MetricKind)> = self
            .defs
            .read()
            .iter()
            .enumerate()
            .map(|(idx, d)| (MetricId(idx as u32), d.name, d.kind))
            .collect();

        let mut out = Vec::new();
        for (metric, name, kind) in defs {
            let name = self.resolve_name(name);
            self.visit_series(metric, |tags, series| {
                let mut tag_vec: Vec<(String, String)> = tags
                    .iter()
                    .map(|(k, v)| (self.resolve_name(k), self.resolve_name(v)))
                    .collect();
                tag_vec.sort();

                let value = match series {
                    Series::Counter(_) => {
                        MetricValue::Counter(MetricHandle(series.clone()).counter_value())
                    }
                    Series::Rate(_) => MetricValue::Rate(MetricHandle(series.clone()).rate_value()),
                    Series::Trend(h) => MetricValue::Trend(Trend::new(h.lock().clone()).summary()),
                };

                out.push(MetricSeriesSummary {
                    name: name.clone(),
                    kind,
                    tags: tag_vec,
                    value,
                });
            });
        }

        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        out
    }

    /// Totals across every series of a rate metric.
    pub fn rate_totals(&self, metric: MetricId) -> RateTotals {
        self.query(metric).sum_rate_total()
    }
}
