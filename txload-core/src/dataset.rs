use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::OnceCell;

use crate::record::{ColumnNames, NormalizedRecord, Rejection, Requirements, normalize};
use crate::{Currency, Result};

/// Header row plus every non-blank data row, unvalidated.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
}

/// Where dataset rows come from. Read once per process.
pub trait DatasetSource: fmt::Debug + Send + Sync {
    fn read(&self) -> Result<RawTable>;
}

fn read_csv<R: std::io::Read>(mut rdr: csv::Reader<R>) -> Result<RawTable> {
    let headers = rdr.headers()?.clone();
    let mut rows = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(rec);
    }
    Ok(RawTable { headers, rows })
}

fn csv_reader() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    // Short rows are rejected by the normalizer instead of failing the whole read.
    builder.has_headers(true).flexible(true);
    builder
}

#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DatasetSource for CsvFileSource {
    fn read(&self) -> Result<RawTable> {
        read_csv(csv_reader().from_path(&self.path)?)
    }
}

/// CSV held in memory.
#[derive(Debug, Clone)]
pub struct CsvTextSource {
    text: String,
}

impl CsvTextSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl DatasetSource for CsvTextSource {
    fn read(&self) -> Result<RawTable> {
        read_csv(csv_reader().from_reader(self.text.as_bytes()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct VecSource {
    table: RawTable,
}

impl VecSource {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            table: RawTable {
                headers: StringRecord::from(headers.to_vec()),
                rows: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn row(mut self, fields: &[&str]) -> Self {
        self.table.rows.push(StringRecord::from(fields.to_vec()));
        self
    }
}

impl DatasetSource for VecSource {
    fn read(&self) -> Result<RawTable> {
        Ok(self.table.clone())
    }
}

/// Result of drawing one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample<'a> {
    Record(&'a NormalizedRecord),
    NoData,
}

/// The accepted rows of a source, in source order. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<NormalizedRecord>,
    rows_total: u64,
    rejections: BTreeMap<Rejection, u64>,
}

impl Dataset {
    pub fn build(
        source: &dyn DatasetSource,
        columns: &ColumnNames,
        requirements: Requirements,
    ) -> Result<Self> {
        let table = source.read()?;
        let index = columns.resolve(&table.headers, requirements)?;

        let mut records = Vec::with_capacity(table.rows.len());
        let mut rejections: BTreeMap<Rejection, u64> = BTreeMap::new();
        for row in &table.rows {
            match normalize(row, &index, requirements) {
                Ok(rec) => records.push(rec),
                Err(reason) => *rejections.entry(reason).or_default() += 1,
            }
        }

        Ok(Self {
            records,
            rows_total: table.rows.len() as u64,
            rejections,
        })
    }

    pub fn from_records(records: Vec<NormalizedRecord>) -> Self {
        Self {
            rows_total: records.len() as u64,
            records,
            rejections: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    pub fn rows_total(&self) -> u64 {
        self.rows_total
    }

    pub fn rows_rejected(&self) -> u64 {
        self.rejections.values().sum()
    }

    pub fn rejections(&self) -> &BTreeMap<Rejection, u64> {
        &self.rejections
    }

    pub fn currency_breakdown(&self) -> BTreeMap<Currency, u64> {
        let mut out: BTreeMap<Currency, u64> = BTreeMap::new();
        for rec in &self.records {
            *out.entry(rec.currency.clone()).or_default() += 1;
        }
        out
    }

    /// Uniform draw with replacement.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Sample<'_> {
        if self.records.is_empty() {
            return Sample::NoData;
        }
        Sample::Record(&self.records[rng.gen_range(0..self.records.len())])
    }
}

/// Per-worker RNG. A fixed seed and worker id replay the same draws.
pub fn worker_rng(seed: u64, worker_id: u64) -> StdRng {
    StdRng::seed_from_u64(seed ^ worker_id)
}

/// Seed for runs that did not ask for a reproducible one.
pub fn random_seed() -> u64 {
    rand::thread_rng().r#gen()
}

#[derive(Debug)]
struct SharedInner {
    source: Arc<dyn DatasetSource>,
    columns: ColumnNames,
    requirements: Requirements,
    cell: OnceCell<Arc<Dataset>>,
}

/// Lazily built dataset shared by every worker. The first caller builds it; concurrent
/// callers wait for that build and receive the same `Arc`.
#[derive(Debug, Clone)]
pub struct SharedDataset {
    inner: Arc<SharedInner>,
}

impl SharedDataset {
    pub fn new(
        source: Arc<dyn DatasetSource>,
        columns: ColumnNames,
        requirements: Requirements,
    ) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                source,
                columns,
                requirements,
                cell: OnceCell::new(),
            }),
        }
    }

    pub async fn get(&self) -> Result<Arc<Dataset>> {
        self.inner
            .cell
            .get_or_try_init(|| async {
                let source = self.inner.source.clone();
                let columns = self.inner.columns.clone();
                let requirements = self.inner.requirements;

                let dataset = tokio::task::spawn_blocking(move || {
                    Dataset::build(source.as_ref(), &columns, requirements)
                })
                .await??;

                tracing::info!(
                    rows_total = dataset.rows_total(),
                    rows_rejected = dataset.rows_rejected(),
                    accepted = dataset.len(),
                    "dataset loaded"
                );
                Ok::<_, crate::Error>(Arc::new(dataset))
            })
            .await
            .map(Arc::clone)
    }
}
