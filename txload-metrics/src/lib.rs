mod key;
mod query;
mod registry;
mod series;
mod tags;

pub use key::KeyId;
pub use query::Query;
pub use registry::{MetricId, Registry};
pub use series::{
    MetricHandle, MetricKind, MetricSeriesSummary, MetricValue, RateTotals, Trend, TrendSummary,
};
pub use tags::TagSet;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("metric `{name}` is already registered as {registered}, not {requested}")]
    KindMismatch {
        name: String,
        registered: MetricKind,
        requested: MetricKind,
    },
}
