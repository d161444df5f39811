use crate::cli::OutputFormat;
use std::path::Path;

use txload_core::{Dataset, DatasetStats, RunConfig, RunReport};

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, cfg: &RunConfig, dataset: DatasetStats);
    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()>;
    fn print_inspect(&self, path: &Path, dataset: &Dataset) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Human => Box::new(human::HumanReadableOutput),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
