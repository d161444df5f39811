use std::io::Write as _;
use std::path::Path;

mod format;
mod summary;

use txload_core::{Dataset, DatasetStats, RunConfig, RunReport};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput;

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, cfg: &RunConfig, dataset: DatasetStats) {
        println!("{}", summary::render_header(cfg, dataset));
    }

    fn print_summary(&self, report: &RunReport) -> anyhow::Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(summary::render(report).as_bytes())?;
        stdout.flush()?;

        if !report.violations.is_empty() {
            let mut stderr = std::io::stderr().lock();
            stderr.write_all(summary::render_violations(&report.violations).as_bytes())?;
        }
        Ok(())
    }

    fn print_inspect(&self, path: &Path, dataset: &Dataset) -> anyhow::Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(summary::render_inspect(path, dataset).as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}
