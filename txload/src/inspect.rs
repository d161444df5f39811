use std::sync::Arc;

use anyhow::Context as _;
use txload_core::{CsvFileSource, Requirements, SharedDataset};

use crate::cli::InspectArgs;
use crate::output;
use crate::run_error::RunError;

pub async fn inspect(args: InspectArgs) -> Result<(), RunError> {
    let out = output::formatter(args.output);
    let dataset = SharedDataset::new(
        Arc::new(CsvFileSource::new(args.data.clone())),
        (&args.columns).into(),
        Requirements {
            id_required: args.require_id,
        },
    );

    let dataset = dataset.get().await?;
    out.print_inspect(&args.data, &dataset)
        .context("failed to write dataset report")
        .map_err(RunError::RuntimeError)
}
