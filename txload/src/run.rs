use anyhow::Context as _;
use std::time::Duration;

use txload_core::{
    CheckPredicate, CheckSet, DataConfig, Protocol, RunConfig, SchemaSource, Session,
    TargetConfig, ThresholdSet, parse_threshold_sets,
};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;

const DEFAULT_DURATION: Duration = Duration::from_secs(60);

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);
    let cfg = run_config(&args).map_err(RunError::InvalidInput)?;
    let checks = custom_checks(&args).map_err(RunError::InvalidInput)?;

    let mut session = Session::prepare(cfg.clone()).await?;
    if let Some(checks) = checks {
        session = session.with_checks(checks);
    }
    out.print_header(&cfg, session.dataset_stats());

    let gate = session.gate();
    let stopper = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; stopping workers");
            gate.stop();
        }
    });

    let report = session.run().await;
    stopper.abort();
    let report = report?;

    out.print_summary(&report)
        .context("failed to write summary")
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_quality_gates(
        report.checks_failed(),
        report.thresholds_failed(),
    ))
}

fn run_config(args: &RunArgs) -> anyhow::Result<RunConfig> {
    let protocol = args.protocol;

    let target = match protocol {
        Protocol::Http => TargetConfig::Http {
            base_url: args.base_url.clone(),
            path: args.path.clone(),
        },
        Protocol::Grpc => {
            let schema = match (&args.proto, &args.descriptor_set) {
                (_, Some(path)) => SchemaSource::DescriptorSet(path.clone()),
                (Some(path), None) => SchemaSource::Proto {
                    path: path.clone(),
                    includes: args.includes.clone(),
                },
                (None, None) => {
                    anyhow::bail!("--protocol grpc requires --proto or --descriptor-set")
                }
            };
            TargetConfig::Grpc {
                target: args.grpc_target.clone(),
                schema,
                method: args.method.clone(),
            }
        }
    };

    let thresholds = if args.thresholds.is_empty() {
        ThresholdSet::defaults(protocol)
    } else {
        let mut sets: Vec<ThresholdSet> = Vec::new();
        for raw in &args.thresholds {
            let parsed = parse_threshold_sets(raw)
                .map_err(|e| anyhow::anyhow!("invalid --threshold `{raw}`: {e}"))?;
            for set in parsed {
                match sets.iter_mut().find(|s| s.metric == set.metric) {
                    Some(existing) => existing.expressions.extend(set.expressions),
                    None => sets.push(set),
                }
            }
        }
        sets
    };

    let duration = match (args.duration, args.iterations) {
        (Some(d), _) => Some(d),
        (None, Some(_)) => None,
        (None, None) => Some(DEFAULT_DURATION),
    };

    let cfg = RunConfig {
        target,
        data: DataConfig {
            path: args.data.clone(),
            columns: (&args.columns).into(),
            require_data: args.require_data,
        },
        workers: args.workers,
        iterations: args.iterations,
        duration,
        timeout: args.timeout,
        connect_timeout: args.connect_timeout,
        pacing: args.pacing.unwrap_or_else(|| protocol.default_pacing()),
        thresholds,
        no_data_policy: args.no_data_policy,
        id_strategy: args
            .id_strategy
            .unwrap_or_else(|| protocol.default_id_strategy()),
        seed: args.seed.unwrap_or_else(txload_core::random_seed),
    };
    cfg.validate()?;
    Ok(cfg)
}

/// `--check` flags, or `None` to keep the protocol's default checks.
fn custom_checks(args: &RunArgs) -> anyhow::Result<Option<CheckSet>> {
    if args.checks.is_empty() {
        return Ok(None);
    }
    let http_only = args
        .checks
        .iter()
        .find(|c| matches!(c.predicate, CheckPredicate::StatusIn(_)));
    if let (Protocol::Grpc, Some(check)) = (args.protocol, http_only) {
        anyhow::bail!("check `{}`: status_in only applies to http", check.name);
    }
    Ok(Some(CheckSet::new(args.checks.clone())))
}
