//! `playmart reset`: drop and recreate warehouse tables.

use clap::Args;
use playmart_core::{Pipeline, PipelineConfig};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, render_mode, text_kv};

#[derive(Args, Debug, Default)]
pub struct ResetArgs {
    /// Only empty the staging tables; dimensions and songplays are kept.
    #[arg(long)]
    pub staging_only: bool,
}

#[derive(Debug, Serialize)]
pub struct ResetReport {
    pub warehouse: String,
    pub scope: &'static str,
}

/// Execute `playmart reset`.
pub fn run_reset(args: &ResetArgs, config: &PipelineConfig, output: OutputMode) -> anyhow::Result<()> {
    let mut pipeline = Pipeline::connect(config.clone())?;
    let scope = if args.staging_only {
        pipeline.reset_staging()?;
        "staging"
    } else {
        pipeline.reset()?;
        "all"
    };

    let report = ResetReport {
        warehouse: config.warehouse.path.display().to_string(),
        scope,
    };

    render_mode(
        output,
        &report,
        |report, w| text_kv(w, "reset", report.scope),
        |report, w| {
            let what = if report.scope == "staging" {
                "staging tables recreated"
            } else {
                "all tables recreated"
            };
            pretty_kv(w, "reset", what)?;
            pretty_kv(w, "warehouse", &report.warehouse)
        },
    )
}
