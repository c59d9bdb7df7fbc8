//! `playmart run`: the full job. Load staging, build dimensions, merge the
//! fact, halting at the first failing stage.

use playmart_core::{Pipeline, PipelineConfig};
use serde::Serialize;
use std::io::Write;

use super::{DimensionView, MergeView, StagingView, millis};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

#[derive(Debug, Serialize)]
pub struct RunView {
    pub staging: StagingView,
    pub dimensions: DimensionView,
    pub merge: MergeView,
    pub elapsed_ms: u64,
}

/// Execute `playmart run`.
pub fn run_job(config: &PipelineConfig, output: OutputMode) -> anyhow::Result<()> {
    let pipeline = Pipeline::connect(config.clone())?;
    let report = pipeline.run()?;

    let view = RunView {
        staging: StagingView::from(&report.staging),
        dimensions: DimensionView::from(&report.dimensions),
        merge: MergeView::from(&report.merge),
        elapsed_ms: millis(report.elapsed),
    };

    render_mode(
        output,
        &view,
        |view, w| {
            view.staging.write_text(w)?;
            view.dimensions.write_text(w)?;
            view.merge.write_text(w)
        },
        |view, w| {
            pretty_section(w, "Staging")?;
            view.staging.write_pretty(w)?;
            writeln!(w)?;
            pretty_section(w, "Dimensions")?;
            view.dimensions.write_pretty(w)?;
            writeln!(w)?;
            pretty_section(w, "Songplays")?;
            view.merge.write_pretty(w)?;
            writeln!(w)?;
            pretty_kv(w, "total", format!("{} ms", view.elapsed_ms))
        },
    )
}
