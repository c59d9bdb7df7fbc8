//! `playmart merge`: merge staged plays into `songplays`.

use playmart_core::{Pipeline, PipelineConfig};

use super::MergeView;
use crate::output::{OutputMode, pretty_section, render_mode};

/// Execute `playmart merge`.
pub fn run_merge(config: &PipelineConfig, output: OutputMode) -> anyhow::Result<()> {
    let pipeline = Pipeline::connect(config.clone())?;
    let report = MergeView::from(&pipeline.merge_fact()?);

    render_mode(output, &report, MergeView::write_text, |report, w| {
        pretty_section(w, "Songplays merged")?;
        report.write_pretty(w)
    })
}
