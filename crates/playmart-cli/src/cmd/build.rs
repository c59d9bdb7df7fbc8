//! `playmart build`: rebuild the four dimensions from staging.

use playmart_core::{Pipeline, PipelineConfig};

use super::DimensionView;
use crate::output::{OutputMode, pretty_section, render_mode};

/// Execute `playmart build`.
pub fn run_build(config: &PipelineConfig, output: OutputMode) -> anyhow::Result<()> {
    let pipeline = Pipeline::connect(config.clone())?;
    let report = DimensionView::from(&pipeline.build_dimensions()?);

    render_mode(output, &report, DimensionView::write_text, |report, w| {
        pretty_section(w, "Dimensions built")?;
        report.write_pretty(w)
    })
}
