//! `playmart init`: create or upgrade the warehouse schema.

use playmart_core::{Pipeline, PipelineConfig};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode, text_kv};

#[derive(Debug, Serialize)]
pub struct InitReport {
    pub warehouse: String,
    pub schema_version: i64,
}

/// Execute `playmart init`. Connecting applies any pending migrations.
pub fn run_init(config: &PipelineConfig, output: OutputMode) -> anyhow::Result<()> {
    let pipeline = Pipeline::connect(config.clone())?;
    let marks = pipeline.stage_marks()?;

    let report = InitReport {
        warehouse: config.warehouse.path.display().to_string(),
        schema_version: marks.schema_version,
    };

    render_mode(
        output,
        &report,
        |report, w| {
            text_kv(w, "warehouse", &report.warehouse)?;
            text_kv(w, "schema_version", report.schema_version)
        },
        |report, w| {
            pretty_section(w, "Warehouse ready")?;
            pretty_kv(w, "path", &report.warehouse)?;
            pretty_kv(w, "schema", format!("v{}", report.schema_version))
        },
    )
}
