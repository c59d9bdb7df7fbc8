//! `playmart load`: bulk-load both staging relations.

use std::path::PathBuf;

use clap::Args;
use playmart_core::{Pipeline, PipelineConfig};

use super::StagingView;
use crate::output::{OutputMode, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct LoadArgs {
    /// Event log source (directory, file, or file:// URI). Overrides `sources.log_data`.
    #[arg(long, value_name = "PATH")]
    pub events: Option<String>,

    /// Song catalog source. Overrides `sources.song_data`.
    #[arg(long, value_name = "PATH")]
    pub songs: Option<String>,

    /// JSONPaths file mapping event fields onto staging columns.
    #[arg(long, value_name = "PATH")]
    pub jsonpath: Option<PathBuf>,
}

impl LoadArgs {
    /// Apply the command-line source overrides on top of `config`.
    pub fn apply(&self, config: &PipelineConfig) -> PipelineConfig {
        let mut config = config.clone();
        if let Some(events) = &self.events {
            config.sources.log_data.clone_from(events);
        }
        if let Some(songs) = &self.songs {
            config.sources.song_data.clone_from(songs);
        }
        if let Some(jsonpath) = &self.jsonpath {
            config.sources.log_jsonpath = Some(jsonpath.clone());
        }
        config
    }
}

/// Execute `playmart load`.
pub fn run_load(args: &LoadArgs, config: &PipelineConfig, output: OutputMode) -> anyhow::Result<()> {
    let pipeline = Pipeline::connect(args.apply(config))?;
    let report = StagingView::from(&pipeline.load_staging()?);

    render_mode(
        output,
        &report,
        StagingView::write_text,
        |report, w| {
            pretty_section(w, "Staging loaded")?;
            report.write_pretty(w)
        },
    )
}
