//! `playmart stats`: totals plus top songs and users.

use clap::Args;
use playmart_core::pipeline::Summary;
use playmart_core::query::StageMarks;
use playmart_core::{Pipeline, PipelineConfig};
use serde::Serialize;
use std::io::{self, Write};

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode, text_kv};

#[derive(Args, Debug, Default)]
pub struct StatsArgs {
    /// How many songs and users to rank. Defaults to `queries.top_n`.
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub summary: Summary,
    pub stages: StageMarks,
}

/// Execute `playmart stats`.
pub fn run_stats(args: &StatsArgs, config: &PipelineConfig, output: OutputMode) -> anyhow::Result<()> {
    let pipeline = Pipeline::connect(config.clone())?;
    let top = args.top.unwrap_or(config.queries.top_n);

    let report = StatsReport {
        summary: pipeline.summary_top(top)?,
        stages: pipeline.stage_marks()?,
    };

    render_mode(output, &report, write_text, write_pretty)
}

fn write_text(report: &StatsReport, w: &mut dyn Write) -> io::Result<()> {
    let summary = &report.summary;
    text_kv(w, "users", summary.total_users)?;
    text_kv(w, "songs", summary.total_songs)?;
    for song in &summary.top_songs {
        writeln!(w, "song {} {}", song.song_id, song.play_count)?;
    }
    for user in &summary.top_users {
        writeln!(w, "user {} {}", user.user_id, user.play_count)?;
    }
    Ok(())
}

fn write_pretty(report: &StatsReport, w: &mut dyn Write) -> io::Result<()> {
    let summary = &report.summary;
    pretty_section(w, "Warehouse")?;
    pretty_kv(w, "users", summary.total_users.to_string())?;
    pretty_kv(w, "songs", summary.total_songs.to_string())?;
    pretty_kv(w, "schema", format!("v{}", report.stages.schema_version))?;

    writeln!(w)?;
    pretty_section(w, "Top songs")?;
    if summary.top_songs.is_empty() {
        writeln!(w, "(no plays)")?;
    }
    for (rank, song) in summary.top_songs.iter().enumerate() {
        let title = song.title.as_deref().unwrap_or("?");
        writeln!(w, "{:>2}. {:<20} {:<30} {:>6}", rank + 1, song.song_id, title, song.play_count)?;
    }

    writeln!(w)?;
    pretty_section(w, "Top users")?;
    if summary.top_users.is_empty() {
        writeln!(w, "(no plays)")?;
    }
    for (rank, user) in summary.top_users.iter().enumerate() {
        let name = match (&user.first_name, &user.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => "?".to_string(),
        };
        writeln!(w, "{:>2}. {:<8} {:<30} {:>6}", rank + 1, user.user_id, name, user.play_count)?;
    }
    Ok(())
}
