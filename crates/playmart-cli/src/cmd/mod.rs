//! Command handlers, one module per subcommand.
//!
//! Reports from the core carry `Duration`s and enum relations; the views
//! here flatten them into stable JSON shapes shared across commands.

pub mod build;
pub mod init;
pub mod load;
pub mod merge;
pub mod reset;
pub mod run;
pub mod stats;

use std::io::{self, Write};
use std::time::Duration;

use playmart_core::pipeline::StagingReport;
use playmart_core::staging::LoadReport;
use playmart_core::transform::{DimensionReport, MergeReport};
use serde::Serialize;

use crate::output::{pretty_kv, text_kv};

pub fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Serialize)]
pub struct LoadView {
    pub relation: &'static str,
    pub files: usize,
    pub rows: usize,
    pub elapsed_ms: u64,
}

impl From<&LoadReport> for LoadView {
    fn from(report: &LoadReport) -> Self {
        Self {
            relation: report.relation.table_name(),
            files: report.files,
            rows: report.rows,
            elapsed_ms: millis(report.elapsed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StagingView {
    pub events: LoadView,
    pub songs: LoadView,
}

impl From<&StagingReport> for StagingView {
    fn from(report: &StagingReport) -> Self {
        Self {
            events: LoadView::from(&report.events),
            songs: LoadView::from(&report.songs),
        }
    }
}

impl StagingView {
    pub fn write_text(&self, w: &mut dyn Write) -> io::Result<()> {
        for load in [&self.events, &self.songs] {
            writeln!(w, "{} files={} rows={}", load.relation, load.files, load.rows)?;
        }
        Ok(())
    }

    pub fn write_pretty(&self, w: &mut dyn Write) -> io::Result<()> {
        for load in [&self.events, &self.songs] {
            pretty_kv(
                w,
                load.relation,
                format!("{} rows from {} file(s) in {} ms", load.rows, load.files, load.elapsed_ms),
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct DimensionView {
    pub users: usize,
    pub songs: usize,
    pub artists: usize,
    pub time: usize,
    pub elapsed_ms: u64,
}

impl From<&DimensionReport> for DimensionView {
    fn from(report: &DimensionReport) -> Self {
        Self {
            users: report.users,
            songs: report.songs,
            artists: report.artists,
            time: report.time,
            elapsed_ms: millis(report.elapsed),
        }
    }
}

impl DimensionView {
    fn rows(&self) -> [(&'static str, usize); 4] {
        [
            ("users", self.users),
            ("songs", self.songs),
            ("artists", self.artists),
            ("time", self.time),
        ]
    }

    pub fn write_text(&self, w: &mut dyn Write) -> io::Result<()> {
        for (table, rows) in self.rows() {
            text_kv(w, table, rows)?;
        }
        Ok(())
    }

    pub fn write_pretty(&self, w: &mut dyn Write) -> io::Result<()> {
        for (table, rows) in self.rows() {
            pretty_kv(w, table, format!("{rows} rows"))?;
        }
        pretty_kv(w, "elapsed", format!("{} ms", self.elapsed_ms))
    }
}

#[derive(Debug, Serialize)]
pub struct MergeView {
    pub candidates: usize,
    pub evicted: usize,
    pub inserted: usize,
    pub fact_rows: usize,
    pub elapsed_ms: u64,
}

impl From<&MergeReport> for MergeView {
    fn from(report: &MergeReport) -> Self {
        Self {
            candidates: report.candidates,
            evicted: report.evicted,
            inserted: report.inserted,
            fact_rows: report.fact_rows,
            elapsed_ms: millis(report.elapsed),
        }
    }
}

impl MergeView {
    pub fn write_text(&self, w: &mut dyn Write) -> io::Result<()> {
        text_kv(w, "candidates", self.candidates)?;
        text_kv(w, "evicted", self.evicted)?;
        text_kv(w, "inserted", self.inserted)?;
        text_kv(w, "fact_rows", self.fact_rows)
    }

    pub fn write_pretty(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_kv(w, "candidates", self.candidates.to_string())?;
        pretty_kv(w, "evicted", self.evicted.to_string())?;
        pretty_kv(w, "inserted", self.inserted.to_string())?;
        pretty_kv(w, "songplays", format!("{} rows", self.fact_rows))?;
        pretty_kv(w, "elapsed", format!("{} ms", self.elapsed_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playmart_core::staging::StagingRelation;

    #[test]
    fn load_view_names_the_table() {
        let view = LoadView::from(&LoadReport {
            relation: StagingRelation::Songs,
            files: 2,
            rows: 7,
            elapsed: Duration::from_millis(12),
        });
        let json = serde_json::to_value(&view).expect("json");
        assert_eq!(
            json,
            serde_json::json!({
                "relation": "staging_songs",
                "files": 2,
                "rows": 7,
                "elapsed_ms": 12,
            })
        );
    }

    #[test]
    fn merge_view_text_lines() {
        let view = MergeView::from(&MergeReport {
            candidates: 3,
            evicted: 1,
            inserted: 3,
            fact_rows: 5,
            elapsed: Duration::ZERO,
        });
        let mut buf = Vec::new();
        view.write_text(&mut buf).expect("write");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "candidates 3\nevicted 1\ninserted 3\nfact_rows 5\n"
        );
    }
}
