//! Bulk loading of raw JSON into the staging relations.
//!
//! Staging is a landing zone: no keys, no constraints, replaced wholesale on
//! every load. Everything downstream reads from here.

pub mod jsonpath;
mod load;

pub use load::load;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::db::schema;
use crate::error::{LoadError, Stage};

/// Storage class of a staging column, used to coerce JSON values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingColumn {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> StagingColumn {
    StagingColumn { name, kind }
}

/// `staging_events` columns in table order.
pub const EVENT_COLUMNS: &[StagingColumn] = &[
    col("artist", ColumnKind::Text),
    col("auth", ColumnKind::Text),
    col("first_name", ColumnKind::Text),
    col("gender", ColumnKind::Text),
    col("item_in_session", ColumnKind::Integer),
    col("last_name", ColumnKind::Text),
    col("length", ColumnKind::Real),
    col("level", ColumnKind::Text),
    col("location", ColumnKind::Text),
    col("method", ColumnKind::Text),
    col("page", ColumnKind::Text),
    col("registration", ColumnKind::Real),
    col("session_id", ColumnKind::Integer),
    col("song", ColumnKind::Text),
    col("status", ColumnKind::Integer),
    col("ts", ColumnKind::Integer),
    col("user_agent", ColumnKind::Text),
    col("user_id", ColumnKind::Integer),
];

/// `staging_songs` columns in table order.
pub const SONG_COLUMNS: &[StagingColumn] = &[
    col("num_songs", ColumnKind::Integer),
    col("artist_id", ColumnKind::Text),
    col("artist_latitude", ColumnKind::Real),
    col("artist_longitude", ColumnKind::Real),
    col("artist_location", ColumnKind::Text),
    col("artist_name", ColumnKind::Text),
    col("song_id", ColumnKind::Text),
    col("title", ColumnKind::Text),
    col("duration", ColumnKind::Real),
    col("year", ColumnKind::Integer),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagingRelation {
    Events,
    Songs,
}

impl StagingRelation {
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Events => schema::STAGING_EVENTS,
            Self::Songs => schema::STAGING_SONGS,
        }
    }

    #[must_use]
    pub const fn columns(self) -> &'static [StagingColumn] {
        match self {
            Self::Events => EVENT_COLUMNS,
            Self::Songs => SONG_COLUMNS,
        }
    }

    /// Stage reported when loading this relation fails.
    #[must_use]
    pub const fn stage(self) -> Stage {
        match self {
            Self::Events => Stage::LoadEvents,
            Self::Songs => Stage::LoadSongs,
        }
    }
}

impl fmt::Display for StagingRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// A loadable source location: a local path or a `file://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUri {
    raw: String,
    path: PathBuf,
}

impl SourceUri {
    /// Parse a source location.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::UnsupportedScheme`] for any scheme other than
    /// `file`, including object-store URIs such as `s3://bucket/prefix`.
    pub fn parse(raw: &str) -> Result<Self, LoadError> {
        let raw = raw.trim();
        let path = match raw.split_once("://") {
            None => PathBuf::from(raw),
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("file") => {
                let local = rest.strip_prefix("localhost").unwrap_or(rest);
                if !local.starts_with('/') {
                    return Err(LoadError::UnsupportedScheme { uri: raw.into() });
                }
                PathBuf::from(local)
            }
            Some(_) => return Err(LoadError::UnsupportedScheme { uri: raw.into() }),
        };

        Ok(Self {
            raw: raw.into(),
            path,
        })
    }

    #[must_use]
    pub const fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl fmt::Display for SourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// How JSON object fields are mapped onto staging columns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JsonFormat {
    /// Keys match column names exactly.
    #[default]
    Auto,
    /// Keys match column names ignoring ASCII case.
    AutoIgnoreCase,
    /// A `{"jsonpaths": [...]}` file, one expression per column in table
    /// order.
    JsonPaths(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub relation: StagingRelation,
    pub source: SourceUri,
    /// Access reference forwarded by object-store loaders. Only logged here.
    pub credential_ref: Option<String>,
    pub format: JsonFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub relation: StagingRelation,
    pub files: usize,
    pub rows: usize,
    pub elapsed: Duration,
}
