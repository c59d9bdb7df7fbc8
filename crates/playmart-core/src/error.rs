use std::fmt;
use std::path::PathBuf;

use crate::staging::jsonpath::JsonPathError;

/// Pipeline stage that produced an error or a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connect,
    Migrate,
    LoadEvents,
    LoadSongs,
    BuildUsers,
    BuildSongs,
    BuildArtists,
    BuildTime,
    MergeSongplays,
    Query,
}

impl Stage {
    /// Stable stage label used in logs and JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Migrate => "migrate",
            Self::LoadEvents => "load:staging_events",
            Self::LoadSongs => "load:staging_songs",
            Self::BuildUsers => "build:users",
            Self::BuildSongs => "build:songs",
            Self::BuildArtists => "build:artists",
            Self::BuildTime => "build:time",
            Self::MergeSongplays => "merge:songplays",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable error codes for operators and orchestrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    WarehouseUnreachable,
    ConfigParseError,
    SchemaMigrationFailed,
    UnsupportedSource,
    SourceMissing,
    MalformedSource,
    JsonPathsInvalid,
    RowCountMismatch,
    StagingWriteFailed,
    MalformedTimestamp,
    ConstraintViolation,
    TransformQueryFailed,
    QueryFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::WarehouseUnreachable => "E1001",
            Self::ConfigParseError => "E1002",
            Self::SchemaMigrationFailed => "E1003",
            Self::UnsupportedSource => "E2001",
            Self::SourceMissing => "E2002",
            Self::MalformedSource => "E2003",
            Self::JsonPathsInvalid => "E2004",
            Self::RowCountMismatch => "E2005",
            Self::StagingWriteFailed => "E2006",
            Self::MalformedTimestamp => "E3001",
            Self::ConstraintViolation => "E3002",
            Self::TransformQueryFailed => "E3003",
            Self::QueryFailed => "E4001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::WarehouseUnreachable => "Warehouse unreachable",
            Self::ConfigParseError => "Config file parse error",
            Self::SchemaMigrationFailed => "Schema migration failed",
            Self::UnsupportedSource => "Unsupported source URI",
            Self::SourceMissing => "Source has no data files",
            Self::MalformedSource => "Malformed source record",
            Self::JsonPathsInvalid => "Invalid JSONPaths mapping",
            Self::RowCountMismatch => "Loaded fewer rows than the source listed",
            Self::StagingWriteFailed => "Staging write failed",
            Self::MalformedTimestamp => "Malformed event timestamp",
            Self::ConstraintViolation => "Analytical table constraint violated",
            Self::TransformQueryFailed => "Transform query failed",
            Self::QueryFailed => "Read query failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::WarehouseUnreachable => {
                Some("Check warehouse.path and that the warehouse is accepting connections.")
            }
            Self::ConfigParseError => Some("Fix syntax in playmart.toml and retry."),
            Self::SchemaMigrationFailed => Some("Run `playmart reset` to recreate the schema."),
            Self::UnsupportedSource => Some("Use a local path or a file:// URI."),
            Self::SourceMissing => Some("Point the source at a directory containing *.json files."),
            Self::MalformedSource => {
                Some("Fix or remove the offending file, then rerun the load.")
            }
            Self::JsonPathsInvalid => {
                Some("The JSONPaths file needs one expression per staging column, in order.")
            }
            Self::RowCountMismatch | Self::StagingWriteFailed => {
                Some("Rerun the load; staging must not feed a merge until it succeeds.")
            }
            Self::MalformedTimestamp | Self::ConstraintViolation => {
                Some("Fix the staging data and rerun the failed stage; committed stages are intact.")
            }
            Self::TransformQueryFailed => Some("Rerun the failed stage; it is safe to repeat."),
            Self::QueryFailed => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failure of the bulk-load primitive.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unsupported source uri '{uri}': only local paths and file:// are loadable")]
    UnsupportedScheme { uri: String },

    #[error("source {} contains no .json files", .path.display())]
    EmptySource { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {} at record {record}: {source}", .path.display())]
    MalformedRecord {
        path: PathBuf,
        record: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("record {record} in {} is not a JSON object", .path.display())]
    NotAnObject { path: PathBuf, record: usize },

    #[error("invalid JSONPaths file {}: {reason}", .path.display())]
    InvalidJsonPaths { path: PathBuf, reason: String },

    #[error("invalid expression in JSONPaths file {}: {source}", .path.display())]
    InvalidJsonPath {
        path: PathBuf,
        #[source]
        source: JsonPathError,
    },

    #[error("JSONPaths file {} has {found} expressions, relation has {expected} columns", .path.display())]
    JsonPathsArity {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("{} is listed in the source but holds no records", .path.display())]
    EmptyFile { path: PathBuf },

    #[error("staging write failed: {0}")]
    Sql(#[from] rusqlite::Error),
}

impl LoadError {
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedScheme { .. } => ErrorCode::UnsupportedSource,
            Self::EmptySource { .. } | Self::Io { .. } => ErrorCode::SourceMissing,
            Self::MalformedRecord { .. } | Self::NotAnObject { .. } => ErrorCode::MalformedSource,
            Self::InvalidJsonPaths { .. }
            | Self::InvalidJsonPath { .. }
            | Self::JsonPathsArity { .. } => ErrorCode::JsonPathsInvalid,
            Self::EmptyFile { .. } => ErrorCode::RowCountMismatch,
            Self::Sql(_) => ErrorCode::StagingWriteFailed,
        }
    }
}

/// Failure of a dimension build or the fact merge.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("staging_events.ts value {value} is not an epoch-millisecond integer")]
    MalformedTimestamp { value: String },

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

impl TransformError {
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::MalformedTimestamp { .. } => ErrorCode::MalformedTimestamp,
            Self::Sql(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::ConstraintViolation | rusqlite::ErrorCode::TypeMismatch
                ) =>
            {
                ErrorCode::ConstraintViolation
            }
            Self::Sql(_) => ErrorCode::TransformQueryFailed,
        }
    }
}

/// Top-level error for every exposed pipeline operation.
///
/// Each variant names the stage that failed so callers can report it and
/// decide which stage to re-run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("warehouse {target} unreachable after {attempts} attempt(s): {source}")]
    Connectivity {
        target: String,
        attempts: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{stage} failed: {source}")]
    Load {
        stage: Stage,
        #[source]
        source: LoadError,
    },

    #[error("{stage} failed: {source}")]
    Transform {
        stage: Stage,
        #[source]
        source: TransformError,
    },
}

impl PipelineError {
    pub(crate) fn transform(stage: Stage, source: impl Into<TransformError>) -> Self {
        Self::Transform {
            stage,
            source: source.into(),
        }
    }

    /// Stage that failed.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Connectivity { .. } => Stage::Connect,
            Self::Load { stage, .. } | Self::Transform { stage, .. } => *stage,
        }
    }

    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connectivity { .. } => ErrorCode::WarehouseUnreachable,
            Self::Load { source, .. } => source.error_code(),
            Self::Transform {
                stage: Stage::Migrate,
                ..
            } => ErrorCode::SchemaMigrationFailed,
            Self::Transform {
                stage: Stage::Query,
                ..
            } => ErrorCode::QueryFailed,
            Self::Transform { source, .. } => source.error_code(),
        }
    }

    /// Remediation text for terminal and JSON output.
    #[must_use]
    pub fn suggestion(&self) -> String {
        let code = self.error_code();
        code.hint().map_or_else(
            || format!("{} ({code}) during {}", code.message(), self.stage()),
            str::to_string,
        )
    }
}
