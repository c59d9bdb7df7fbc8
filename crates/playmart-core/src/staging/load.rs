use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Statement, params_from_iter};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::jsonpath::JsonPath;
use super::{ColumnKind, JsonFormat, LoadReport, LoadRequest, StagingColumn, StagingRelation};
use crate::db::{self, Progress};
use crate::error::LoadError;

/// Replace a staging relation with every record found at the request source.
///
/// The delete and all inserts share one transaction: on any error the
/// relation keeps its previous contents.
///
/// # Errors
///
/// Returns [`LoadError`] if the source cannot be listed or parsed, the
/// mapping is invalid, a listed file holds no records, or a write fails.
pub fn load(conn: &Connection, request: &LoadRequest) -> Result<LoadReport, LoadError> {
    let start = Instant::now();
    let relation = request.relation;
    let table = relation.table_name();

    tracing::info!(
        relation = table,
        source = %request.source,
        credential_ref = request.credential_ref.as_deref().unwrap_or("-"),
        "loading staging relation"
    );

    let files = list_json_files(request.source.path())?;
    if files.is_empty() {
        return Err(LoadError::EmptySource {
            path: request.source.path().clone(),
        });
    }
    let mapping = Mapping::resolve(relation, &request.format)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(&format!("DELETE FROM {table}"), [])?;

    let mut records = 0;
    {
        let mut insert = tx.prepare(&insert_sql(relation))?;
        for file in &files {
            let read = load_file(&mut insert, file, relation.columns(), &mapping)?;
            tracing::debug!(relation = table, file = %file.display(), rows = read, "loaded file");
            records += read;
        }
    }

    db::record_progress(&tx, Progress::Load)?;
    tx.commit()?;

    let elapsed = start.elapsed();
    tracing::info!(
        relation = table,
        files = files.len(),
        rows = records,
        elapsed_ms = elapsed.as_millis(),
        "staging load complete"
    );

    Ok(LoadReport {
        relation,
        files: files.len(),
        rows: records,
        elapsed,
    })
}

// ---------------------------------------------------------------------------
// Source listing
// ---------------------------------------------------------------------------

/// A single file is loaded as-is; a directory is walked recursively for
/// `*.json` files, returned in path order.
fn list_json_files(root: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let metadata = fs::metadata(root).map_err(|source| io_error(root, source))?;
    if metadata.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    collect_json_files(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), LoadError> {
    let entries = fs::read_dir(dir).map_err(|source| io_error(dir, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| io_error(dir, source))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|source| io_error(&path, source))?;

        if file_type.is_dir() {
            collect_json_files(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            out.push(path);
        }
    }
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> LoadError {
    LoadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

enum Mapping {
    Exact,
    IgnoreCase,
    Paths(Vec<JsonPath>),
}

#[derive(Deserialize)]
struct JsonPathsFile {
    jsonpaths: Vec<String>,
}

impl Mapping {
    fn resolve(relation: StagingRelation, format: &JsonFormat) -> Result<Self, LoadError> {
        match format {
            JsonFormat::Auto => Ok(Self::Exact),
            JsonFormat::AutoIgnoreCase => Ok(Self::IgnoreCase),
            JsonFormat::JsonPaths(path) => read_jsonpaths(path, relation.columns().len()),
        }
    }

    fn row(&self, record: &Value, fields: &Map<String, Value>, columns: &[StagingColumn]) -> Vec<SqlValue> {
        match self {
            Self::Exact => columns
                .iter()
                .map(|column| to_sql(fields.get(column.name), column.kind))
                .collect(),
            Self::IgnoreCase => {
                let folded: HashMap<String, &Value> = fields
                    .iter()
                    .map(|(key, value)| (key.to_ascii_lowercase(), value))
                    .collect();
                columns
                    .iter()
                    .map(|column| to_sql(folded.get(column.name).copied(), column.kind))
                    .collect()
            }
            Self::Paths(paths) => columns
                .iter()
                .zip(paths)
                .map(|(column, path)| to_sql(path.select(record), column.kind))
                .collect(),
        }
    }
}

fn read_jsonpaths(path: &Path, expected: usize) -> Result<Mapping, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    let document: JsonPathsFile =
        serde_json::from_str(&content).map_err(|err| LoadError::InvalidJsonPaths {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

    let paths = document
        .jsonpaths
        .iter()
        .map(|expr| JsonPath::parse(expr))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| LoadError::InvalidJsonPath {
            path: path.to_path_buf(),
            source,
        })?;

    if paths.len() != expected {
        return Err(LoadError::JsonPathsArity {
            path: path.to_path_buf(),
            expected,
            found: paths.len(),
        });
    }

    Ok(Mapping::Paths(paths))
}

/// Coerce one JSON value into the storage class of its column.
///
/// Empty strings are NULL outside text columns. Strings that do not parse
/// as numbers are kept as text so transforms can reject them explicitly.
fn to_sql(value: Option<&Value>, kind: ColumnKind) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(flag)) => SqlValue::Integer(i64::from(*flag)),
        Some(Value::Number(number)) => match kind {
            ColumnKind::Text => SqlValue::Text(number.to_string()),
            ColumnKind::Integer => number.as_i64().map_or_else(
                || number.as_f64().map_or(SqlValue::Null, SqlValue::Real),
                SqlValue::Integer,
            ),
            ColumnKind::Real => number.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Some(Value::String(text)) => match kind {
            ColumnKind::Text => SqlValue::Text(text.clone()),
            _ if text.trim().is_empty() => SqlValue::Null,
            ColumnKind::Integer => text
                .trim()
                .parse::<i64>()
                .map_or_else(|_| SqlValue::Text(text.clone()), SqlValue::Integer),
            ColumnKind::Real => text
                .trim()
                .parse::<f64>()
                .map_or_else(|_| SqlValue::Text(text.clone()), SqlValue::Real),
        },
        Some(nested) => SqlValue::Text(nested.to_string()),
    }
}

// ---------------------------------------------------------------------------
// File ingestion
// ---------------------------------------------------------------------------

fn insert_sql(relation: StagingRelation) -> String {
    let columns = relation.columns();
    let names = columns
        .iter()
        .map(|column| column.name)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({names}) VALUES ({placeholders})",
        relation.table_name()
    )
}

/// Insert every record of one file. Files hold JSON objects either one per
/// line or simply concatenated; a file without any object is an error.
fn load_file(
    insert: &mut Statement<'_>,
    path: &Path,
    columns: &[StagingColumn],
    mapping: &Mapping,
) -> Result<usize, LoadError> {
    let content = fs::read_to_string(path).map_err(|source| io_error(path, source))?;
    let stream = serde_json::Deserializer::from_str(&content).into_iter::<Value>();

    let mut rows = 0;
    for (idx, item) in stream.enumerate() {
        let record = idx + 1;
        let value = item.map_err(|source| LoadError::MalformedRecord {
            path: path.to_path_buf(),
            record,
            source,
        })?;
        let Some(fields) = value.as_object() else {
            return Err(LoadError::NotAnObject {
                path: path.to_path_buf(),
                record,
            });
        };

        insert.execute(params_from_iter(mapping.row(&value, fields, columns)))?;
        rows += 1;
    }

    if rows == 0 {
        return Err(LoadError::EmptyFile {
            path: path.to_path_buf(),
        });
    }
    Ok(rows)
}
