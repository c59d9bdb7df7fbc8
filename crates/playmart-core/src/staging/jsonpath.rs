//! Minimal JSONPath subset used by JSONPaths mapping files.
//!
//! Supported forms: `$`, `$.key`, `$['key']`, `$["key"]`, `[n]` array indexes,
//! and any chain of those (`$['song']['artists'][0].name`). Wildcards, slices
//! and filters are rejected.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsonPathError {
    #[error("expression '{expr}' must start with '$'")]
    MissingRoot { expr: String },

    #[error("unexpected '{found}' at offset {offset} in '{expr}'")]
    Unexpected {
        expr: String,
        offset: usize,
        found: char,
    },

    #[error("unterminated bracket in '{expr}'")]
    Unterminated { expr: String },

    #[error("empty key at offset {offset} in '{expr}'")]
    EmptyKey { expr: String, offset: usize },

    #[error("array index '{index}' in '{expr}' is not a non-negative integer")]
    BadIndex { expr: String, index: String },
}

impl JsonPath {
    /// Parse a path expression.
    ///
    /// # Errors
    ///
    /// Returns [`JsonPathError`] when the expression is outside the supported
    /// subset.
    pub fn parse(expr: &str) -> Result<Self, JsonPathError> {
        let raw = expr.trim();
        let Some(rest) = raw.strip_prefix('$') else {
            return Err(JsonPathError::MissingRoot { expr: raw.into() });
        };

        let chars: Vec<char> = rest.chars().collect();
        let mut segments = Vec::new();
        let mut pos = 0;

        while pos < chars.len() {
            match chars[pos] {
                '.' => {
                    let start = pos + 1;
                    let end = chars[start..]
                        .iter()
                        .position(|c| matches!(c, '.' | '['))
                        .map_or(chars.len(), |offset| start + offset);
                    if end == start {
                        return Err(JsonPathError::EmptyKey {
                            expr: raw.into(),
                            offset: start + 1,
                        });
                    }
                    segments.push(Segment::Key(chars[start..end].iter().collect()));
                    pos = end;
                }
                '[' => {
                    let (segment, next) = parse_bracket(raw, &chars, pos)?;
                    segments.push(segment);
                    pos = next;
                }
                other => {
                    return Err(JsonPathError::Unexpected {
                        expr: raw.into(),
                        offset: pos + 1,
                        found: other,
                    });
                }
            }
        }

        Ok(Self {
            raw: raw.into(),
            segments,
        })
    }

    /// Resolve the path against `value`. Missing keys, out-of-range indexes
    /// and type mismatches all yield `None`.
    #[must_use]
    pub fn select<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| match segment {
                Segment::Key(key) => current.as_object()?.get(key),
                Segment::Index(index) => current.as_array()?.get(*index),
            })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn parse_bracket(raw: &str, chars: &[char], open: usize) -> Result<(Segment, usize), JsonPathError> {
    let unterminated = || JsonPathError::Unterminated { expr: raw.into() };

    match chars.get(open + 1) {
        Some(&quote) if quote == '\'' || quote == '"' => {
            let start = open + 2;
            let close = chars
                .get(start..)
                .and_then(|tail| tail.iter().position(|c| *c == quote))
                .map(|offset| start + offset)
                .ok_or_else(unterminated)?;
            if chars.get(close + 1) != Some(&']') {
                return Err(unterminated());
            }
            if close == start {
                return Err(JsonPathError::EmptyKey {
                    expr: raw.into(),
                    offset: start + 1,
                });
            }
            Ok((Segment::Key(chars[start..close].iter().collect()), close + 2))
        }
        Some(_) => {
            let start = open + 1;
            let close = chars[start..]
                .iter()
                .position(|c| *c == ']')
                .map(|offset| start + offset)
                .ok_or_else(unterminated)?;
            let index: String = chars[start..close].iter().collect();
            let parsed = index
                .trim()
                .parse::<usize>()
                .map_err(|_| JsonPathError::BadIndex {
                    expr: raw.into(),
                    index: index.clone(),
                })?;
            Ok((Segment::Index(parsed), close + 1))
        }
        None => Err(unterminated()),
    }
}

impl FromStr for JsonPath {
    type Err = JsonPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
