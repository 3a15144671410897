use std::fmt;
use std::path::Path;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{MetadataError, ParseError};

pub(crate) const ATTACH_PREFIX: &str = "ATTACH ";
pub(crate) const ATTACH_DATABASE_PREFIX: &str = "ATTACH DATABASE";
pub(crate) const UUID_MARKER: &str = "UUID '";
pub(crate) const ENGINE_PREFIX: &str = "ENGINE =";

/// Kind of object a catalog file describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Database,
    Table,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Database => "database",
            ObjectKind::Table => "table",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordination parameters of a replicated engine.
///
/// Database-level `Replicated` engines always carry a shard. Table-level
/// `Replicated*MergeTree` engines only name a replica path and a replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaParams {
    pub replica_path: String,
    pub shard: Option<String>,
    pub replica_name: String,
}

impl ReplicaParams {
    /// Whether the replica path template still holds the `{name}` macro.
    pub fn contains_macro(&self, name: &str) -> bool {
        self.replica_path.contains(&format!("{{{name}}}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Engine {
    NonReplicated,
    Replicated(ReplicaParams),
}

impl Engine {
    pub fn replica(&self) -> Option<&ReplicaParams> {
        match self {
            Engine::Replicated(params) => Some(params),
            Engine::NonReplicated => None,
        }
    }
}

/// Identity and engine of one catalog file. Always read fresh from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRecord {
    pub kind: ObjectKind,
    pub uuid: Uuid,
    /// Engine name as written, e.g. `Atomic` or `ReplicatedMergeTree`
    pub engine_name: String,
    pub engine: Engine,
}

impl CatalogRecord {
    /// Parse the text of a catalog file.
    ///
    /// Exactly one `ATTACH ... UUID '<uuid>'` line and exactly one `ENGINE =` line
    /// must be present.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut header = None;
        let mut uuid_lines = 0;
        let mut engine_line = None;
        let mut engine_lines = 0;

        for line in text.lines() {
            if let Some(found) = uuid_header(line) {
                uuid_lines += 1;
                header.get_or_insert(found);
            }
            if line.starts_with(ENGINE_PREFIX) {
                engine_lines += 1;
                engine_line.get_or_insert(line);
            }
        }

        let (kind, uuid) = match (header, uuid_lines) {
            (Some(found), 1) => found,
            (None, _) => return Err(ParseError::MissingUuid),
            (Some(_), count) => return Err(ParseError::DuplicateUuid { count }),
        };
        let engine_line = match (engine_line, engine_lines) {
            (Some(line), 1) => line,
            (None, _) => return Err(ParseError::MissingEngine),
            (Some(_), count) => return Err(ParseError::DuplicateEngine { count }),
        };

        let uuid = Uuid::parse_str(uuid).map_err(|_| ParseError::InvalidUuid {
            value: uuid.to_string(),
        })?;
        let (engine_name, engine) = parse_engine(kind, engine_line)?;

        Ok(Self {
            kind,
            uuid,
            engine_name,
            engine,
        })
    }
}

/// Read and parse the catalog file at `path`.
pub fn parse_catalog_file(path: &Path) -> Result<CatalogRecord, MetadataError> {
    let text = std::fs::read_to_string(path).map_err(|e| MetadataError::io(path, e))?;
    let record = CatalogRecord::parse(&text).map_err(|e| MetadataError::parse(path, e))?;

    tracing::debug!(
        path = %path.display(),
        kind = %record.kind,
        uuid = %record.uuid,
        engine = %record.engine_name,
        "Parsed catalog file"
    );
    Ok(record)
}

/// Object kind and raw UUID literal of an `ATTACH ... UUID '...'` line.
fn uuid_header(line: &str) -> Option<(ObjectKind, &str)> {
    if !line.starts_with(ATTACH_PREFIX) {
        return None;
    }
    let start = line.find(UUID_MARKER)? + UUID_MARKER.len();
    let rest = &line[start..];
    let value = rest.find('\'').map_or(rest, |end| &rest[..end]);

    let kind = if line.starts_with(ATTACH_DATABASE_PREFIX) {
        ObjectKind::Database
    } else {
        ObjectKind::Table
    };
    Some((kind, value))
}

/// Byte range of the UUID literal within an `ATTACH` line, if it has one.
pub(crate) fn uuid_span(line: &str) -> Option<std::ops::Range<usize>> {
    if !line.starts_with(ATTACH_PREFIX) {
        return None;
    }
    let start = line.find(UUID_MARKER)? + UUID_MARKER.len();
    let end = start + line[start..].find('\'')?;
    Some(start..end)
}

fn parse_engine(kind: ObjectKind, line: &str) -> Result<(String, Engine), ParseError> {
    let declaration = line[ENGINE_PREFIX.len()..].trim_start();
    let name_len = declaration
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(declaration.len());
    let (name, args) = declaration.split_at(name_len);

    let engine = match (kind, name) {
        (_, "Atomic") => Engine::NonReplicated,
        (_, "Replicated") => {
            let params = quoted_params(args)?;
            match <[String; 3]>::try_from(params) {
                Ok([replica_path, shard, replica_name]) => Engine::Replicated(ReplicaParams {
                    replica_path,
                    shard: Some(shard),
                    replica_name,
                }),
                Err(params) => {
                    return Err(ParseError::ReplicatedArity {
                        engine: name.to_string(),
                        expected: "exactly 3",
                        found: params.len(),
                    });
                }
            }
        }
        (ObjectKind::Table, name) if is_replicated_merge_tree(name) => {
            let mut params = quoted_params(args)?.into_iter();
            match (params.next(), params.next()) {
                (Some(replica_path), Some(replica_name)) => Engine::Replicated(ReplicaParams {
                    replica_path,
                    shard: None,
                    replica_name,
                }),
                (first, _) => {
                    return Err(ParseError::ReplicatedArity {
                        engine: name.to_string(),
                        expected: "at least 2",
                        found: usize::from(first.is_some()),
                    });
                }
            }
        }
        (ObjectKind::Table, name) if !name.is_empty() => Engine::NonReplicated,
        (kind, name) => {
            return Err(ParseError::UnsupportedEngine {
                kind: kind.as_str(),
                engine: name.to_string(),
            });
        }
    };

    Ok((name.to_string(), engine))
}

fn is_replicated_merge_tree(name: &str) -> bool {
    name.starts_with("Replicated") && name.ends_with("MergeTree")
}

/// Single-quoted arguments of the first parenthesised argument list.
fn quoted_params(args: &str) -> Result<Vec<String>, ParseError> {
    let Some(open) = args.find('(') else {
        return Ok(Vec::new());
    };

    let mut params = Vec::new();
    let mut chars = args[open + 1..].chars();
    let mut depth = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '\'' => params.push(read_quoted(&mut chars)?),
            '(' => depth += 1,
            ')' if depth == 0 => break,
            ')' => depth -= 1,
            _ => {}
        }
    }
    Ok(params)
}

/// Read a single-quoted literal up to its closing quote.
///
/// The server escapes `\` and `'` with a backslash when it writes catalog
/// files, so a backslash here always escapes the next character. A raw
/// backslash written by hand is dropped.
fn read_quoted(chars: &mut std::str::Chars<'_>) -> Result<String, ParseError> {
    let mut value = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => value.push(chars.next().ok_or(ParseError::UnterminatedQuote)?),
            '\'' => return Ok(value),
            c => value.push(c),
        }
    }
    Err(ParseError::UnterminatedQuote)
}
