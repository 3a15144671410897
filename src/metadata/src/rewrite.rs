use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{MetadataError, ParseError};
use crate::record::{ENGINE_PREFIX, uuid_span};

/// Engine declaration written back into a database catalog file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineDeclaration {
    Atomic,
    Replicated {
        replica_path: String,
        shard: String,
        replica_name: String,
    },
}

impl fmt::Display for EngineDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineDeclaration::Atomic => write!(f, "{ENGINE_PREFIX} Atomic"),
            EngineDeclaration::Replicated {
                replica_path,
                shard,
                replica_name,
            } => write!(
                f,
                "{ENGINE_PREFIX} Replicated({}, {}, {})",
                quote(replica_path),
                quote(shard),
                quote(replica_name)
            ),
        }
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Replace the engine declaration line, keeping every other byte of the file.
pub fn rewrite_engine_line(
    path: &Path,
    declaration: &EngineDeclaration,
) -> Result<(), MetadataError> {
    let text = fs::read_to_string(path).map_err(|e| MetadataError::io(path, e))?;
    let rewritten = replace_engine_line(&text, &declaration.to_string())
        .map_err(|e| MetadataError::parse(path, e))?;
    write_in_place(path, &rewritten)?;

    tracing::info!(path = %path.display(), engine = %declaration, "Rewrote engine declaration");
    Ok(())
}

/// Replace the UUID literal on the `ATTACH` line. Returns the previous UUID.
pub fn rewrite_uuid(path: &Path, new_uuid: Uuid) -> Result<Uuid, MetadataError> {
    let text = fs::read_to_string(path).map_err(|e| MetadataError::io(path, e))?;
    let (old_uuid, rewritten) =
        replace_uuid(&text, new_uuid).map_err(|e| MetadataError::parse(path, e))?;
    write_in_place(path, &rewritten)?;

    tracing::info!(
        path = %path.display(),
        old_uuid = %old_uuid,
        new_uuid = %new_uuid,
        "Rewrote catalog UUID"
    );
    Ok(old_uuid)
}

fn replace_engine_line(text: &str, declaration: &str) -> Result<String, ParseError> {
    let engine_lines = text
        .split_inclusive('\n')
        .filter(|line| line.starts_with(ENGINE_PREFIX))
        .count();
    match engine_lines {
        0 => return Err(ParseError::MissingEngine),
        1 => {}
        count => return Err(ParseError::DuplicateEngine { count }),
    }

    let mut out = String::with_capacity(text.len() + declaration.len());
    for line in text.split_inclusive('\n') {
        if line.starts_with(ENGINE_PREFIX) {
            out.push_str(declaration);
            out.push_str(line_ending(line));
        } else {
            out.push_str(line);
        }
    }
    Ok(out)
}

fn replace_uuid(text: &str, new_uuid: Uuid) -> Result<(Uuid, String), ParseError> {
    let spans: Vec<_> = text
        .split_inclusive('\n')
        .scan(0usize, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some(uuid_span(line).map(|span| (start + span.start)..(start + span.end)))
        })
        .flatten()
        .collect();

    let span = match spans.as_slice() {
        [span] => span.clone(),
        [] => return Err(ParseError::MissingUuid),
        spans => return Err(ParseError::DuplicateUuid { count: spans.len() }),
    };

    let current = &text[span.clone()];
    let old_uuid = Uuid::parse_str(current).map_err(|_| ParseError::InvalidUuid {
        value: current.to_string(),
    })?;

    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..span.start]);
    out.push_str(&new_uuid.hyphenated().to_string());
    out.push_str(&text[span.end..]);
    Ok((old_uuid, out))
}

fn line_ending(line: &str) -> &str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}

/// Write through a temp file in the same directory and rename it over the
/// original, keeping the original's mode and owner.
fn write_in_place(path: &Path, contents: &str) -> Result<(), MetadataError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let write = || -> std::io::Result<()> {
        let original = fs::metadata(path)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.flush()?;
        tmp.as_file().set_permissions(original.permissions())?;
        copy_owner(&original, tmp.path())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    };
    write().map_err(|e| MetadataError::io(path, e))
}

#[cfg(unix)]
fn copy_owner(original: &fs::Metadata, tmp: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::MetadataExt;

    let created = fs::metadata(tmp)?;
    if (created.uid(), created.gid()) == (original.uid(), original.gid()) {
        return Ok(());
    }
    std::os::unix::fs::chown(tmp, Some(original.uid()), Some(original.gid()))
}

#[cfg(not(unix))]
fn copy_owner(_original: &fs::Metadata, _tmp: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_declaration_rendering() {
        assert_eq!(EngineDeclaration::Atomic.to_string(), "ENGINE = Atomic");
        assert_eq!(
            EngineDeclaration::Replicated {
                replica_path: "/clickhouse/db".to_string(),
                shard: "{shard}".to_string(),
                replica_name: "{replica}".to_string(),
            }
            .to_string(),
            "ENGINE = Replicated('/clickhouse/db', '{shard}', '{replica}')"
        );
    }

    #[test]
    fn test_replace_engine_line_keeps_crlf() {
        let text = "ATTACH DATABASE _ UUID 'x'\r\nENGINE = Atomic\r\nCOMMENT 'c'";
        let out = replace_engine_line(text, "ENGINE = Replicated('/p', 's', 'r')").unwrap();
        assert_eq!(
            out,
            "ATTACH DATABASE _ UUID 'x'\r\nENGINE = Replicated('/p', 's', 'r')\r\nCOMMENT 'c'"
        );
    }

    #[test]
    fn test_replace_engine_line_without_trailing_newline() {
        let out = replace_engine_line("ATTACH DATABASE _\nENGINE = Atomic", "ENGINE = X").unwrap();
        assert_eq!(out, "ATTACH DATABASE _\nENGINE = X");
    }

    #[test]
    fn test_replace_engine_line_requires_single_declaration() {
        assert_eq!(
            replace_engine_line("ATTACH DATABASE _\n", "ENGINE = Atomic"),
            Err(ParseError::MissingEngine)
        );
        assert_eq!(
            replace_engine_line("ENGINE = Atomic\nENGINE = Atomic\n", "ENGINE = Atomic"),
            Err(ParseError::DuplicateEngine { count: 2 })
        );
    }

    #[test]
    fn test_replace_uuid_only_touches_literal() {
        let old = "11111111-1111-1111-1111-111111111111";
        let new = Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap();
        let text = format!("ATTACH TABLE _ UUID '{old}'\n(\n    `id` UInt64\n)\nENGINE = MergeTree\n");

        let (previous, out) = replace_uuid(&text, new).unwrap();
        assert_eq!(previous.to_string(), old);
        assert_eq!(out, text.replace(old, &new.to_string()));
    }
}
