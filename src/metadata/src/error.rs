use std::path::PathBuf;

/// Structural problems in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no UUID marker on an ATTACH line")]
    MissingUuid,
    #[error("UUID marker appears {count} times, expected once")]
    DuplicateUuid { count: usize },
    #[error("invalid UUID '{value}'")]
    InvalidUuid { value: String },
    #[error("no ENGINE declaration")]
    MissingEngine,
    #[error("ENGINE declaration appears {count} times, expected once")]
    DuplicateEngine { count: usize },
    #[error("unsupported {kind} engine '{engine}'")]
    UnsupportedEngine { kind: &'static str, engine: String },
    #[error("engine {engine} takes {expected} quoted parameters, found {found}")]
    ReplicatedArity {
        engine: String,
        expected: &'static str,
        found: usize,
    },
    #[error("unterminated quoted parameter in ENGINE declaration")]
    UnterminatedQuote,
}

/// Failures reading or writing a catalog file.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to access catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed catalog file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

impl MetadataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, source: ParseError) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Io { path, .. } | Self::Parse { path, .. } => path,
        }
    }
}
