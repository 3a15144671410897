//! Reading and rewriting the server's own catalog files.
//!
//! A catalog file (`metadata/<db>.sql` or `metadata/<db>/<table>.sql`) is an
//! `ATTACH` statement. Only two of its lines matter here: the `ATTACH ... UUID '...'`
//! header and the `ENGINE = ...` declaration.

pub mod error;
pub mod layout;
pub mod record;
pub mod rewrite;

pub use error::{MetadataError, ParseError};
pub use layout::{CatalogLayout, TableSelector, escape_for_file_name, store_relative_path};
pub use record::{CatalogRecord, Engine, ObjectKind, ReplicaParams, parse_catalog_file};
pub use rewrite::{EngineDeclaration, rewrite_engine_line, rewrite_uuid};
