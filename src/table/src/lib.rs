//! Table identity mutation and detached-table removal.
//!
//! Both orchestrators work across three stores that fail independently: the
//! local catalog file, the storage directory trees of every disk, and the
//! coordination service. No step is retried and nothing is rolled back; every
//! failure ends the operation with a [`TableError`] naming the affected table.

pub mod catalog;
pub mod coordination;
pub mod disks;
pub mod error;
pub mod purge;
pub mod uuid_change;

pub use catalog::{LiveCatalog, TableInfo};
pub use coordination::{ClickhouseCoordination, CoordinationService, ReplicaCleanup, expand_macros};
pub use disks::{
    ClickhouseDisksRemover, DiskDescriptor, DiskRemover, DiskResolver, DiskRole, RemoverOutput,
    RemoverSyntax, classify_disks,
};
pub use error::{ErrorKind, TableError, ValidationError};
pub use metadata::TableSelector;
pub use purge::{DetachedTablePurger, PurgeReport};
pub use uuid_change::{UuidChangeCoordinator, UuidChangeReport, UuidChangeState};
