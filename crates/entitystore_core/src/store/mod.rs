//! Flat-file storage for entity records.
//!
//! # Responsibility
//! - Own the on-disk representation of every persisted entity record.
//! - Map `(entity type, primary key)` to one attribute record.
//!
//! # Invariants
//! - The backing file is readable and writable once `DataStore::open` returns.
//! - In-memory mutations never touch disk; only `save` does.
//! - Read and write paths use the same JSON encoding.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

mod data_store;

pub use data_store::{DataStore, StoreSnapshot};

pub type StoreResult<T> = Result<T, StoreError>;

/// File operation that failed while touching the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Create,
    Permission,
    Read,
    Write,
}

impl StoreAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Permission => "set permissions on",
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    /// Backing file cannot be created, permissioned, read or written.
    Unavailable {
        path: PathBuf,
        action: StoreAction,
        source: io::Error,
    },
    /// Backing file content is not a valid store snapshot.
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    Encode(serde_json::Error),
}

impl StoreError {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, action: StoreAction, source: io::Error) -> Self {
        Self::Unavailable {
            path: path.into(),
            action,
            source,
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable {
                path,
                action,
                source,
            } => write!(
                f,
                "data store file `{}` is unavailable: could not {} it: {source}",
                path.display(),
                action.as_str()
            ),
            Self::Corrupt { path, source } => write!(
                f,
                "data store file `{}` holds an invalid snapshot: {source}",
                path.display()
            ),
            Self::Encode(err) => write!(f, "failed to encode data store snapshot: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unavailable { source, .. } => Some(source),
            Self::Corrupt { source, .. } => Some(source),
            Self::Encode(err) => Some(err),
        }
    }
}
