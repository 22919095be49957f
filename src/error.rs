//! Error taxonomy shared by the ingestion and reporting modules.
//!
//! Per-file failures ([`Error::Format`], [`Error::Parse`], [`Error::ShortRow`])
//! cost that file its contribution. Reference table failures abort the run.

use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StorageError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The file looked like a zip or gzip container but could not be decoded.
    #[error("{}: unrecognized container: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// A value field did not hold a number.
    #[error("{}:{line}: invalid numeric field {field:?}", path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        field: String,
    },

    #[error("{}:{line}: expected at least {expected} fields, found {found}", path.display())]
    ShortRow {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("reference table {} not found", path.display())]
    MissingTable { path: PathBuf },

    #[error("{}: invalid reference table: {reason}", path.display())]
    Table { path: PathBuf, reason: String },

    #[error("{0}")]
    Validation(String),

    #[error("cannot encode {0:?} as latin-1")]
    Unencodable(char),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for failures that only cost the current file its contribution.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            Error::Format { .. } | Error::Parse { .. } | Error::ShortRow { .. }
        )
    }
}
