//! Object storage access.
//!
//! [`ObjectStore`] is the capability set the jobs need from a bucket.
//! [`S3Store`] implements it on AWS S3; [`MemoryStore`] keeps objects in
//! process for tests and dry runs.

mod memory;
mod s3;

pub use memory::MemoryStore;
pub use s3::S3Store;

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;

use crate::files::DATE_FORMAT;

#[derive(Debug, Error)]
pub enum StorageError {
    /// 404: the caller decides whether to skip or abort.
    #[error("s3://{bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    /// 403: always fatal.
    #[error("access to s3://{bucket}/{key} is forbidden")]
    Forbidden { bucket: String, key: String },

    #[error("storage request on s3://{bucket}/{key} failed: {message}")]
    Service {
        bucket: String,
        key: String,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(false)` when the bucket does not exist; forbidden buckets are errors.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    /// `Ok(false)` when the object does not exist; forbidden objects are errors.
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError>;

    async fn download(&self, bucket: &str, key: &str, local_path: &Path)
    -> Result<(), StorageError>;

    async fn upload(&self, local_path: &Path, bucket: &str, key: &str)
    -> Result<(), StorageError>;

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StorageError>;

    /// Dates of the objects in `bucket`, read from the key prefix before the
    /// first `.`, ascending. Keys without a date prefix are skipped.
    async fn list_available_dates(&self, bucket: &str) -> Result<Vec<NaiveDate>, StorageError> {
        let mut dates = Vec::new();
        for key in self.list_keys(bucket).await? {
            let prefix = key.split('.').next().unwrap_or_default();
            match NaiveDate::parse_from_str(prefix, DATE_FORMAT) {
                Ok(date) => dates.push(date),
                Err(_) => warn!(bucket, key = %key, "Object key has no date prefix"),
            }
        }
        dates.sort();
        dates.dedup();
        Ok(dates)
    }
}
