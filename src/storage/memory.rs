use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use super::{ObjectStore, StorageError};

/// In-process [`ObjectStore`]. Buckets must be created before use; buckets
/// marked forbidden reject every request, forbidden objects reject reads and
/// writes of that key only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, Bytes>>>,
    forbidden: BTreeSet<String>,
    forbidden_objects: BTreeSet<(String, String)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        self.lock().entry(bucket.to_string()).or_default();
        self
    }

    pub fn with_forbidden_bucket(mut self, bucket: &str) -> Self {
        self.forbidden.insert(bucket.to_string());
        self
    }

    pub fn with_forbidden_object(mut self, bucket: &str, key: &str) -> Self {
        self.forbidden_objects
            .insert((bucket.to_string(), key.to_string()));
        self
    }

    /// Stores an object, creating the bucket if needed.
    pub fn put(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body.into());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock().get(bucket)?.get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, BTreeMap<String, Bytes>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_access(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let object = (bucket.to_string(), key.to_string());
        if self.forbidden.contains(bucket) || self.forbidden_objects.contains(&object) {
            return Err(StorageError::Forbidden {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn not_found(bucket: &str, key: &str) -> StorageError {
        StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        self.check_access(bucket, "")?;
        Ok(self.lock().contains_key(bucket))
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        self.check_access(bucket, key)?;
        Ok(self.get(bucket, key).is_some())
    }

    async fn download(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError> {
        self.check_access(bucket, key)?;
        let body = self
            .get(bucket, key)
            .ok_or_else(|| Self::not_found(bucket, key))?;
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(local_path, &body)?;
        Ok(())
    }

    async fn upload(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.check_access(bucket, key)?;
        let body = fs::read(local_path)?;
        let mut buckets = self.lock();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::not_found(bucket, key))?;
        objects.insert(key.to_string(), Bytes::from(body));
        Ok(())
    }

    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        self.check_access(bucket, "")?;
        let buckets = self.lock();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| Self::not_found(bucket, ""))?;
        Ok(objects.keys().cloned().collect())
    }
}
