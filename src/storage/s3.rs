use std::fs;
use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use super::{ObjectStore, StorageError};

/// [`ObjectStore`] backed by AWS S3.
///
/// Credentials and region come from the ambient AWS configuration. Requests
/// are not retried beyond what the SDK does on its own.
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(config),
        }
    }

    /// Builds a store from `aws_config::load_from_env`.
    pub async fn from_env() -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(&config)
    }
}

/// Maps an SDK failure to [`StorageError`] by HTTP status.
fn classify<E>(err: SdkError<E, HttpResponse>, bucket: &str, key: &str) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let bucket = bucket.to_string();
    let key = key.to_string();
    match err.raw_response().map(|r| r.status().as_u16()) {
        Some(404) => StorageError::NotFound { bucket, key },
        Some(403) => StorageError::Forbidden { bucket, key },
        _ => StorageError::Service {
            bucket,
            key,
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

fn not_found_as_false(result: Result<(), StorageError>) -> Result<bool, StorageError> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[tracing::instrument(skip(self))]
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        let result = self
            .client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify(e, bucket, ""));
        not_found_as_false(result)
    }

    #[tracing::instrument(skip(self))]
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StorageError> {
        let result = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| classify(e, bucket, key));
        not_found_as_false(result)
    }

    #[tracing::instrument(skip(self), fields(local_path = %local_path.display()))]
    async fn download(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, bucket, key))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Service {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?
            .into_bytes();

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(local_path, &body)?;
        info!(bytes = body.len(), "Object downloaded");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(local_path = %local_path.display()))]
    async fn upload(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), StorageError> {
        let body = fs::read(local_path)?;
        let size = body.len();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify(e, bucket, key))?;

        info!(bytes = size, "Object uploaded");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| classify(e, bucket, ""))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        debug!(count = keys.len(), "Objects listed");
        Ok(keys)
    }
}
