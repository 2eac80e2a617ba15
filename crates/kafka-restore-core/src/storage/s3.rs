//! S3-compatible storage backend using object_store.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use tracing::{debug, info};

use super::StorageBackend;
use crate::error::StorageError;
use crate::{Error, Result};

/// S3 storage backend configuration
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region
    pub region: Option<String>,
    /// Custom endpoint (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,
    /// Access key ID
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
    /// Key prefix for all operations
    pub prefix: Option<String>,
    /// Allow HTTP (insecure) connections
    pub allow_http: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: Some("us-west-1".to_string()),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            prefix: None,
            allow_http: false,
        }
    }
}

/// S3 storage backend
pub struct S3Backend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: Option<String>,
}

impl S3Backend {
    /// Create a new S3 backend
    pub fn new(config: S3Config) -> Result<Self> {
        let mut builder = AmazonS3Builder::new().with_bucket_name(&config.bucket);

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }

        if let Some(endpoint) = &config.endpoint {
            // MinIO and friends want path-style requests
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false);
        }

        if let Some(access_key) = &config.access_key_id {
            builder = builder.with_access_key_id(access_key);
        }

        if let Some(secret_key) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret_key);
        }

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder.build().map_err(|e| {
            Error::Storage(StorageError::Backend(format!(
                "Failed to create S3 client: {}",
                e
            )))
        })?;

        info!(
            "Created S3 backend for bucket: {}, prefix: {:?}",
            config.bucket, config.prefix
        );

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket,
            prefix: config.prefix,
        })
    }

    /// Build the full path for a key
    fn full_path(&self, key: &str) -> Path {
        match &self.prefix {
            Some(prefix) => Path::from(format!("{}/{}", prefix.trim_end_matches('/'), key)),
            None => Path::from(key),
        }
    }

    /// Strip the configured prefix from a listed location
    fn relative_key(&self, location: &Path) -> String {
        let key = location.to_string();
        match &self.prefix {
            Some(p) => key
                .strip_prefix(&format!("{}/", p.trim_end_matches('/')))
                .map(str::to_string)
                .unwrap_or(key),
            None => key,
        }
    }

    fn map_error(&self, op: &str, err: object_store::Error) -> Error {
        match StorageError::from(err) {
            StorageError::BucketNotFound(_) => {
                Error::Storage(StorageError::BucketNotFound(self.bucket.clone()))
            }
            StorageError::Backend(message) => Error::Storage(StorageError::Backend(format!(
                "S3 {} failed: {}",
                op, message
            ))),
            other => Error::Storage(other),
        }
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_prefix = self.full_path(prefix);
        debug!("S3 LIST: {}", full_prefix);

        let mut keys = Vec::new();
        let mut stream = self.store.list(Some(&full_prefix));

        while let Some(result) = stream.next().await {
            let meta = result.map_err(|e| self.map_error("LIST", e))?;
            keys.push(self.relative_key(&meta.location));
        }

        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.full_path(key);
        debug!("S3 GET: {}", path);

        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| self.map_error("GET", e))?;

        result.bytes().await.map_err(|e| {
            Error::Storage(StorageError::Backend(format!(
                "Failed to read S3 response: {}",
                e
            )))
        })
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.full_path(key);
        debug!("S3 PUT: {}", path);

        self.store
            .put(&path, PutPayload::from_bytes(data))
            .await
            .map_err(|e| self.map_error("PUT", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with_prefix(prefix: Option<&str>) -> S3Backend {
        S3Backend::new(S3Config {
            bucket: "archive".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            access_key_id: Some("minioadmin".to_string()),
            secret_access_key: Some("minioadmin".to_string()),
            prefix: prefix.map(str::to_string),
            allow_http: true,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_full_path_and_relative_key_round_trip_prefix() {
        let backend = backend_with_prefix(Some("backups/"));
        let path = backend.full_path("connect/year=2020/month=01/day=01/a.log");
        assert_eq!(
            path.to_string(),
            "backups/connect/year=2020/month=01/day=01/a.log"
        );
        assert_eq!(
            backend.relative_key(&path),
            "connect/year=2020/month=01/day=01/a.log"
        );
    }

    #[test]
    fn test_no_such_bucket_reports_configured_bucket() {
        let backend = backend_with_prefix(None);
        let err = backend.map_error(
            "LIST",
            object_store::Error::Generic {
                store: "S3",
                source: "NoSuchBucket: The specified bucket does not exist".into(),
            },
        );
        match err {
            Error::Storage(StorageError::BucketNotFound(bucket)) => assert_eq!(bucket, "archive"),
            other => panic!("Expected BucketNotFound, got {:?}", other),
        }
    }

    // Requires a running MinIO on localhost:9000 with an "archive" bucket
    #[tokio::test]
    #[ignore]
    async fn test_s3_backend_basic() {
        let backend = backend_with_prefix(None);

        let key = "connect/year=2020/month=01/day=01/logs-0.txt";
        let data = Bytes::from("a\nb\n");
        backend.put(key, data.clone()).await.unwrap();

        let listed = backend
            .list("connect/year=2020/month=01/day=01")
            .await
            .unwrap();
        assert!(listed.contains(&key.to_string()));
        assert_eq!(backend.get(key).await.unwrap(), data);
    }
}
