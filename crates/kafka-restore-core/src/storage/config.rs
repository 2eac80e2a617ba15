//! Storage configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Archive store configuration using a tagged enum for type-safe configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend")]
pub enum StorageBackendConfig {
    /// AWS S3 or S3-compatible storage (MinIO, Ceph RGW, etc.)
    #[serde(rename = "s3")]
    S3 {
        /// S3 bucket name
        bucket: String,
        /// AWS region (e.g., "us-east-1")
        #[serde(default)]
        region: Option<String>,
        /// Custom endpoint URL (for S3-compatible services like MinIO)
        #[serde(default)]
        endpoint: Option<String>,
        /// Access key ID (falls back to AWS_ACCESS_KEY_ID env var)
        #[serde(default)]
        access_key: Option<String>,
        /// Secret access key (falls back to AWS_SECRET_ACCESS_KEY env var)
        #[serde(default)]
        secret_key: Option<String>,
        /// Key prefix in front of the `<topic>/year=...` layout
        #[serde(default)]
        prefix: Option<String>,
        /// Allow HTTP (insecure) connections
        #[serde(default)]
        allow_http: bool,
    },

    /// Local filesystem storage
    #[serde(rename = "filesystem")]
    Filesystem {
        /// Base path for storage
        path: PathBuf,
    },

    /// In-memory storage (for testing and dry runs)
    #[serde(rename = "memory")]
    Memory,
}

impl StorageBackendConfig {
    /// Short name of the backend, used in logs and errors
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "s3",
            Self::Filesystem { .. } => "filesystem",
            Self::Memory => "memory",
        }
    }

    /// Get the key prefix for this storage configuration
    pub fn prefix(&self) -> Option<&str> {
        match self {
            Self::S3 { prefix, .. } => prefix.as_deref(),
            Self::Filesystem { .. } | Self::Memory => None,
        }
    }

    /// Validate required fields
    pub fn validate(&self) -> crate::Result<()> {
        match self {
            Self::S3 { bucket, .. } if bucket.trim().is_empty() => Err(crate::Error::Config(
                "storage.bucket must not be empty".to_string(),
            )),
            Self::Filesystem { path } if path.as_os_str().is_empty() => Err(
                crate::Error::Config("storage.path must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_deserialization_s3() {
        let yaml = r#"
backend: s3
bucket: kafka-archive
region: us-west-1
endpoint: http://localhost:9000
access_key: minioadmin
secret_key: minioadmin
allow_http: true
"#;
        let config: StorageBackendConfig = serde_yaml::from_str(yaml).unwrap();
        match config {
            StorageBackendConfig::S3 {
                bucket,
                region,
                endpoint,
                allow_http,
                ..
            } => {
                assert_eq!(bucket, "kafka-archive");
                assert_eq!(region, Some("us-west-1".to_string()));
                assert_eq!(endpoint, Some("http://localhost:9000".to_string()));
                assert!(allow_http);
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_yaml_deserialization_filesystem() {
        let yaml = r#"
backend: filesystem
path: /var/kafka-archive
"#;
        let config: StorageBackendConfig = serde_yaml::from_str(yaml).unwrap();
        match config {
            StorageBackendConfig::Filesystem { path } => {
                assert_eq!(path, PathBuf::from("/var/kafka-archive"));
            }
            _ => panic!("Expected Filesystem config"),
        }
    }

    #[test]
    fn test_yaml_deserialization_memory() {
        let config: StorageBackendConfig = serde_yaml::from_str("backend: memory").unwrap();
        assert!(matches!(config, StorageBackendConfig::Memory));
        assert_eq!(config.backend_name(), "memory");
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let config = StorageBackendConfig::S3 {
            bucket: " ".to_string(),
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
            prefix: None,
            allow_http: false,
        };
        assert!(config.validate().is_err());
    }
}
