//! Error types for the Kafka restore core library.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Kafka restore library.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka protocol error
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Client identity could not be resolved
    #[error("Credential error: {0}")]
    Credentials(String),

    /// The retrieval/replay hand-off protocol was violated or cut short
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),
}

/// Kafka-specific errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum KafkaError {
    /// Connection failed
    #[error("Failed to connect to broker {broker}: {message}")]
    ConnectionFailed { broker: String, message: String },

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Broker error response
    #[error("Broker returned error code {code}: {message}")]
    BrokerError { code: i16, message: String },

    /// No available brokers
    #[error("No available brokers")]
    NoBrokersAvailable,

    /// Topic does not exist
    #[error("Topic does not exist: {0}")]
    TopicNotExists(String),

    /// Partition not available
    #[error("Partition {partition} not available for topic {topic}")]
    PartitionNotAvailable { topic: String, partition: i32 },

    /// The producer no longer accepts messages
    #[error("Producer is closed")]
    ProducerClosed,

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Certificate loading error
    #[error("Failed to load certificate from {source_name}: {message}")]
    CertificateLoad { source_name: String, message: String },

    /// Private key loading error
    #[error("Failed to load private key from {source_name}: {message}")]
    PrivateKeyLoad { source_name: String, message: String },
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// The bucket (or filesystem root) itself does not exist
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Storage backend error
    #[error("Backend error: {0}")]
    Backend(String),
}

impl Error {
    /// Whether this error came from the archive store rather than the broker.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            object_store::Error::PermissionDenied { path, .. }
            | object_store::Error::Unauthenticated { path, .. } => {
                StorageError::PermissionDenied(path)
            }
            other => {
                let message = other.to_string();
                if message.contains("NoSuchBucket") {
                    StorageError::BucketNotFound(message)
                } else {
                    StorageError::Backend(message)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_store_not_found_maps_to_not_found() {
        let err = object_store::Error::NotFound {
            path: "orders/year=2020/month=01/day=01/a.log".to_string(),
            source: "missing".into(),
        };
        assert!(matches!(StorageError::from(err), StorageError::NotFound(_)));
    }

    #[test]
    fn test_no_such_bucket_maps_to_bucket_not_found() {
        let err = object_store::Error::Generic {
            store: "S3",
            source: "Error performing list request: NoSuchBucket".into(),
        };
        assert!(matches!(
            StorageError::from(err),
            StorageError::BucketNotFound(_)
        ));
    }

    #[test]
    fn test_is_storage() {
        let err: Error = StorageError::Backend("boom".to_string()).into();
        assert!(err.is_storage());
        assert!(!Error::Config("bad".to_string()).is_storage());
    }
}
