//! Kafka Restore Core Library
//!
//! Replays day-partitioned archives (`<topic>/year=YYYY/month=MM/day=DD/...`)
//! from an object store back into a Kafka topic, one day at a time, one
//! newline-delimited record per message.

pub mod archive;
pub mod config;
pub mod credentials;
pub mod error;
pub mod kafka;
pub mod producer;
pub mod restore;
pub mod storage;

pub use archive::{ArchiveObjectRef, ArchiveRetriever, DatePartition, DateRange, ObjectBuffer};
pub use config::{Config, DeliveryFailurePolicy, ProducerOptions, RestoreOptions};
pub use credentials::{ClientIdentity, CredentialResolver, CredentialScope};
pub use error::{Error, Result};
pub use kafka::KafkaProducer;
pub use producer::{
    DeliveryError, DeliveryReports, DeliverySuccess, MemoryProducer, Producer, ProducerMessage,
};
pub use restore::{
    CompletionBarrier, DateRangeDriver, DayCount, DayStats, Replayer, RestoreEngine,
    RestoreReport, RunState,
};
pub use storage::{create_backend, StorageBackend, StorageBackendConfig};
