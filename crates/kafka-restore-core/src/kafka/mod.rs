//! Kafka protocol client and producer implementation.

mod admin;
mod client;
mod metadata;
mod partition_router;
mod produce;
mod producer;
pub mod tls;

pub use admin::{ensure_topic, TopicCreation};
pub use client::KafkaClient;
pub use metadata::ClusterMetadata;
pub use partition_router::PartitionLeaderRouter;
pub use produce::ProduceResponse;
pub use producer::{KafkaProducer, RecordSink};
