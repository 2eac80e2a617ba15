//! Cluster metadata as the producer needs it: where each broker lives and
//! which broker leads each partition of the destination topic.

use kafka_protocol::messages::{ApiKey, MetadataRequest, MetadataResponse, TopicName};
use kafka_protocol::protocol::StrBytes;
use std::collections::HashMap;
use tracing::debug;

use super::KafkaClient;
use crate::error::KafkaError;
use crate::Result;

/// Partition leaders of one topic, keyed by partition id.
pub type PartitionLeaders = HashMap<i32, i32>;

/// Snapshot of one Metadata response.
#[derive(Debug, Clone, Default)]
pub struct ClusterMetadata {
    /// `host:port` per broker id
    brokers: HashMap<i32, String>,
    topics: HashMap<String, PartitionLeaders>,
    /// Topics the broker answered with an error code for
    topic_errors: HashMap<String, i16>,
}

impl ClusterMetadata {
    pub fn from_response(response: &MetadataResponse) -> Self {
        let brokers = response
            .brokers
            .iter()
            .map(|b| (b.node_id.0, format!("{}:{}", b.host, b.port)))
            .collect();

        let mut topics = HashMap::new();
        let mut topic_errors = HashMap::new();
        for topic in &response.topics {
            let Some(name) = topic.name.as_ref().map(|n| n.to_string()) else {
                continue;
            };
            if topic.error_code != 0 {
                debug!("Metadata for {} returned error code {}", name, topic.error_code);
                topic_errors.insert(name, topic.error_code);
                continue;
            }
            let leaders = topic
                .partitions
                .iter()
                .map(|p| (p.partition_index, p.leader_id.0))
                .collect();
            topics.insert(name, leaders);
        }

        Self {
            brokers,
            topics,
            topic_errors,
        }
    }

    /// Address of a broker.
    pub fn broker_address(&self, broker_id: i32) -> Option<&str> {
        self.brokers.get(&broker_id).map(String::as_str)
    }

    /// Leader broker id of a partition.
    pub fn leader(&self, topic: &str, partition: i32) -> Option<i32> {
        self.topics.get(topic)?.get(&partition).copied()
    }

    /// Partition ids of `topic` in ascending order.
    pub fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        match self.topics.get(topic) {
            Some(leaders) if !leaders.is_empty() => {
                let mut ids: Vec<i32> = leaders.keys().copied().collect();
                ids.sort_unstable();
                Ok(ids)
            }
            _ => match self.topic_errors.get(topic) {
                Some(code) => Err(KafkaError::BrokerError {
                    code: *code,
                    message: format!("Metadata error for topic {}", topic),
                }
                .into()),
                None => Err(KafkaError::TopicNotExists(topic.to_string()).into()),
            },
        }
    }

    pub fn broker_count(&self) -> usize {
        self.brokers.len()
    }

    /// Fold a newer snapshot in; topics it covers replace the old entries.
    pub fn merge(&mut self, newer: ClusterMetadata) {
        self.brokers.extend(newer.brokers);
        for (topic, leaders) in newer.topics {
            self.topic_errors.remove(&topic);
            self.topics.insert(topic, leaders);
        }
        for (topic, code) in newer.topic_errors {
            self.topics.remove(&topic);
            self.topic_errors.insert(topic, code);
        }
    }
}

/// Request metadata for `topics` without triggering auto-creation.
pub async fn fetch_metadata(client: &KafkaClient, topics: &[String]) -> Result<ClusterMetadata> {
    let requested = topics
        .iter()
        .map(|name| {
            kafka_protocol::messages::metadata_request::MetadataRequestTopic::default()
                .with_name(Some(TopicName(StrBytes::from_string(name.clone()))))
        })
        .collect();
    let request = MetadataRequest::default()
        .with_topics(Some(requested))
        .with_allow_auto_topic_creation(false);

    let response: MetadataResponse = client.send_request(ApiKey::Metadata, request).await?;
    let metadata = ClusterMetadata::from_response(&response);
    debug!(
        "Metadata from {}: {} brokers, {} topics",
        client.address(),
        metadata.broker_count(),
        metadata.topics.len()
    );
    Ok(metadata)
}
