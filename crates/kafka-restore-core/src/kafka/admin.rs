//! Destination topic creation (CreateTopics).

use kafka_protocol::messages::{
    create_topics_request::{CreatableTopic, CreateTopicsRequest},
    ApiKey, CreateTopicsResponse, TopicName,
};
use kafka_protocol::protocol::StrBytes;
use tracing::{debug, info};

use super::KafkaClient;
use crate::config::CreateTopicOptions;
use crate::error::KafkaError;
use crate::Result;

const TOPIC_ALREADY_EXISTS: i16 = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicCreation {
    Created,
    AlreadyExisted,
}

fn creation_outcome(topic: &str, response: &CreateTopicsResponse) -> Result<TopicCreation> {
    let result = response
        .topics
        .iter()
        .find(|r| r.name.to_string() == topic)
        .ok_or_else(|| KafkaError::Protocol(format!("No CreateTopics result for {}", topic)))?;

    match result.error_code {
        0 => Ok(TopicCreation::Created),
        TOPIC_ALREADY_EXISTS => Ok(TopicCreation::AlreadyExisted),
        code => Err(KafkaError::BrokerError {
            code,
            message: format!(
                "Failed to create topic {}: {}",
                topic,
                result
                    .error_message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_default()
            ),
        }
        .into()),
    }
}

/// Create the destination topic unless it already exists.
pub async fn ensure_topic(
    client: &KafkaClient,
    topic: &str,
    options: &CreateTopicOptions,
) -> Result<TopicCreation> {
    let request = CreateTopicsRequest::default()
        .with_topics(vec![CreatableTopic::default()
            .with_name(TopicName(StrBytes::from_string(topic.to_string())))
            .with_num_partitions(options.num_partitions)
            .with_replication_factor(options.replication_factor)])
        .with_timeout_ms(options.timeout_ms)
        .with_validate_only(false);

    let response: CreateTopicsResponse = client.send_request(ApiKey::CreateTopics, request).await?;
    let outcome = creation_outcome(topic, &response)?;
    match outcome {
        TopicCreation::Created => info!(
            "Created topic {} ({} partitions, replication {})",
            topic, options.num_partitions, options.replication_factor
        ),
        TopicCreation::AlreadyExisted => debug!("Topic {} already exists", topic),
    }
    Ok(outcome)
}
