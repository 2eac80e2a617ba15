//! Partition leader routing for multi-broker Kafka clusters.
//!
//! Produce requests must go to the partition leader; anything else fails with
//! NOT_LEADER_OR_FOLLOWER. The router keeps the latest metadata snapshot and
//! one connection per broker, and refreshes both when leadership moves.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_rustls::rustls::ClientConfig;
use tracing::{debug, info, warn};

use crate::config::KafkaConfig;
use crate::error::KafkaError;
use crate::Result;

use super::metadata::{fetch_metadata, ClusterMetadata};
use super::produce::{produce, ProduceResponse};
use super::KafkaClient;

const NOT_LEADER_OR_FOLLOWER: i16 = 6;

pub struct PartitionLeaderRouter {
    config: KafkaConfig,
    tls: Option<Arc<ClientConfig>>,
    /// Metadata and admin requests go here
    bootstrap: KafkaClient,
    metadata: RwLock<ClusterMetadata>,
    /// Leader connections by broker id
    connections: RwLock<HashMap<i32, Arc<KafkaClient>>>,
}

impl PartitionLeaderRouter {
    /// Connect to the bootstrap servers and load metadata for `topics`.
    pub async fn new(
        config: KafkaConfig,
        tls: Option<Arc<ClientConfig>>,
        topics: &[String],
    ) -> Result<Self> {
        let bootstrap = KafkaClient::connect(&config.bootstrap_servers, &config, tls.as_ref()).await?;
        let router = Self {
            config,
            tls,
            bootstrap,
            metadata: RwLock::new(ClusterMetadata::default()),
            connections: RwLock::new(HashMap::new()),
        };
        router.refresh_metadata(topics).await?;
        Ok(router)
    }

    pub fn bootstrap_client(&self) -> &KafkaClient {
        &self.bootstrap
    }

    pub async fn refresh_metadata(&self, topics: &[String]) -> Result<()> {
        let fresh = fetch_metadata(&self.bootstrap, topics).await?;
        let mut metadata = self.metadata.write().await;
        metadata.merge(fresh);
        info!(
            "Refreshed metadata for {:?}: {} brokers known",
            topics,
            metadata.broker_count()
        );
        Ok(())
    }

    /// Partition ids from the last refresh, without asking the cluster.
    pub async fn known_partitions(&self, topic: &str) -> Result<Vec<i32>> {
        self.metadata.read().await.partitions(topic)
    }

    /// Partition ids after refreshing the topic's metadata.
    pub async fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        self.refresh_metadata(&[topic.to_string()]).await?;
        self.known_partitions(topic).await
    }

    async fn leader_client(&self, topic: &str, partition: i32) -> Result<Arc<KafkaClient>> {
        let (leader, address) = {
            let metadata = self.metadata.read().await;
            let leader = metadata.leader(topic, partition).ok_or_else(|| {
                KafkaError::PartitionNotAvailable {
                    topic: topic.to_string(),
                    partition,
                }
            })?;
            let address = metadata
                .broker_address(leader)
                .ok_or_else(|| KafkaError::Protocol(format!("Unknown broker ID: {}", leader)))?
                .to_string();
            (leader, address)
        };

        if let Some(client) = self.connections.read().await.get(&leader) {
            return Ok(Arc::clone(client));
        }

        debug!("Opening connection to broker {} at {}", leader, address);
        let client = Arc::new(
            KafkaClient::connect(&[address], &self.config, self.tls.as_ref()).await?,
        );
        let mut connections = self.connections.write().await;
        Ok(Arc::clone(connections.entry(leader).or_insert(client)))
    }

    /// Produce one batch to the partition leader.
    ///
    /// NOT_LEADER_OR_FOLLOWER refreshes the topic's metadata, drops pooled
    /// connections and retries once against the new leader.
    pub async fn produce(
        &self,
        topic: &str,
        partition: i32,
        payloads: &[Bytes],
        acks: i16,
        timeout_ms: i32,
    ) -> Result<ProduceResponse> {
        let client = self.leader_client(topic, partition).await?;
        match produce(&client, topic, partition, payloads, acks, timeout_ms).await {
            Err(e) if is_not_leader_error(&e) => {
                warn!(
                    "Leadership of {}:{} moved, refreshing metadata",
                    topic, partition
                );
                self.refresh_metadata(&[topic.to_string()]).await?;
                self.connections.write().await.clear();
                let client = self.leader_client(topic, partition).await?;
                produce(&client, topic, partition, payloads, acks, timeout_ms).await
            }
            result => result,
        }
    }
}

fn is_not_leader_error(error: &crate::Error) -> bool {
    matches!(
        error,
        crate::Error::Kafka(KafkaError::BrokerError { code, .. }) if *code == NOT_LEADER_OR_FOLLOWER
    )
}
