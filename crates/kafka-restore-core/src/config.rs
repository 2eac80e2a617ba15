//! Configuration structures for restore runs.
//!
//! A run is described by one immutable [`Config`] value. It is read from YAML,
//! optionally patched from `KAFKA_RESTORE_*` environment variables, validated
//! once, and then handed to [`crate::RestoreEngine::new`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::archive::DateRange;
use crate::storage::StorageBackendConfig;
use crate::{Error, Result};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "KAFKA_RESTORE_";

/// Lookback used when the range comes from the environment alone.
const DEFAULT_LOOKBACK_DAYS: u32 = 3;

/// Region used for S3 when none is configured.
const DEFAULT_S3_REGION: &str = "us-west-1";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Archive store holding the day-partitioned backup
    pub storage: StorageBackendConfig,

    /// Kafka cluster the records are replayed into
    pub target: KafkaConfig,

    /// What to restore
    pub restore: RestoreOptions,

    /// Producer tuning
    #[serde(default)]
    pub producer: ProducerOptions,
}

/// Kafka cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Bootstrap servers
    pub bootstrap_servers: Vec<String>,

    /// Security configuration
    #[serde(default)]
    pub security: SecurityConfig,

    /// TCP connection tuning
    #[serde(default)]
    pub connection: ConnectionConfig,
}

/// Security configuration for Kafka connections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Security protocol
    #[serde(default)]
    pub security_protocol: SecurityProtocol,

    /// SASL mechanism (if using SASL)
    #[serde(default)]
    pub sasl_mechanism: Option<SaslMechanism>,

    /// SASL username
    #[serde(default)]
    pub sasl_username: Option<String>,

    /// SASL password
    #[serde(default)]
    pub sasl_password: Option<String>,

    /// Path to CA certificate file (for TLS)
    #[serde(default)]
    pub ssl_ca_location: Option<PathBuf>,

    /// Where the client certificate/key pair comes from (for mTLS)
    #[serde(default)]
    pub client_identity: Option<ClientIdentityConfig>,
}

impl SecurityConfig {
    /// Whether connections are wrapped in TLS
    pub fn uses_tls(&self) -> bool {
        matches!(
            self.security_protocol,
            SecurityProtocol::Ssl | SecurityProtocol::SaslSsl
        )
    }
}

/// Security protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    #[default]
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

/// SASL mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum SaslMechanism {
    Plain,
}

/// Source of the client certificate/key pair used for mTLS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum ClientIdentityConfig {
    /// Explicit PEM file paths
    Files { certificate: PathBuf, key: PathBuf },

    /// `<base_path>/<project>/<site>/<deployment>/client.{crt,key}`
    Directory {
        base_path: PathBuf,
        project: String,
        site: String,
        deployment: String,
    },
}

/// TCP connection options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Enable TCP keepalive
    #[serde(default = "default_true")]
    pub tcp_keepalive: bool,

    /// Idle time before the first keepalive packet
    #[serde(default = "default_keepalive_time_secs")]
    pub keepalive_time_secs: u64,

    /// Interval between keepalive packets
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,

    /// Disable Nagle's algorithm
    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            tcp_keepalive: true,
            keepalive_time_secs: default_keepalive_time_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            tcp_nodelay: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_keepalive_time_secs() -> u64 {
    60
}

fn default_keepalive_interval_secs() -> u64 {
    20
}

/// Restore-specific options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreOptions {
    /// Topic name used in the archive key layout
    pub source_topic: String,

    /// Topic records are published to (defaults to `source_topic`)
    #[serde(default)]
    pub destination_topic: Option<String>,

    /// Inclusive range of days to replay
    #[serde(default)]
    pub date_range: DateRangeConfig,

    /// Capacity of the count and buffer hand-off channels
    #[serde(default = "default_handoff_capacity")]
    pub handoff_capacity: usize,

    /// Count what would be published without connecting to Kafka
    #[serde(default)]
    pub dry_run: bool,

    /// What to do with records the producer gave up on
    #[serde(default)]
    pub on_delivery_failure: DeliveryFailurePolicy,

    /// Create the destination topic before publishing
    #[serde(default)]
    pub create_topic: Option<CreateTopicOptions>,
}

impl RestoreOptions {
    /// Topic that restored records are published to
    pub fn destination_topic(&self) -> &str {
        self.destination_topic
            .as_deref()
            .unwrap_or(&self.source_topic)
    }
}

fn default_handoff_capacity() -> usize {
    1
}

/// Date range as written in configuration.
///
/// Either `start` and `end` (inclusive) or `lookback_days`, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRangeConfig {
    #[serde(default)]
    pub start: Option<NaiveDate>,

    #[serde(default)]
    pub end: Option<NaiveDate>,

    /// Restore `[today - lookback_days, today]`
    #[serde(default)]
    pub lookback_days: Option<u32>,
}

impl DateRangeConfig {
    /// Explicit inclusive range
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            lookback_days: None,
        }
    }

    /// The last `days` days up to and including today
    pub fn lookback(days: u32) -> Self {
        Self {
            start: None,
            end: None,
            lookback_days: Some(days),
        }
    }

    /// Resolve to a concrete range relative to `today`.
    pub fn resolve(&self, today: NaiveDate) -> Result<DateRange> {
        match (self.start, self.end, self.lookback_days) {
            (Some(start), Some(end), None) => {
                if start > end {
                    return Err(Error::Config(format!(
                        "date_range.start ({}) is after date_range.end ({})",
                        start, end
                    )));
                }
                Ok(DateRange::new(start, end))
            }
            (None, None, Some(days)) => {
                let start = today
                    .checked_sub_days(chrono::Days::new(u64::from(days)))
                    .ok_or_else(|| {
                        Error::Config(format!("lookback_days ({}) is out of range", days))
                    })?;
                Ok(DateRange::new(start, today))
            }
            (None, None, None) => Err(Error::Config(
                "date_range requires either start/end or lookback_days".to_string(),
            )),
            (Some(_), None, None) | (None, Some(_), None) => Err(Error::Config(
                "date_range requires both start and end".to_string(),
            )),
            _ => Err(Error::Config(
                "date_range accepts start/end or lookback_days, not both".to_string(),
            )),
        }
    }
}

/// Handling of records the producer reports as undeliverable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DeliveryFailurePolicy {
    /// Log and count, nothing else
    #[default]
    Log,

    /// Write failed payloads back to the archive store under `prefix`
    DeadLetter { prefix: String },
}

/// Destination topic creation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTopicOptions {
    #[serde(default = "default_num_partitions")]
    pub num_partitions: i32,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: i16,

    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: i32,
}

impl Default for CreateTopicOptions {
    fn default() -> Self {
        Self {
            num_partitions: default_num_partitions(),
            replication_factor: default_replication_factor(),
            timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_num_partitions() -> i32 {
    1
}

fn default_replication_factor() -> i16 {
    1
}

/// Producer tuning options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerOptions {
    /// Messages buffered between the replayer and the producer worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum records per produce request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How long a partial batch may wait for more records
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,

    /// Required acknowledgements (-1 = all replicas, 1 = leader)
    #[serde(default = "default_acks")]
    pub acks: i16,

    /// Broker-side produce timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: i32,

    /// Retries of a failed batch before it is reported as failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retries (doubled on each attempt)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Buffer size of the success and error notification channels
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            linger_ms: default_linger_ms(),
            acks: default_acks(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            notification_capacity: default_notification_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    256
}

fn default_batch_size() -> usize {
    500
}

fn default_linger_ms() -> u64 {
    10
}

fn default_acks() -> i16 {
    -1
}

fn default_request_timeout_ms() -> i32 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_notification_capacity() -> usize {
    256
}

impl Config {
    /// Parse a YAML document. Does not validate.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Build a configuration purely from `KAFKA_RESTORE_*` variables.
    ///
    /// Storage is S3 and the range is the last three days up to today.
    pub fn from_env_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut config = Config {
            storage: StorageBackendConfig::S3 {
                bucket: String::new(),
                region: Some(DEFAULT_S3_REGION.to_string()),
                endpoint: None,
                access_key: None,
                secret_key: None,
                prefix: None,
                allow_http: false,
            },
            target: KafkaConfig {
                bootstrap_servers: Vec::new(),
                security: SecurityConfig::default(),
                connection: ConnectionConfig::default(),
            },
            restore: RestoreOptions {
                source_topic: String::new(),
                destination_topic: None,
                date_range: DateRangeConfig::lookback(DEFAULT_LOOKBACK_DAYS),
                handoff_capacity: default_handoff_capacity(),
                dry_run: false,
                on_delivery_failure: DeliveryFailurePolicy::default(),
                create_topic: None,
            },
            producer: ProducerOptions::default(),
        };
        config.apply_env_overrides(vars)?;
        Ok(config)
    }

    /// Load from an optional YAML file, then apply process environment overrides.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let env_vars = std::env::vars().filter(|(k, _)| k.starts_with(ENV_PREFIX));
        let config = match path {
            Some(path) => {
                let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Config(format!(
                        "Failed to read configuration file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let mut config = Self::from_yaml_str(&content)?;
                config.apply_env_overrides(env_vars)?;
                config
            }
            None => Self::from_env_vars(env_vars)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply `KAFKA_RESTORE_*` overrides. Unknown variables are ignored.
    pub fn apply_env_overrides<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(k, v)| {
                let key: String = k.into();
                key.strip_prefix(ENV_PREFIX)
                    .map(|stripped| (stripped.to_string(), v.into()))
            })
            .collect();

        if let Some(brokers) = vars.get("KAFKA_BROKERS") {
            self.target.bootstrap_servers = brokers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(enabled) = vars.get("KAFKA_TLS_ENABLED") {
            let enabled = parse_bool("KAFKA_TLS_ENABLED", enabled)?;
            let security = &mut self.target.security;
            security.security_protocol = match (enabled, security.security_protocol) {
                (true, SecurityProtocol::Plaintext) => SecurityProtocol::Ssl,
                (true, SecurityProtocol::SaslPlaintext) => SecurityProtocol::SaslSsl,
                (false, SecurityProtocol::Ssl) => SecurityProtocol::Plaintext,
                (false, SecurityProtocol::SaslSsl) => SecurityProtocol::SaslPlaintext,
                (_, unchanged) => unchanged,
            };
        }

        if let Some(ca) = vars.get("KAFKA_TLS_CA_CERT") {
            self.target.security.ssl_ca_location = Some(PathBuf::from(ca));
        }

        let cert = vars.get("KAFKA_TLS_CLIENT_CERT").map(PathBuf::from);
        let key = vars.get("KAFKA_TLS_CLIENT_KEY").map(PathBuf::from);
        if cert.is_some() || key.is_some() {
            let (current_cert, current_key) = match &self.target.security.client_identity {
                Some(ClientIdentityConfig::Files { certificate, key }) => {
                    (Some(certificate.clone()), Some(key.clone()))
                }
                _ => (None, None),
            };
            match (cert.or(current_cert), key.or(current_key)) {
                (Some(certificate), Some(key)) => {
                    self.target.security.client_identity =
                        Some(ClientIdentityConfig::Files { certificate, key });
                }
                _ => {
                    return Err(Error::Config(
                        "KAFKA_TLS_CLIENT_CERT and KAFKA_TLS_CLIENT_KEY must be provided together"
                            .to_string(),
                    ))
                }
            }
        }

        let s3_keys = [
            "S3_SERVER_ENDPOINT",
            "S3_RESTORE_BUCKET",
            "S3_ACCESS_KEY",
            "S3_SECRET_KEY",
        ];
        if s3_keys.iter().any(|k| vars.contains_key(*k)) {
            match &mut self.storage {
                StorageBackendConfig::S3 {
                    bucket,
                    endpoint,
                    access_key,
                    secret_key,
                    allow_http,
                    ..
                } => {
                    if let Some(value) = vars.get("S3_RESTORE_BUCKET") {
                        *bucket = value.clone();
                    }
                    if let Some(value) = vars.get("S3_SERVER_ENDPOINT") {
                        // A bare host:port is plain HTTP, as the endpoint was always dialed without TLS
                        let value = if value.contains("://") {
                            value.clone()
                        } else {
                            format!("http://{}", value)
                        };
                        *allow_http = value.starts_with("http://");
                        *endpoint = Some(value);
                    }
                    if let Some(value) = vars.get("S3_ACCESS_KEY") {
                        *access_key = Some(value.clone());
                    }
                    if let Some(value) = vars.get("S3_SECRET_KEY") {
                        *secret_key = Some(value.clone());
                    }
                }
                other => {
                    return Err(Error::Config(format!(
                        "S3 environment overrides given but storage backend is {}",
                        other.backend_name()
                    )))
                }
            }
        }

        if let Some(topic) = vars.get("KAFKA_RESTORE_TOPIC") {
            self.restore.source_topic = topic.clone();
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;

        if self.target.bootstrap_servers.is_empty() {
            return Err(Error::Config(
                "target.bootstrap_servers must not be empty".to_string(),
            ));
        }
        if self.target.bootstrap_servers.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::Config(
                "target.bootstrap_servers contains an empty entry".to_string(),
            ));
        }

        let security = &self.target.security;
        if matches!(
            security.security_protocol,
            SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl
        ) && security.sasl_mechanism.is_none()
        {
            return Err(Error::Config(
                "sasl_mechanism is required for SASL security protocols".to_string(),
            ));
        }
        if let Some(ClientIdentityConfig::Files { certificate, key }) = &security.client_identity {
            if certificate.as_os_str().is_empty() || key.as_os_str().is_empty() {
                return Err(Error::Config(
                    "client_identity requires both certificate and key paths".to_string(),
                ));
            }
        }

        self.restore.validate()?;
        self.producer.validate()?;

        Ok(())
    }

    /// Resolve the configured date range against today's UTC date
    pub fn date_range(&self) -> Result<DateRange> {
        self.restore
            .date_range
            .resolve(chrono::Utc::now().date_naive())
    }
}

impl RestoreOptions {
    /// Validate restore options
    pub fn validate(&self) -> Result<()> {
        if self.source_topic.trim().is_empty() {
            return Err(Error::Config(
                "restore.source_topic must not be empty".to_string(),
            ));
        }

        if let Some(destination) = &self.destination_topic {
            if destination.trim().is_empty() {
                return Err(Error::Config(
                    "restore.destination_topic must not be empty when set".to_string(),
                ));
            }
        }

        self.date_range.resolve(chrono::Utc::now().date_naive())?;

        if self.handoff_capacity == 0 {
            return Err(Error::Config(
                "restore.handoff_capacity must be > 0".to_string(),
            ));
        }

        if let DeliveryFailurePolicy::DeadLetter { prefix } = &self.on_delivery_failure {
            if prefix.trim_matches('/').is_empty() {
                return Err(Error::Config(
                    "dead_letter policy requires a non-empty prefix".to_string(),
                ));
            }
        }

        if let Some(create) = &self.create_topic {
            if create.num_partitions <= 0 {
                return Err(Error::Config(
                    "create_topic.num_partitions must be > 0".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl ProducerOptions {
    /// Validate producer options
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config(
                "producer.queue_capacity must be > 0".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("producer.batch_size must be > 0".to_string()));
        }
        if self.notification_capacity == 0 {
            return Err(Error::Config(
                "producer.notification_capacity must be > 0".to_string(),
            ));
        }
        if self.acks != -1 && self.acks != 1 {
            return Err(Error::Config(format!(
                "producer.acks must be -1 or 1, got {}",
                self.acks
            )));
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!(
            "{}{} is not a boolean: {}",
            ENV_PREFIX, name, other
        ))),
    }
}
