//! Configuration loading tests.
//!
//! Covers file loading, environment overrides layered on YAML, and a
//! filesystem-backed dry run built purely from configuration.

use chrono::NaiveDate;
use std::io::Write;

use kafka_restore_core::config::{ClientIdentityConfig, SecurityProtocol};
use kafka_restore_core::{
    Config, DeliveryFailurePolicy, Error, RestoreEngine, StorageBackendConfig,
};

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const FULL_YAML: &str = r#"
storage:
  backend: s3
  bucket: kafka-archive
  endpoint: http://localhost:9000
  allow_http: true
target:
  bootstrap_servers:
    - broker-1:9092
    - broker-2:9092
  security:
    security_protocol: SSL
    ssl_ca_location: /etc/kafka/ca.crt
    client_identity:
      source: directory
      base_path: /etc/kafka/identities
      project: analytics
      site: eu-1
      deployment: restore
restore:
  source_topic: orders
  destination_topic: orders-restored
  date_range:
    start: 2020-01-01
    end: 2020-01-31
  handoff_capacity: 4
  on_delivery_failure:
    policy: dead_letter
    prefix: restore-failures
  create_topic:
    num_partitions: 6
    replication_factor: 3
producer:
  batch_size: 1000
  linger_ms: 50
"#;

#[tokio::test]
async fn load_full_yaml_file() {
    let file = write_config(FULL_YAML);
    let config = Config::load(Some(file.path())).await.unwrap();

    assert_eq!(config.target.bootstrap_servers.len(), 2);
    assert_eq!(
        config.target.security.security_protocol,
        SecurityProtocol::Ssl
    );
    assert!(matches!(
        config.target.security.client_identity,
        Some(ClientIdentityConfig::Directory { ref project, .. }) if project == "analytics"
    ));
    assert_eq!(config.restore.destination_topic(), "orders-restored");
    assert_eq!(config.restore.handoff_capacity, 4);
    assert_eq!(
        config.restore.on_delivery_failure,
        DeliveryFailurePolicy::DeadLetter {
            prefix: "restore-failures".to_string()
        }
    );
    let create = config.restore.create_topic.as_ref().unwrap();
    assert_eq!(create.num_partitions, 6);
    assert_eq!(create.replication_factor, 3);
    assert_eq!(config.producer.batch_size, 1000);
    assert_eq!(config.producer.max_retries, 3);

    let range = config.date_range().unwrap();
    assert_eq!(range.len(), 31);
}

#[tokio::test]
async fn load_missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("restore.yaml");

    let err = Config::load(Some(&missing)).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn load_rejects_inverted_range_before_any_io() {
    let yaml = FULL_YAML.replace("end: 2020-01-31", "end: 2019-12-31");
    let file = write_config(&yaml);

    let err = Config::load(Some(file.path())).await.unwrap_err();
    assert!(err.to_string().contains("after"), "unexpected error: {}", err);
}

#[test]
fn env_overrides_layer_on_yaml() {
    let mut config = Config::from_yaml_str(FULL_YAML).unwrap();
    config
        .apply_env_overrides([
            ("KAFKA_RESTORE_KAFKA_BROKERS", "kafka-a:9093, kafka-b:9093"),
            ("KAFKA_RESTORE_KAFKA_TLS_ENABLED", "false"),
            ("KAFKA_RESTORE_S3_RESTORE_BUCKET", "other-bucket"),
            ("KAFKA_RESTORE_KAFKA_RESTORE_TOPIC", "payments"),
            ("UNRELATED", "ignored"),
        ])
        .unwrap();

    assert_eq!(
        config.target.bootstrap_servers,
        vec!["kafka-a:9093".to_string(), "kafka-b:9093".to_string()]
    );
    assert_eq!(
        config.target.security.security_protocol,
        SecurityProtocol::Plaintext
    );
    assert!(matches!(
        config.storage,
        StorageBackendConfig::S3 { ref bucket, .. } if bucket == "other-bucket"
    ));
    assert_eq!(config.restore.source_topic, "payments");
    // Destination stays as configured
    assert_eq!(config.restore.destination_topic(), "orders-restored");
    config.validate().unwrap();
}

#[test]
fn env_only_config_uses_three_day_lookback() {
    let config = Config::from_env_vars([
        ("KAFKA_RESTORE_KAFKA_BROKERS", "localhost:9092"),
        ("KAFKA_RESTORE_S3_RESTORE_BUCKET", "kafka-archive"),
        ("KAFKA_RESTORE_KAFKA_RESTORE_TOPIC", "orders"),
    ])
    .unwrap();
    config.validate().unwrap();

    let range = config.date_range().unwrap();
    assert_eq!(range.len(), 4);
    assert_eq!(range.end(), chrono::Utc::now().date_naive());
}

#[tokio::test]
async fn filesystem_dry_run_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let day = dir.path().join("orders/year=2020/month=02/day=29");
    std::fs::create_dir_all(&day).unwrap();
    std::fs::write(day.join("part-0000.log"), "x\ny\n").unwrap();
    std::fs::write(day.join("part-0001.log"), "z").unwrap();

    let yaml = format!(
        r#"
storage:
  backend: filesystem
  path: {}
target:
  bootstrap_servers: [localhost:9092]
restore:
  source_topic: orders
  dry_run: true
  date_range:
    start: 2020-02-28
    end: 2020-03-01
"#,
        dir.path().display()
    );
    let config = Config::from_yaml_str(&yaml).unwrap();
    let engine = RestoreEngine::new(config).unwrap();

    let report = engine.run().await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.days.len(), 3);
    assert_eq!(
        report.days[1].partition.date,
        NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()
    );
    assert_eq!(report.days[1].objects, 2);
    assert_eq!(report.records, 3);
    assert_eq!(report.delivered, 3);
}

#[tokio::test]
async fn filesystem_missing_root_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
storage:
  backend: filesystem
  path: {}
target:
  bootstrap_servers: [localhost:9092]
restore:
  source_topic: orders
  dry_run: true
  date_range:
    start: 2020-01-01
    end: 2020-01-02
"#,
        dir.path().join("does-not-exist").display()
    );
    let engine = RestoreEngine::new(Config::from_yaml_str(&yaml).unwrap()).unwrap();

    let err = engine.run().await.unwrap_err();
    assert!(err.is_storage());
}
