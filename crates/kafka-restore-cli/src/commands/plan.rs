use anyhow::Result;
use kafka_restore_core::Config;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path).await?;
    let range = config.date_range()?;
    let restore = &config.restore;

    println!(
        "Restore '{}' into '{}' from {} storage",
        restore.source_topic,
        restore.destination_topic(),
        config.storage.backend_name()
    );
    println!(
        "Range: {} to {} ({} days){}",
        range.start(),
        range.end(),
        range.len(),
        if restore.dry_run { ", dry run" } else { "" }
    );

    for partition in range.partitions(&restore.source_topic) {
        println!("  {}  {}", partition.date, partition.prefix());
    }

    Ok(())
}
