use anyhow::Result;
use chrono::NaiveDate;
use kafka_restore_core::storage::create_backend;
use kafka_restore_core::{ArchiveRetriever, Config, DatePartition, DateRange};
use std::path::Path;
use tracing::info;

pub async fn run(config_path: Option<&Path>, date: Option<NaiveDate>) -> Result<()> {
    let config = Config::load(config_path).await?;
    let range = match date {
        Some(date) => DateRange::new(date, date),
        None => config.date_range()?,
    };

    let storage = create_backend(&config.storage)?;
    let retriever = ArchiveRetriever::new(storage);
    let topic = &config.restore.source_topic;

    info!("Listing archived objects for '{}' over {}", topic, range);

    let mut total = 0usize;
    for day in range.days() {
        let partition = DatePartition::new(topic.as_str(), day);
        let objects = retriever.list(&partition).await?;

        println!("{} ({} objects)", partition.prefix(), objects.len());
        for object in &objects {
            println!("  {}", object.key);
        }
        total += objects.len();
    }

    println!("\nTotal: {} objects over {} days", total, range.len());
    Ok(())
}
