//! Utility to fetch the farmer dataset and print a summary of its contents.

use dotenvy::dotenv;
use std::collections::BTreeMap;
use std::time::Duration;
use terracred_api::config::{validate_dataset_url, DEFAULT_DATASET_URL};
use terracred_api::dataset::DatasetClient;
use terracred_api::features;

/// Main entry point for the dataset inspection utility.
///
/// Reads `DATASET_URL` (or the first argument), fetches one snapshot and lists
/// columns, decision counts, malformed rows, duplicate phone numbers and rows the model could
/// not score.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let url = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("DATASET_URL").ok())
        .unwrap_or_else(|| DEFAULT_DATASET_URL.to_string());
    let url = validate_dataset_url(url)?;

    let client = DatasetClient::new(url, Duration::from_secs(60))?;
    let snapshot = client.fetch_snapshot().await?;

    println!("Dataset: {}", client.url());
    println!("Digest:  {}", snapshot.digest);
    println!("Fetched: {}", snapshot.fetched_at.to_rfc3339());
    println!();

    println!("Columns ({}):", snapshot.columns.len());
    for column in &snapshot.columns {
        println!("  - {}", column);
    }
    println!();

    let malformed: Vec<_> = snapshot.records.iter().filter(|r| r.is_malformed()).collect();
    let approved = snapshot.records.iter().filter(|r| r.is_approved()).count();
    println!("Records:   {}", snapshot.records.len());
    println!("Approved:  {}", approved);
    println!("Rejected:  {}", snapshot.records.len() - approved - malformed.len());
    println!("Malformed: {}", malformed.len());
    for record in malformed.iter().take(20) {
        println!("  - {}: {}", record.raw_phone_number, record.defects.join("; "));
    }
    println!();

    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for record in &snapshot.records {
        *counts.entry(record.phone_number).or_default() += 1;
    }
    let duplicates: Vec<(i64, usize)> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
    if duplicates.is_empty() {
        println!("No duplicate phone numbers.");
    } else {
        println!("Duplicate phone numbers (first row wins on lookup):");
        for (phone, n) in &duplicates {
            println!("  - {} ({} rows)", phone, n);
        }
    }
    println!();

    let unscorable: Vec<String> = snapshot
        .records
        .iter()
        .filter(|r| !r.is_malformed())
        .filter_map(|r| features::derive(r).err().map(|e| e.to_string()))
        .collect();
    if unscorable.is_empty() {
        println!("All rows have the features the model needs.");
    } else {
        println!("{} rows cannot be scored:", unscorable.len());
        for reason in unscorable.iter().take(20) {
            println!("  - {}", reason);
        }
    }

    Ok(())
}
