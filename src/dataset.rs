//! Dataset source client.
//!
//! Fetches the farmer CSV over HTTP(S) and parses it into a [`DatasetSnapshot`].
//! Nothing is cached: every lookup pulls a fresh copy.

use crate::config::Config;
use crate::errors::ResolveError;
use crate::models::FarmerRecord;
use chrono::{DateTime, Utc};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

pub const PHONE_COLUMN: &str = "Farmer_Phone_Number";
pub const CREDIT_LIMIT_COLUMN: &str = "credit_limit";
pub const LOAN_APPROVAL_COLUMN: &str = "loan_approval";

/// Length of the country-code prefix stored in front of every dataset phone number.
const COUNTRY_CODE_PREFIX_LEN: usize = 2;

/// Strips the country-code prefix from a stored phone number and reads the rest as an integer.
///
/// `"919876543210"` becomes `9876543210`. Returns `None` when nothing numeric is left.
pub fn normalize_phone(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    let rest: String = trimmed.chars().skip(COUNTRY_CODE_PREFIX_LEN).collect();
    if rest.is_empty() {
        return None;
    }
    rest.parse::<i64>().ok()
}

/// One parsed copy of the dataset.
#[derive(Debug, Clone)]
pub struct DatasetSnapshot {
    pub columns: Vec<String>,
    pub records: Vec<FarmerRecord>,
    pub fetched_at: DateTime<Utc>,
    /// SHA-256 of the raw body (hex encoded).
    pub digest: String,
}

impl DatasetSnapshot {
    /// Parses delimited text into a snapshot.
    ///
    /// Fails when a required column is missing or a phone number cannot be
    /// normalized. Unreadable `credit_limit` / `loan_approval` cells and short
    /// rows only mark the affected record as malformed.
    pub fn parse(body: &str) -> Result<Self, ResolveError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(body.as_bytes());

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let position = |name: &str| {
            columns.iter().position(|c| c == name).ok_or_else(|| {
                ResolveError::UpstreamFetch(format!("dataset is missing column '{}'", name))
            })
        };
        let phone_idx = position(PHONE_COLUMN)?;
        let credit_idx = position(CREDIT_LIMIT_COLUMN)?;
        let approval_idx = position(LOAN_APPROVAL_COLUMN)?;

        let mut records = Vec::new();
        for (row_number, row) in reader.records().enumerate() {
            let row = row?;
            let line = row_number + 2; // header is line 1

            let raw_phone = row.get(phone_idx).unwrap_or_default().to_string();
            let phone_number = normalize_phone(&raw_phone).ok_or_else(|| {
                ResolveError::UpstreamFetch(format!(
                    "line {}: phone number '{}' cannot be normalized",
                    line, raw_phone
                ))
            })?;

            let mut defects = Vec::new();

            let credit_limit = match row.get(credit_idx).filter(|v| !is_missing(v)) {
                None => None,
                Some(value) => match value.parse::<f64>() {
                    Ok(limit) if limit.is_finite() => Some(limit),
                    _ => {
                        defects.push(format!("credit_limit '{}' is not numeric", value));
                        None
                    }
                },
            };

            let loan_approval = match row.get(approval_idx).filter(|v| !is_missing(v)) {
                None => {
                    defects.push("loan_approval is missing".to_string());
                    0
                }
                Some(value) => parse_integral(value).unwrap_or_else(|| {
                    defects.push(format!("loan_approval '{}' is not an integer flag", value));
                    0
                }),
            };

            if !defects.is_empty() {
                tracing::debug!(
                    "line {}: record {} is malformed: {}",
                    line,
                    raw_phone,
                    defects.join("; ")
                );
            }

            let attributes: BTreeMap<String, String> = columns
                .iter()
                .enumerate()
                .filter(|(idx, _)| ![phone_idx, credit_idx, approval_idx].contains(idx))
                .filter_map(|(idx, name)| row.get(idx).map(|v| (name.clone(), v.to_string())))
                .collect();

            records.push(FarmerRecord {
                phone_number,
                raw_phone_number: raw_phone,
                credit_limit,
                loan_approval,
                attributes,
                defects,
            });
        }

        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());

        Ok(Self {
            columns,
            records,
            fetched_at: Utc::now(),
            digest: hex::encode(hasher.finalize()),
        })
    }

    /// All records whose normalized phone number matches, in file order.
    pub fn matching(&self, phone_number: i64) -> Vec<&FarmerRecord> {
        self.records
            .iter()
            .filter(|r| r.phone_number == phone_number)
            .collect()
    }

    /// First record matching the phone number.
    ///
    /// Duplicates are resolved by file order; the extra rows are logged.
    pub fn find(&self, phone_number: i64) -> Option<&FarmerRecord> {
        let matches = self.matching(phone_number);
        if matches.len() > 1 {
            tracing::warn!(
                "Phone number {} matches {} records, using the first one",
                phone_number,
                matches.len()
            );
        }
        matches.into_iter().next()
    }

    /// Short digest prefix for log lines.
    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}

/// Cell values treated as empty, as spreadsheet and dataframe exports write them.
const MISSING_MARKERS: [&str; 9] = ["", "NA", "N/A", "n/a", "NaN", "nan", "null", "NULL", "None"];

fn is_missing(raw: &str) -> bool {
    MISSING_MARKERS.contains(&raw)
}

/// Reads an integer, accepting the integral float form as well (`1` and `1.0`).
pub fn parse_integral(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    integral_from_f64(raw.parse::<f64>().ok()?)
}

/// Converts a float with no fractional part that fits in an `i64`.
pub fn integral_from_f64(value: f64) -> Option<i64> {
    if value.is_finite()
        && value.fract() == 0.0
        && value >= i64::MIN as f64
        && value < i64::MAX as f64
    {
        Some(value as i64)
    } else {
        None
    }
}

/// HTTP client for the remote dataset.
#[derive(Clone)]
pub struct DatasetClient {
    client: Client,
    url: String,
}

impl DatasetClient {
    /// Creates a new `DatasetClient`.
    ///
    /// # Arguments
    ///
    /// * `url` - Location of the CSV file.
    /// * `timeout` - Per-request timeout.
    pub fn new(url: String, timeout: Duration) -> Result<Self, ResolveError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ResolveError::UpstreamFetch(format!("Failed to create dataset client: {}", e))
        })?;

        Ok(Self { client, url })
    }

    pub fn from_config(config: &Config) -> Result<Self, ResolveError> {
        Self::new(
            config.dataset_url.clone(),
            Duration::from_secs(config.dataset_timeout_secs),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Downloads and parses the current dataset.
    ///
    /// No retry: any transport failure or non-success status is returned as is.
    pub async fn fetch_snapshot(&self) -> Result<DatasetSnapshot, ResolveError> {
        tracing::debug!("Fetching dataset from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ResolveError::UpstreamFetch(format!("dataset request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!("Dataset source returned {}", status);
            return Err(ResolveError::UpstreamFetch(format!(
                "dataset source returned status {}",
                status
            )));
        }

        let body = response.text().await?;
        let snapshot = DatasetSnapshot::parse(&body)?;

        tracing::debug!(
            "Dataset snapshot {} loaded: {} records",
            snapshot.short_digest(),
            snapshot.records.len()
        );
        Ok(snapshot)
    }
}
