//! Feature derivation.
//!
//! Turns the raw agronomic columns of a farmer record into the fixed feature
//! schema consumed by the model and the explainer. The same function is used for
//! the farmer being scored and for every background row.

use crate::errors::ResolveError;
use crate::models::FarmerRecord;

pub const NDVI_COLUMN: &str = "NDVI";
pub const RAINFALL_COLUMN: &str = "Rainfall_mm";
pub const SOIL_PH_COLUMN: &str = "Soil_pH";
pub const MARKET_DISTANCE_COLUMN: &str = "Distance_to_Market_km";
pub const LAND_SIZE_COLUMN: &str = "Land_Size_acres";
pub const CROP_TYPE_COLUMN: &str = "Crop_Type";

/// Derived feature names, in row order.
pub const FEATURE_NAMES: [&str; 9] = [
    "ndvi",
    "log_rainfall",
    "log_market_distance",
    "soil_ph_score",
    "land_to_distance_ratio",
    "crop_multiplier",
    "vegetation_score",
    "market_access_score",
    "agronomic_score",
];

const IDEAL_SOIL_PH: f64 = 6.5;
const SOIL_PH_TOLERANCE: f64 = 3.5;
const RAINFALL_SATURATION_MM: f64 = 2000.0;
const MARKET_DISTANCE_CAP_KM: f64 = 100.0;
const LAND_RATIO_CAP: f64 = 10.0;

/// Derived features for one farmer, aligned with [`FEATURE_NAMES`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    values: [f64; FEATURE_NAMES.len()],
}

impl FeatureRow {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|idx| self.values[idx])
    }

    /// Copy of this row with one feature replaced.
    pub fn with_value(&self, idx: usize, value: f64) -> Self {
        let mut values = self.values;
        values[idx] = value;
        Self { values }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }
}

/// Position of a feature in the schema.
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|f| *f == name)
}

/// Yield multiplier applied per crop.
pub fn crop_multiplier(crop: &str) -> f64 {
    match crop.trim().to_ascii_lowercase().as_str() {
        "rice" => 1.10,
        "wheat" => 1.05,
        "maize" => 1.00,
        "pulses" => 0.95,
        "cotton" => 0.90,
        "sugarcane" => 1.15,
        _ => 1.00,
    }
}

fn numeric(record: &FarmerRecord, column: &str) -> Result<f64, ResolveError> {
    let raw = record.attribute(column).ok_or_else(|| {
        ResolveError::Model(format!(
            "record {} has no '{}' attribute",
            record.raw_phone_number, column
        ))
    })?;
    raw.parse::<f64>().map_err(|_| {
        ResolveError::Model(format!(
            "record {}: '{}' value '{}' is not numeric",
            record.raw_phone_number, column, raw
        ))
    })
}

/// Applies the fixed formulas to one record.
pub fn derive(record: &FarmerRecord) -> Result<FeatureRow, ResolveError> {
    let ndvi_raw = numeric(record, NDVI_COLUMN)?;
    let rainfall = numeric(record, RAINFALL_COLUMN)?;
    let soil_ph = numeric(record, SOIL_PH_COLUMN)?;
    let distance = numeric(record, MARKET_DISTANCE_COLUMN)?;
    let land_size = numeric(record, LAND_SIZE_COLUMN)?;
    let crop = record.attribute(CROP_TYPE_COLUMN).ok_or_else(|| {
        ResolveError::Model(format!(
            "record {} has no '{}' attribute",
            record.raw_phone_number, CROP_TYPE_COLUMN
        ))
    })?;

    let ndvi = ndvi_raw.clamp(0.0, 1.0);
    let log_rainfall = rainfall.max(0.0).ln_1p();
    let log_market_distance = distance.max(0.0).ln_1p();
    let soil_ph_score = (1.0 - (soil_ph - IDEAL_SOIL_PH).abs() / SOIL_PH_TOLERANCE).clamp(0.0, 1.0);
    let land_to_distance_ratio = (land_size / (1.0 + distance.max(0.0))).clamp(0.0, LAND_RATIO_CAP);
    let crop_multiplier = crop_multiplier(crop);
    let vegetation_score =
        0.6 * ndvi + 0.4 * (rainfall / RAINFALL_SATURATION_MM).clamp(0.0, 1.0);
    let market_access_score = 1.0 - (distance / MARKET_DISTANCE_CAP_KM).clamp(0.0, 1.0);
    let agronomic_score = crop_multiplier
        * (0.5 * vegetation_score + 0.3 * soil_ph_score + 0.2 * market_access_score);

    Ok(FeatureRow {
        values: [
            ndvi,
            log_rainfall,
            log_market_distance,
            soil_ph_score,
            land_to_distance_ratio,
            crop_multiplier,
            vegetation_score,
            market_access_score,
            agronomic_score,
        ],
    })
}

/// Derives the background distribution from every record that can be scored.
///
/// Rows missing a feature or marked malformed are left out of the background.
pub fn derive_background<'a, I>(records: I) -> Vec<FeatureRow>
where
    I: IntoIterator<Item = &'a FarmerRecord>,
{
    let mut skipped = 0usize;
    let rows: Vec<FeatureRow> = records
        .into_iter()
        .filter(|record| !record.is_malformed())
        .filter_map(|record| match derive(record) {
            Ok(row) => Some(row),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        tracing::debug!("{} rows left out of the explanation background", skipped);
    }
    rows
}
