//! Farmer lookup and loan decision resolution.
//!
//! For every call the resolver:
//! 1. Parses the phone number
//! 2. Fetches a fresh dataset snapshot
//! 3. Finds the farmer by normalized phone number
//! 4. Optionally scores and explains the farmer with the configured model
//! 5. Builds the approved / rejected narrative
//!
//! Failures never escape `resolve`; they come back as `error` outcomes.

use crate::dataset::{parse_integral, DatasetClient, DatasetSnapshot};
use crate::errors::ResolveError;
use crate::explain::Explainer;
use crate::features;
use crate::model::LoanModel;
use crate::models::{
    DecisionSupport, Explanation, FarmerRecord, LoanStatus, ModelDriver, Prediction,
    ResolutionResult,
};
use std::sync::Arc;

pub const TOP_POSITIVE_FACTORS: [&str; 4] = [
    "Healthy vegetation index across the last growing season",
    "Adequate seasonal rainfall for the declared crop",
    "Soil pH within the optimal range for cultivation",
    "Reasonable distance to the nearest market",
];

pub const RISK_FACTORS: [&str; 3] = [
    "Dependence on monsoon rainfall",
    "Exposure to crop price fluctuations",
    "Single-crop concentration",
];

pub const LIMITING_FACTORS: [&str; 4] = [
    "Low vegetation index indicating weak crop health",
    "Insufficient or irregular rainfall",
    "Soil pH outside the optimal range",
    "Long distance to the nearest market",
];

pub const IMPROVEMENT_SUGGESTIONS: [&str; 4] = [
    "Adopt irrigation or water harvesting to reduce rainfall dependence",
    "Test and treat soil to bring pH closer to neutral",
    "Diversify into higher-value or drought-tolerant crops",
    "Join a farmer producer organisation for better market access",
];

/// Number of model drivers surfaced next to the narrative.
const MODEL_DRIVER_COUNT: usize = 3;

/// Model and explainer loaded at startup and shared by all requests.
#[derive(Clone)]
pub struct Scoring {
    pub model: Arc<dyn LoanModel>,
    pub explainer: Arc<dyn Explainer>,
}

/// Model output attached to a found farmer.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAnalysis {
    pub prediction: Prediction,
    pub explanation: Explanation,
}

/// A farmer that was found, with the optional model analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub record: FarmerRecord,
    pub analysis: Option<ModelAnalysis>,
}

impl Decision {
    pub fn status(&self) -> LoanStatus {
        if self.record.is_approved() {
            LoanStatus::Approved
        } else {
            LoanStatus::Rejected
        }
    }

    /// Builds the response for this decision.
    ///
    /// An approved row without a credit limit is reported as malformed data.
    pub fn into_result(self, phone_number: i64) -> Result<ResolutionResult, ResolveError> {
        let status = self.status();
        let model_drivers: Vec<ModelDriver> = self
            .analysis
            .as_ref()
            .map(|a| {
                a.explanation
                    .contributions
                    .iter()
                    .take(MODEL_DRIVER_COUNT)
                    .map(|c| ModelDriver {
                        feature: c.feature.clone(),
                        contribution: c.contribution,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let (credit_limit, decision_support) = match status {
            LoanStatus::Approved => {
                let limit = self.record.credit_limit.ok_or_else(|| {
                    ResolveError::UpstreamFetch(format!(
                        "approved record {} has no credit_limit",
                        self.record.raw_phone_number
                    ))
                })?;
                (
                    // Fractional limits are truncated.
                    Some(limit.trunc() as i64),
                    DecisionSupport {
                        top_positive_factors: Some(to_strings(&TOP_POSITIVE_FACTORS)),
                        risk_factors: Some(to_strings(&RISK_FACTORS)),
                        model_drivers,
                        ..Default::default()
                    },
                )
            }
            _ => (
                None,
                DecisionSupport {
                    limiting_factors: Some(to_strings(&LIMITING_FACTORS)),
                    improvement_suggestions: Some(to_strings(&IMPROVEMENT_SUGGESTIONS)),
                    model_drivers,
                    ..Default::default()
                },
            ),
        };

        let (prediction, explanation) = match self.analysis {
            Some(a) => (Some(a.prediction), Some(a.explanation)),
            None => (None, None),
        };

        Ok(ResolutionResult {
            phone_number: Some(phone_number),
            status,
            credit_limit,
            decision_support: Some(decision_support),
            prediction,
            explanation,
            error_kind: None,
            message: None,
        })
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Reads caller input as an integer phone number.
///
/// Integral float forms such as `9999999999.0` are accepted too.
pub fn parse_phone_input(raw: &str) -> Result<i64, ResolveError> {
    parse_integral(raw).ok_or_else(|| ResolveError::InvalidInput {
        input: raw.to_string(),
    })
}

/// Looks the phone number up in a snapshot and runs the model steps.
///
/// `Ok(None)` means no farmer has this number.
pub fn decide(
    snapshot: &DatasetSnapshot,
    phone_number: i64,
    scoring: Option<&Scoring>,
) -> Result<Option<Decision>, ResolveError> {
    let Some(record) = snapshot.find(phone_number) else {
        return Ok(None);
    };
    if record.is_malformed() {
        return Err(ResolveError::UpstreamFetch(format!(
            "record {} is malformed: {}",
            record.raw_phone_number,
            record.defects.join("; ")
        )));
    }

    let analysis = match scoring {
        Some(scoring) => {
            let row = features::derive(record)?;
            let background = features::derive_background(&snapshot.records);
            let prediction = scoring.model.predict(&row)?;
            let explanation = scoring.explainer.explain(&row, &background)?;
            Some(ModelAnalysis {
                prediction,
                explanation,
            })
        }
        None => None,
    };

    Ok(Some(Decision {
        record: record.clone(),
        analysis,
    }))
}

/// Resolves raw input against an already fetched snapshot.
pub fn resolve_in_snapshot(
    snapshot: &DatasetSnapshot,
    raw_phone_number: &str,
    scoring: Option<&Scoring>,
) -> ResolutionResult {
    let phone_number = match parse_phone_input(raw_phone_number) {
        Ok(phone) => phone,
        Err(e) => return ResolutionResult::error(None, &e),
    };
    fold(
        phone_number,
        decide(snapshot, phone_number, scoring),
    )
}

fn fold(phone_number: i64, outcome: Result<Option<Decision>, ResolveError>) -> ResolutionResult {
    match outcome.and_then(|d| d.map(|d| d.into_result(phone_number)).transpose()) {
        Ok(Some(result)) => result,
        Ok(None) => ResolutionResult::not_found(phone_number),
        Err(e) => ResolutionResult::error(Some(phone_number), &e),
    }
}

/// The record resolver. Cheap to clone; holds no per-call state.
#[derive(Clone)]
pub struct RecordResolver {
    dataset: DatasetClient,
    scoring: Option<Scoring>,
}

impl RecordResolver {
    pub fn new(dataset: DatasetClient, scoring: Option<Scoring>) -> Self {
        Self { dataset, scoring }
    }

    pub fn has_model(&self) -> bool {
        self.scoring.is_some()
    }

    /// Fetches a fresh snapshot and decides for one phone number.
    pub async fn try_resolve(&self, phone_number: i64) -> Result<Option<Decision>, ResolveError> {
        let snapshot = self.dataset.fetch_snapshot().await?;
        tracing::debug!(
            "Resolving {} against snapshot {} ({} records, fetched {})",
            phone_number,
            snapshot.short_digest(),
            snapshot.records.len(),
            snapshot.fetched_at.to_rfc3339()
        );
        decide(&snapshot, phone_number, self.scoring.as_ref())
    }

    /// Resolves a phone number into a structured outcome. Never fails.
    pub async fn resolve(&self, raw_phone_number: &str) -> ResolutionResult {
        let phone_number = match parse_phone_input(raw_phone_number) {
            Ok(phone) => phone,
            Err(e) => {
                tracing::warn!("Rejected lookup input: {}", e);
                return ResolutionResult::error(None, &e);
            }
        };

        let result = fold(phone_number, self.try_resolve(phone_number).await);
        match result.status {
            LoanStatus::Error => tracing::error!(
                "Lookup for {} failed: {}",
                phone_number,
                result.message.as_deref().unwrap_or("unknown error")
            ),
            status => tracing::info!("Lookup for {} resolved as {}", phone_number, status.as_str()),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::ContributionExplainer;
    use crate::model::LogisticModel;

    const DATASET: &str = "\
Farmer_Phone_Number,credit_limit,loan_approval,NDVI,Rainfall_mm,Soil_pH,Distance_to_Market_km,Land_Size_acres,Crop_Type
919999999999,50000,1,0.82,1100,6.6,8,4,Rice
919876543210,0,0,0.21,300,8.9,70,1,Cotton
918888888888,,1,0.55,900,6.2,20,2,Wheat
";

    fn snapshot() -> DatasetSnapshot {
        DatasetSnapshot::parse(DATASET).unwrap()
    }

    fn scoring() -> Scoring {
        let model: Arc<dyn LoanModel> = Arc::new(
            LogisticModel::from_json_str(
                r#"{"features": ["ndvi", "soil_ph_score", "market_access_score"],
                    "weights": [4.0, 2.0, 1.5], "intercept": -3.0}"#,
            )
            .unwrap(),
        );
        Scoring {
            explainer: Arc::new(ContributionExplainer::new(model.clone(), Some(100))),
            model,
        }
    }

    #[test]
    fn test_parse_phone_input() {
        assert_eq!(parse_phone_input(" 9999999999 ").unwrap(), 9999999999);
        assert_eq!(parse_phone_input("9999999999.0").unwrap(), 9999999999);
        assert!(parse_phone_input("9999999999.5").is_err());
        assert!(matches!(
            parse_phone_input("99-99"),
            Err(ResolveError::InvalidInput { .. })
        ));
        assert!(parse_phone_input("").is_err());
    }

    #[test]
    fn test_approved_lookup() {
        let result = resolve_in_snapshot(&snapshot(), "9999999999", None);
        assert_eq!(result.status, LoanStatus::Approved);
        assert_eq!(result.credit_limit, Some(50000));
        assert_eq!(result.phone_number, Some(9999999999));
        let support = result.decision_support.unwrap();
        assert_eq!(support.top_positive_factors.unwrap().len(), TOP_POSITIVE_FACTORS.len());
        assert!(support.limiting_factors.is_none());
        assert!(support.model_drivers.is_empty());
        assert!(result.prediction.is_none());
    }

    #[test]
    fn test_rejected_lookup_has_no_credit_limit() {
        let result = resolve_in_snapshot(&snapshot(), "9876543210", None);
        assert_eq!(result.status, LoanStatus::Rejected);
        assert_eq!(result.credit_limit, None);
        let support = result.decision_support.unwrap();
        assert_eq!(
            support.improvement_suggestions.unwrap().len(),
            IMPROVEMENT_SUGGESTIONS.len()
        );
    }

    #[test]
    fn test_not_found_lookup() {
        let result = resolve_in_snapshot(&snapshot(), "1234567890", None);
        assert_eq!(result.status, LoanStatus::NotFound);
        assert_eq!(result.credit_limit, None);
        assert!(result.decision_support.is_none());
    }

    #[test]
    fn test_non_numeric_input_is_error() {
        let result = resolve_in_snapshot(&snapshot(), "call me", None);
        assert_eq!(result.status, LoanStatus::Error);
        assert_eq!(result.error_kind.as_deref(), Some("invalid_input"));
        assert_eq!(result.phone_number, None);
    }

    #[test]
    fn test_approved_without_credit_limit_is_error() {
        let result = resolve_in_snapshot(&snapshot(), "8888888888", None);
        assert_eq!(result.status, LoanStatus::Error);
        assert_eq!(result.error_kind.as_deref(), Some("upstream_fetch_failure"));
    }

    #[test]
    fn test_model_analysis_attached() {
        let scoring = scoring();
        let result = resolve_in_snapshot(&snapshot(), "9999999999", Some(&scoring));
        assert_eq!(result.status, LoanStatus::Approved);
        let prediction = result.prediction.unwrap();
        assert_eq!(prediction.label, 1);
        let explanation = result.explanation.unwrap();
        assert!(!explanation.image_base64.is_empty());
        let drivers = result.decision_support.unwrap().model_drivers;
        assert_eq!(drivers.len(), MODEL_DRIVER_COUNT);
        assert_eq!(drivers[0].feature, explanation.contributions[0].feature);
    }

    #[test]
    fn test_dataset_flag_wins_over_model() {
        // The model predicts rejection here, the dataset says approved.
        let model: Arc<dyn LoanModel> = Arc::new(
            LogisticModel::from_json_str(
                r#"{"features": ["ndvi"], "weights": [1.0], "intercept": -50.0}"#,
            )
            .unwrap(),
        );
        let scoring = Scoring {
            explainer: Arc::new(ContributionExplainer::new(model.clone(), Some(10))),
            model,
        };
        let result = resolve_in_snapshot(&snapshot(), "9999999999", Some(&scoring));
        assert_eq!(result.status, LoanStatus::Approved);
        assert_eq!(result.prediction.unwrap().label, 0);
    }

    #[test]
    fn test_missing_feature_column_is_model_failure() {
        let body = "\
Farmer_Phone_Number,credit_limit,loan_approval,NDVI
919999999999,50000,1,0.8
";
        let snapshot = DatasetSnapshot::parse(body).unwrap();
        let scoring = scoring();
        let result = resolve_in_snapshot(&snapshot, "9999999999", Some(&scoring));
        assert_eq!(result.status, LoanStatus::Error);
        assert_eq!(result.error_kind.as_deref(), Some("model_failure"));

        // Without a model the same row resolves normally.
        let plain = resolve_in_snapshot(&snapshot, "9999999999", None);
        assert_eq!(plain.status, LoanStatus::Approved);
    }

    #[test]
    fn test_garbage_row_only_affects_its_own_lookup() {
        let body = "\
Farmer_Phone_Number,credit_limit,loan_approval
919999999999,50000,1
918888888888,N/A,0
917777777777,unknown,1
916666666666
";
        let snapshot = DatasetSnapshot::parse(body).unwrap();

        let healthy = resolve_in_snapshot(&snapshot, "9999999999", None);
        assert_eq!(healthy.status, LoanStatus::Approved);
        assert_eq!(healthy.credit_limit, Some(50000));

        let rejected = resolve_in_snapshot(&snapshot, "8888888888", None);
        assert_eq!(rejected.status, LoanStatus::Rejected);

        for phone in ["7777777777", "6666666666"] {
            let result = resolve_in_snapshot(&snapshot, phone, None);
            assert_eq!(result.status, LoanStatus::Error);
            assert_eq!(result.error_kind.as_deref(), Some("upstream_fetch_failure"));
        }
    }

    #[test]
    fn test_unscorable_background_row_does_not_block_model() {
        let body = format!("{}919111111111,1000,0,0.5\n", DATASET);
        let snapshot = DatasetSnapshot::parse(&body).unwrap();
        let scoring = scoring();
        let result = resolve_in_snapshot(&snapshot, "9999999999", Some(&scoring));
        assert_eq!(result.status, LoanStatus::Approved);
        assert!(result.explanation.is_some());
    }

    #[test]
    fn test_not_found_skips_model() {
        // Background rows lack features, but nothing is scored for a missing farmer.
        let body = "Farmer_Phone_Number,credit_limit,loan_approval\n919999999999,1,1\n";
        let snapshot = DatasetSnapshot::parse(body).unwrap();
        let scoring = scoring();
        let result = resolve_in_snapshot(&snapshot, "1111111111", Some(&scoring));
        assert_eq!(result.status, LoanStatus::NotFound);
    }

    #[test]
    fn test_repeated_lookups_are_identical() {
        let snapshot = snapshot();
        let scoring = scoring();
        let a = resolve_in_snapshot(&snapshot, "9999999999", Some(&scoring));
        let b = resolve_in_snapshot(&snapshot, "9999999999", Some(&scoring));
        assert_eq!(a, b);
    }
}
