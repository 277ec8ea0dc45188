use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

// ============ Dataset Models ============

/// One farmer row from the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmerRecord {
    /// Phone number with the country-code prefix removed (the lookup key).
    pub phone_number: i64,
    /// Phone number exactly as stored in the dataset.
    pub raw_phone_number: String,
    /// Credit limit granted to the farmer, if the row carries one.
    pub credit_limit: Option<f64>,
    /// Loan decision flag (1 = approved).
    pub loan_approval: i64,
    /// Every other column, keyed by header name.
    pub attributes: BTreeMap<String, String>,
    /// Cells of this row that could not be read. A row with defects cannot be decided.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defects: Vec<String>,
}

impl FarmerRecord {
    pub fn is_approved(&self) -> bool {
        self.defects.is_empty() && self.loan_approval == 1
    }

    pub fn is_malformed(&self) -> bool {
        !self.defects.is_empty()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

// ============ Resolution Models ============

/// Outcome tag of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Approved,
    Rejected,
    NotFound,
    Error,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::NotFound => "not_found",
            LoanStatus::Error => "error",
        }
    }
}

/// A feature that moved the model output the most for this farmer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ModelDriver {
    pub feature: String,
    pub contribution: f64,
}

/// Narrative attached to approved and rejected outcomes.
///
/// Approved outcomes fill `top_positive_factors` and `risk_factors`; rejected
/// outcomes fill `limiting_factors` and `improvement_suggestions`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DecisionSupport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_positive_factors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_factors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limiting_factors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvement_suggestions: Option<Vec<String>>,
    /// Largest contributions from the explanation, when one was produced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model_drivers: Vec<ModelDriver>,
}

/// Output of the predictive model for one farmer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Prediction {
    /// Predicted class (1 = approve).
    pub label: u8,
    /// Probability of the positive class.
    pub probability: f64,
}

/// Contribution of one derived feature to the model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FeatureContribution {
    pub feature: String,
    pub value: f64,
    pub contribution: f64,
}

/// Visual explanation of a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Explanation {
    /// Mean model output over the background rows.
    pub base_value: f64,
    /// Model output for this farmer.
    pub model_output: f64,
    /// Sorted by absolute contribution, largest first.
    pub contributions: Vec<FeatureContribution>,
    pub media_type: String,
    /// Rendered chart, base64 encoded.
    pub image_base64: String,
}

/// Structured result of resolving a phone number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResolutionResult {
    /// Normalized phone number, `null` when the input was not an integer.
    pub phone_number: Option<i64>,
    pub status: LoanStatus,
    /// Present only for approved farmers.
    pub credit_limit: Option<i64>,
    pub decision_support: Option<DecisionSupport>,
    pub prediction: Option<Prediction>,
    pub explanation: Option<Explanation>,
    /// One of `invalid_input`, `upstream_fetch_failure`, `model_failure`.
    pub error_kind: Option<String>,
    pub message: Option<String>,
}

impl ResolutionResult {
    pub fn not_found(phone_number: i64) -> Self {
        Self {
            phone_number: Some(phone_number),
            status: LoanStatus::NotFound,
            credit_limit: None,
            decision_support: None,
            prediction: None,
            explanation: None,
            error_kind: None,
            message: None,
        }
    }

    pub fn error(phone_number: Option<i64>, error: &crate::errors::ResolveError) -> Self {
        Self {
            phone_number,
            status: LoanStatus::Error,
            credit_limit: None,
            decision_support: None,
            prediction: None,
            explanation: None,
            error_kind: Some(error.kind().to_string()),
            message: Some(error.to_string()),
        }
    }
}

// ============ Request / Response Models ============

/// Body of `POST /api/loan-status`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LoanStatusRequest {
    /// Phone number as a string or an integer.
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "9876543210")]
    pub phone_number: Option<serde_json::Value>,
}

impl LoanStatusRequest {
    /// Raw textual form handed to the resolver.
    pub fn raw_phone_number(&self) -> String {
        match &self.phone_number {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => match n.as_i64() {
                Some(int) => int.to_string(),
                None => n
                    .as_f64()
                    .and_then(crate::dataset::integral_from_f64)
                    .map(|int| int.to_string())
                    .unwrap_or_else(|| n.to_string()),
            },
            Some(other) if !other.is_null() => other.to_string(),
            _ => String::new(),
        }
    }
}

/// Form submitted from the landing page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckLoanForm {
    #[serde(default)]
    pub phone_number: String,
}

/// Plain lookup response served by `GET /farmer/{phone_number}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FarmerStatusResponse {
    pub phone_number: Option<i64>,
    pub status: LoanStatus,
    pub credit_limit: Option<i64>,
}

impl From<ResolutionResult> for FarmerStatusResponse {
    fn from(result: ResolutionResult) -> Self {
        Self {
            phone_number: result.phone_number,
            status: result.status,
            credit_limit: result.credit_limit,
        }
    }
}
