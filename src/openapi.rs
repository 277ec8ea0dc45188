//! OpenAPI document served at `/api-docs/openapi.json` and browsed at `/docs`.

use crate::models::{
    DecisionSupport, Explanation, FarmerStatusResponse, FeatureContribution, LoanStatus,
    LoanStatusRequest, ModelDriver, Prediction, ResolutionResult,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TerraCred Loan Status API",
        description = "Farmer loan-approval lookup by phone number, with optional model explanations."
    ),
    paths(
        crate::handlers::health,
        crate::handlers::get_loan_status,
        crate::handlers::post_loan_status,
        crate::handlers::get_farmer,
    ),
    components(schemas(
        ResolutionResult,
        LoanStatus,
        DecisionSupport,
        ModelDriver,
        Prediction,
        Explanation,
        FeatureContribution,
        LoanStatusRequest,
        FarmerStatusResponse,
    )),
    tags(
        (name = "loan-status", description = "Farmer loan status lookups"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_lookup_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| *p == "/api/loan-status/{phone_number}"));
        assert!(paths.iter().any(|p| *p == "/api/loan-status"));
        assert!(paths.iter().any(|p| *p == "/farmer/{phone_number}"));
    }
}
