//! TerraCred Loan Status API Library
//!
//! Looks up a farmer's loan decision and credit limit by phone number in a
//! remotely hosted dataset, optionally annotated with a model prediction and a
//! rendered explanation of that prediction.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `dataset`: Dataset fetching and parsing.
//! - `errors`: Error handling types.
//! - `explain`: Explanation of model predictions.
//! - `features`: Feature derivation for the model.
//! - `handlers`: HTTP request handlers and router.
//! - `model`: Predictive model.
//! - `models`: Core data models.
//! - `openapi`: OpenAPI document.
//! - `pages`: HTML form pages.
//! - `resolver`: Farmer lookup and decision resolution.

pub mod config;
pub mod dataset;
pub mod errors;
pub mod explain;
pub mod features;
pub mod handlers;
pub mod model;
pub mod models;
pub mod openapi;
pub mod pages;
pub mod resolver;

use std::sync::Arc;

/// Loads the model and explainer configured in `config`, if any.
pub fn load_scoring(config: &config::Config) -> anyhow::Result<Option<resolver::Scoring>> {
    let Some(ref path) = config.model_path else {
        return Ok(None);
    };
    let model: Arc<dyn model::LoanModel> = Arc::new(model::LogisticModel::load(path)?);
    let explainer: Arc<dyn explain::Explainer> = Arc::new(explain::ContributionExplainer::new(
        model.clone(),
        config.explanation_background_limit,
    ));
    Ok(Some(resolver::Scoring { model, explainer }))
}

/// Builds the shared state from configuration.
pub fn build_state(config: config::Config) -> anyhow::Result<Arc<handlers::AppState>> {
    let dataset = dataset::DatasetClient::from_config(&config)?;
    let scoring = load_scoring(&config)?;
    let resolver = resolver::RecordResolver::new(dataset, scoring);
    Ok(Arc::new(handlers::AppState { config, resolver }))
}
