use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use crate::openapi::ApiDoc;
use crate::pages;
use crate::resolver::RecordResolver;
use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        Path, State,
    },
    http::{StatusCode, Uri},
    response::Html,
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Request bodies are a single phone number; anything larger is refused.
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Farmer lookup, with the model loaded at startup if one is configured.
    pub resolver: RecordResolver,
}

/// Builds the application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/api/loan-status/:phone_number", get(get_loan_status))
        .route("/api/loan-status", post(post_loan_status))
        .route("/farmer/:phone_number", get(get_farmer))
        .route("/", get(index))
        .route("/check-loan", post(check_loan))
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)));

    Router::new()
        .route("/health", get(health))
        .merge(api_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(fallback)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "terracred-api",
            "version": env!("CARGO_PKG_VERSION"),
            "model_loaded": state.resolver.has_model(),
            "explanation_background_limit": state.config.explanation_background_limit,
        })),
    )
}

/// GET /api/loan-status/:phone_number
///
/// Resolves the loan status for a phone number given in the path.
#[utoipa::path(
    get,
    path = "/api/loan-status/{phone_number}",
    params(("phone_number" = String, Path, description = "Farmer phone number without country code")),
    responses((status = 200, description = "Structured lookup outcome", body = ResolutionResult)),
    tag = "loan-status"
)]
pub async fn get_loan_status(
    State(state): State<Arc<AppState>>,
    Path(phone_number): Path<String>,
) -> Json<ResolutionResult> {
    tracing::info!("GET /api/loan-status/{}", phone_number);
    Json(state.resolver.resolve(&phone_number).await)
}

/// POST /api/loan-status
///
/// Same lookup with the phone number in a JSON body. A missing or null
/// `phone_number` resolves to an `invalid_input` error outcome.
#[utoipa::path(
    post,
    path = "/api/loan-status",
    request_body = LoanStatusRequest,
    responses(
        (status = 200, description = "Structured lookup outcome", body = ResolutionResult),
        (status = 400, description = "Body is not valid JSON")
    ),
    tag = "loan-status"
)]
pub async fn post_loan_status(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoanStatusRequest>, JsonRejection>,
) -> Result<Json<ResolutionResult>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let raw = request.raw_phone_number();
    tracing::info!("POST /api/loan-status - phone_number: {:?}", raw);
    Ok(Json(state.resolver.resolve(&raw).await))
}

/// GET /farmer/:phone_number
///
/// Plain lookup returning only status and credit limit.
#[utoipa::path(
    get,
    path = "/farmer/{phone_number}",
    params(("phone_number" = String, Path, description = "Farmer phone number without country code")),
    responses((status = 200, description = "Status and credit limit", body = FarmerStatusResponse)),
    tag = "loan-status"
)]
pub async fn get_farmer(
    State(state): State<Arc<AppState>>,
    Path(phone_number): Path<String>,
) -> Json<FarmerStatusResponse> {
    tracing::info!("GET /farmer/{}", phone_number);
    Json(state.resolver.resolve(&phone_number).await.into())
}

/// GET /
///
/// Lookup form for browsers.
pub async fn index() -> Html<String> {
    Html(pages::render_index())
}

/// POST /check-loan
///
/// Form submission from the landing page; answers with a narrative page.
pub async fn check_loan(
    State(state): State<Arc<AppState>>,
    payload: Result<Form<CheckLoanForm>, FormRejection>,
) -> Result<Html<String>, AppError> {
    let Form(form) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    tracing::info!("POST /check-loan - phone_number: {:?}", form.phone_number);
    let result = state.resolver.resolve(&form.phone_number).await;
    Ok(Html(pages::render_result(&form.phone_number, &result)))
}

/// Unknown routes.
pub async fn fallback(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}
