//! API handlers for Bookledger REST endpoints

pub mod analytics;
pub mod health;
pub mod loans;
pub mod openapi;
pub mod stats;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    error::AppError,
    models::{actor::ActorClaims, Actor},
    AppState,
};

/// Extractor for the authenticated actor from a bearer JWT
pub struct AuthenticatedActor(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedActor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = ActorClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedActor(claims.actor()))
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Ledger
        .route("/loans", post(loans::borrow).get(loans::list_loans))
        .route("/loans/:id/return", post(loans::return_loan))
        .route("/loans/sweep", post(loans::sweep_overdue))
        .route("/loans/overdue", get(loans::overdue_report))
        .route("/books/:id/availability", get(loans::availability))
        .route("/ledger/audit", get(loans::audit))
        // Analytics
        .route("/recommendations/:user_id", get(analytics::recommendations))
        .route("/analytics/demand-forecast", get(analytics::demand_forecast))
        .route("/analytics/overdue-predictions", get(analytics::overdue_predictions))
        // Dashboard
        .route("/dashboard/stats", get(stats::dashboard))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
