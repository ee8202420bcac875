//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{analytics, health, loans, stats};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bookledger API",
        version = "0.1.0",
        description = "Lending ledger and availability engine"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Loans
        loans::borrow,
        loans::list_loans,
        loans::return_loan,
        loans::sweep_overdue,
        loans::overdue_report,
        loans::availability,
        loans::audit,
        // Analytics
        analytics::recommendations,
        analytics::demand_forecast,
        analytics::overdue_predictions,
        // Stats
        stats::dashboard,
    ),
    components(
        schemas(
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::LoanStatus,
            crate::models::loan::BorrowRequest,
            crate::models::loan::ReturnReceipt,
            crate::models::loan::OverdueLoan,
            crate::models::book::Availability,
            crate::models::book::AvailabilityDiscrepancy,
            loans::SweepResponse,
            // Analytics
            crate::models::analytics::BookRecommendation,
            crate::models::analytics::DemandForecast,
            crate::models::analytics::OverduePrediction,
            crate::models::analytics::RiskLevel,
            // Stats
            crate::services::stats::DashboardStats,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "loans", description = "Borrow, return and overdue sweep"),
        (name = "analytics", description = "Recommendations, demand forecast and overdue risk"),
        (name = "stats", description = "Dashboard statistics")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
