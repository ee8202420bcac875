//! Heuristic analytics endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::analytics::{BookRecommendation, DemandForecast, OverduePrediction},
};

use super::AuthenticatedActor;

#[derive(Debug, Deserialize, IntoParams)]
pub struct RecommendationQuery {
    /// Maximum number of recommendations (default 5)
    pub limit: Option<usize>,
}

/// Recommendations for a user
#[utoipa::path(
    get,
    path = "/recommendations/{user_id}",
    tag = "analytics",
    security(("bearer_auth" = [])),
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
        RecommendationQuery
    ),
    responses(
        (status = 200, description = "Ranked recommendations", body = Vec<BookRecommendation>)
    )
)]
pub async fn recommendations(
    State(state): State<crate::AppState>,
    AuthenticatedActor(_actor): AuthenticatedActor,
    Path(user_id): Path<Uuid>,
    Query(query): Query<RecommendationQuery>,
) -> AppResult<Json<Vec<BookRecommendation>>> {
    Ok(Json(
        state
            .services
            .analytics
            .recommend(user_id, query.limit)
            .await?,
    ))
}

/// Demand forecast per book
#[utoipa::path(
    get,
    path = "/analytics/demand-forecast",
    tag = "analytics",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Top books by predicted demand", body = Vec<DemandForecast>),
        (status = 403, description = "Librarian role required")
    )
)]
pub async fn demand_forecast(
    State(state): State<crate::AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> AppResult<Json<Vec<DemandForecast>>> {
    Ok(Json(state.services.analytics.forecast_demand(actor).await?))
}

/// Overdue risk for current loans
#[utoipa::path(
    get,
    path = "/analytics/overdue-predictions",
    tag = "analytics",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loans by overdue probability", body = Vec<OverduePrediction>),
        (status = 403, description = "Librarian role required")
    )
)]
pub async fn overdue_predictions(
    State(state): State<crate::AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> AppResult<Json<Vec<OverduePrediction>>> {
    Ok(Json(state.services.analytics.overdue_risk(actor).await?))
}
