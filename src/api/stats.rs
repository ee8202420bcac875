//! Dashboard endpoint

use axum::{extract::State, Json};

use crate::{error::AppResult, services::stats::DashboardStats};

use super::AuthenticatedActor;

/// Librarian dashboard counters
#[utoipa::path(
    get,
    path = "/dashboard/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard counters", body = DashboardStats),
        (status = 403, description = "Librarian role required")
    )
)]
pub async fn dashboard(
    State(state): State<crate::AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> AppResult<Json<DashboardStats>> {
    Ok(Json(state.services.stats.dashboard(actor).await?))
}
