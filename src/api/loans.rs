//! Lending ledger endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::{Availability, AvailabilityDiscrepancy},
        loan::{BorrowRequest, OverdueLoan, ReturnReceipt},
        Loan,
    },
};

use super::AuthenticatedActor;

/// Sweep result
#[derive(Serialize, ToSchema)]
pub struct SweepResponse {
    /// Number of loans moved to overdue
    pub swept: usize,
    pub loans: Vec<Loan>,
}

/// Borrow a copy of a book
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 400, description = "Invalid borrow period"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "No copies available or book already borrowed by the user"),
        (status = 504, description = "Outcome unknown; verify before retrying")
    )
)]
pub async fn borrow(
    State(state): State<crate::AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(request): Json<BorrowRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let loan = state.services.ledger.borrow(actor, request).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// List loans (all for librarians, own loans otherwise)
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loans, newest first", body = Vec<Loan>)
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> AppResult<Json<Vec<Loan>>> {
    Ok(Json(state.services.ledger.list_loans(actor).await?))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = ReturnReceipt),
        (status = 403, description = "Not the borrower"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(loan_id): Path<Uuid>,
) -> AppResult<Json<ReturnReceipt>> {
    Ok(Json(state.services.ledger.return_loan(actor, loan_id).await?))
}

/// Mark past-due loans overdue
#[utoipa::path(
    post,
    path = "/loans/sweep",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loans moved to overdue", body = SweepResponse),
        (status = 403, description = "Librarian role required")
    )
)]
pub async fn sweep_overdue(
    State(state): State<crate::AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> AppResult<Json<SweepResponse>> {
    actor.require_librarian()?;
    let loans = state.services.ledger.sweep_now().await?;
    Ok(Json(SweepResponse {
        swept: loans.len(),
        loans,
    }))
}

/// Overdue loans with accrued fines
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue loans", body = Vec<OverdueLoan>),
        (status = 403, description = "Librarian role required")
    )
)]
pub async fn overdue_report(
    State(state): State<crate::AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> AppResult<Json<Vec<OverdueLoan>>> {
    Ok(Json(state.services.ledger.overdue_report(actor).await?))
}

/// Copy counts for a book
#[utoipa::path(
    get,
    path = "/books/{id}/availability",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Availability", body = Availability),
        (status = 404, description = "Book not found")
    )
)]
pub async fn availability(
    State(state): State<crate::AppState>,
    AuthenticatedActor(_actor): AuthenticatedActor,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<Availability>> {
    Ok(Json(state.services.ledger.availability(book_id).await?))
}

/// Consistency check of counters against active loans
#[utoipa::path(
    get,
    path = "/ledger/audit",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Books whose counter has drifted", body = Vec<AvailabilityDiscrepancy>),
        (status = 403, description = "Librarian role required")
    )
)]
pub async fn audit(
    State(state): State<crate::AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> AppResult<Json<Vec<AvailabilityDiscrepancy>>> {
    Ok(Json(state.services.ledger.audit_availability(actor).await?))
}
