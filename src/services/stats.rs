//! Dashboard statistics

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{Actor, Loan, LoanFilter, LoanStatus},
    repository::SharedStore,
};

const RECENT_ACTIVITY: usize = 5;

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    pub total_books: i64,
    pub total_copies: i64,
    pub available_copies: i64,
    /// Loans in `borrowed` status
    pub active_loans: i64,
    /// Loans in `overdue` status
    pub overdue_loans: i64,
    /// Latest loans by borrow date
    pub recent_activity: Vec<Loan>,
}

#[derive(Clone)]
pub struct StatsService {
    store: SharedStore,
}

impl StatsService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn dashboard(&self, actor: Actor) -> AppResult<DashboardStats> {
        actor.require_librarian()?;

        let books = self.store.list_books().await?;
        let loans = self.store.query_loans(&LoanFilter::default()).await?;

        let count = |status: LoanStatus| loans.iter().filter(|l| l.status == status).count() as i64;

        Ok(DashboardStats {
            total_books: books.len() as i64,
            total_copies: books.iter().map(|b| i64::from(b.total_copies)).sum(),
            available_copies: books.iter().map(|b| i64::from(b.available_copies)).sum(),
            active_loans: count(LoanStatus::Borrowed),
            overdue_loans: count(LoanStatus::Overdue),
            // Loans come back ordered by borrow date
            recent_activity: loans.iter().rev().take(RECENT_ACTIVITY).cloned().collect(),
        })
    }
}
