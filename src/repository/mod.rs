//! Ledger store interface and its backends

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Book, Loan, LoanFilter, LoanStatus, LoanUpdate},
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Transactional store holding book counters and loan records.
///
/// Every mutating call is atomic on its own: `adjust_copies` never lets the
/// counter leave `[0, total_copies]` and `conditional_update_loan` only
/// applies when the stored status still equals `expected`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// `NotFound` if the book does not exist
    async fn get_book(&self, book_id: Uuid) -> AppResult<Book>;

    /// Catalog snapshot, oldest entry first
    async fn list_books(&self) -> AppResult<Vec<Book>>;

    /// Add `delta` to `available_copies` and return the new value.
    /// `ConstraintViolation` if the result would leave `[0, total_copies]`.
    async fn adjust_copies(&self, book_id: Uuid, delta: i32) -> AppResult<i32>;

    /// `Conflict` if the id is taken or the user already holds an active loan on the book
    async fn create_loan(&self, loan: &Loan) -> AppResult<()>;

    async fn get_loan(&self, loan_id: Uuid) -> AppResult<Loan>;

    /// Apply `update` only if the loan is still in `expected` status.
    /// `StatusMismatch` otherwise.
    async fn conditional_update_loan(
        &self,
        loan_id: Uuid,
        expected: LoanStatus,
        update: LoanUpdate,
    ) -> AppResult<Loan>;

    /// Loans matching the filter, ordered by `borrowed_at`
    async fn query_loans(&self, filter: &LoanFilter) -> AppResult<Vec<Loan>>;

    /// Every book with its count of active loans, read from one consistent
    /// snapshot, in catalog order
    async fn audit_snapshot(&self) -> AppResult<Vec<(Book, i32)>>;
}

/// Store handle shared by all services
pub type SharedStore = Arc<dyn LedgerStore>;
