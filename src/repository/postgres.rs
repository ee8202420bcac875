//! Postgres ledger store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Book, Loan, LoanFilter, LoanStatus, LoanUpdate},
};

use super::LedgerStore;

/// Unique index guarding one active loan per (user, book)
const ACTIVE_LOAN_INDEX: &str = "loans_one_active_per_user_book";

/// Raw loan row; status is stored as text
#[derive(Debug, FromRow)]
struct LoanRow {
    id: Uuid,
    user_id: Uuid,
    book_id: Uuid,
    borrowed_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
    status: String,
    fine_amount: Decimal,
}

impl TryFrom<LoanRow> for Loan {
    type Error = AppError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        Ok(Loan {
            id: row.id,
            user_id: row.user_id,
            book_id: row.book_id,
            borrowed_at: row.borrowed_at,
            due_at: row.due_at,
            returned_at: row.returned_at,
            status: row.status.parse().map_err(AppError::Internal)?,
            fine_amount: row.fine_amount,
        })
    }
}

/// Book row joined with its active loan count
#[derive(Debug, FromRow)]
struct AuditRow {
    #[sqlx(flatten)]
    book: Book,
    active_loans: i32,
}

/// Connection-level failures are transient; everything else is a database error
fn store_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            AppError::Unavailable(e.to_string())
        }
        other => AppError::Database(other),
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn book_exists(&self, book_id: Uuid) -> AppResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = $1)")
            .bind(book_id)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)
    }

    async fn loan_status(&self, loan_id: Uuid) -> AppResult<Option<String>> {
        sqlx::query_scalar("SELECT status FROM loans WHERE id = $1")
            .bind(loan_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn get_book(&self, book_id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, genre, tags, total_copies, available_copies, created_at
            FROM books WHERE id = $1
            "#,
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, genre, tags, total_copies, available_copies, created_at
            FROM books ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)
    }

    async fn adjust_copies(&self, book_id: Uuid, delta: i32) -> AppResult<i32> {
        // Single conditional statement: the bound check and the write cannot interleave
        let updated: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE books
            SET available_copies = available_copies + $2
            WHERE id = $1
              AND available_copies + $2 >= 0
              AND available_copies + $2 <= total_copies
            RETURNING available_copies
            "#,
        )
        .bind(book_id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match updated {
            Some(value) => Ok(value),
            None if self.book_exists(book_id).await? => Err(AppError::ConstraintViolation(
                format!("available_copies for book {} cannot move by {}", book_id, delta),
            )),
            None => Err(AppError::NotFound(format!("Book with id {} not found", book_id))),
        }
    }

    async fn create_loan(&self, loan: &Loan) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO loans (id, user_id, book_id, borrowed_at, due_at, returned_at, status, fine_amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(loan.id)
        .bind(loan.user_id)
        .bind(loan.book_id)
        .bind(loan.borrowed_at)
        .bind(loan.due_at)
        .bind(loan.returned_at)
        .bind(loan.status.as_str())
        .bind(loan.fine_amount)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let message = if db.constraint() == Some(ACTIVE_LOAN_INDEX) {
                    format!(
                        "User {} already holds an active loan on book {}",
                        loan.user_id, loan.book_id
                    )
                } else {
                    format!("Loan {} already exists", loan.id)
                };
                Err(AppError::Conflict(message))
            }
            Err(e) => Err(store_error(e)),
        }
    }

    async fn get_loan(&self, loan_id: Uuid) -> AppResult<Loan> {
        sqlx::query_as::<_, LoanRow>("SELECT * FROM loans WHERE id = $1")
            .bind(loan_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?
            .try_into()
    }

    async fn conditional_update_loan(
        &self,
        loan_id: Uuid,
        expected: LoanStatus,
        update: LoanUpdate,
    ) -> AppResult<Loan> {
        let row = sqlx::query_as::<_, LoanRow>(
            r#"
            UPDATE loans
            SET status = $3,
                returned_at = COALESCE($4, returned_at),
                fine_amount = COALESCE($5, fine_amount)
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(loan_id)
        .bind(expected.as_str())
        .bind(update.status.as_str())
        .bind(update.returned_at)
        .bind(update.fine_amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        match row {
            Some(row) => row.try_into(),
            None => match self.loan_status(loan_id).await? {
                Some(actual) => Err(AppError::StatusMismatch {
                    loan_id: loan_id.to_string(),
                    expected: expected.to_string(),
                    actual,
                }),
                None => Err(AppError::NotFound(format!("Loan with id {} not found", loan_id))),
            },
        }
    }

    async fn query_loans(&self, filter: &LoanFilter) -> AppResult<Vec<Loan>> {
        let statuses: Vec<String> = filter
            .statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let rows = sqlx::query_as::<_, LoanRow>(
            r#"
            SELECT * FROM loans
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::uuid IS NULL OR book_id = $2)
              AND (cardinality($3::text[]) = 0 OR status = ANY($3))
              AND ($4::timestamptz IS NULL OR due_at < $4)
              AND ($5::timestamptz IS NULL OR due_at > $5)
              AND ($6::timestamptz IS NULL OR borrowed_at >= $6)
            ORDER BY borrowed_at, id
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.book_id)
        .bind(&statuses)
        .bind(filter.due_before)
        .bind(filter.due_after)
        .bind(filter.borrowed_since)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(Loan::try_from).collect()
    }

    async fn audit_snapshot(&self) -> AppResult<Vec<(Book, i32)>> {
        // One statement, so counters and loans come from the same snapshot
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT b.id, b.title, b.author, b.genre, b.tags, b.total_copies,
                   b.available_copies, b.created_at,
                   COALESCE(a.active, 0)::INT4 AS active_loans
            FROM books b
            LEFT JOIN (
                SELECT book_id, COUNT(*) AS active
                FROM loans
                WHERE status IN ('borrowed', 'overdue')
                GROUP BY book_id
            ) a ON a.book_id = b.id
            ORDER BY b.created_at, b.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(|r| (r.book, r.active_loans)).collect())
    }
}
