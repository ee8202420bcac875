//! In-process ledger store.
//!
//! A single async mutex serializes every call, which makes each operation
//! linearizable. Used by the `memory` backend and the test suites.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Book, Loan, LoanFilter, LoanStatus, LoanUpdate, NewBook},
};

use super::LedgerStore;

#[derive(Default)]
struct Tables {
    books: IndexMap<Uuid, Book>,
    loans: IndexMap<Uuid, Loan>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with a catalog
    pub fn with_books(books: impl IntoIterator<Item = NewBook>) -> Self {
        let tables = Tables {
            books: books
                .into_iter()
                .map(|b| {
                    let book = b.into_book();
                    (book.id, book)
                })
                .collect(),
            loans: IndexMap::new(),
        };
        Self {
            tables: Mutex::new(tables),
        }
    }

    /// Load a JSON array of catalog entries
    pub fn from_seed_file(path: &str) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Internal(format!("Failed to read seed file {}: {}", path, e)))?;
        let books: Vec<NewBook> = serde_json::from_str(&raw)
            .map_err(|e| AppError::Internal(format!("Invalid seed file {}: {}", path, e)))?;
        tracing::info!("Seeded memory store with {} books from {}", books.len(), path);
        Ok(Self::with_books(books))
    }

    pub async fn insert_book(&self, book: NewBook) -> Book {
        let book = book.into_book();
        self.tables.lock().await.books.insert(book.id, book.clone());
        book
    }

    /// Write a loan record as-is, bypassing the ledger (history fixtures)
    pub async fn insert_loan(&self, loan: Loan) {
        self.tables.lock().await.loans.insert(loan.id, loan);
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_book(&self, book_id: Uuid) -> AppResult<Book> {
        self.tables
            .lock()
            .await
            .books
            .get(&book_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
    }

    async fn list_books(&self) -> AppResult<Vec<Book>> {
        let tables = self.tables.lock().await;
        let mut books: Vec<Book> = tables.books.values().cloned().collect();
        books.sort_by_key(|b| b.created_at);
        Ok(books)
    }

    async fn adjust_copies(&self, book_id: Uuid, delta: i32) -> AppResult<i32> {
        let mut tables = self.tables.lock().await;
        let book = tables
            .books
            .get_mut(&book_id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        let next = book.available_copies + delta;
        if next < 0 || next > book.total_copies {
            return Err(AppError::ConstraintViolation(format!(
                "available_copies for book {} would become {} (total {})",
                book_id, next, book.total_copies
            )));
        }
        book.available_copies = next;
        Ok(next)
    }

    async fn create_loan(&self, loan: &Loan) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.loans.contains_key(&loan.id) {
            return Err(AppError::Conflict(format!("Loan {} already exists", loan.id)));
        }
        let duplicate = tables.loans.values().any(|l| {
            l.user_id == loan.user_id && l.book_id == loan.book_id && l.status.is_active()
        });
        if duplicate && loan.status.is_active() {
            return Err(AppError::Conflict(format!(
                "User {} already holds an active loan on book {}",
                loan.user_id, loan.book_id
            )));
        }
        tables.loans.insert(loan.id, loan.clone());
        Ok(())
    }

    async fn get_loan(&self, loan_id: Uuid) -> AppResult<Loan> {
        self.tables
            .lock()
            .await
            .loans
            .get(&loan_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))
    }

    async fn conditional_update_loan(
        &self,
        loan_id: Uuid,
        expected: LoanStatus,
        update: LoanUpdate,
    ) -> AppResult<Loan> {
        let mut tables = self.tables.lock().await;
        let loan = tables
            .loans
            .get_mut(&loan_id)
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;

        if loan.status != expected {
            return Err(AppError::StatusMismatch {
                loan_id: loan_id.to_string(),
                expected: expected.to_string(),
                actual: loan.status.to_string(),
            });
        }

        loan.status = update.status;
        if let Some(returned_at) = update.returned_at {
            loan.returned_at = Some(returned_at);
        }
        if let Some(fine) = update.fine_amount {
            loan.fine_amount = fine;
        }
        Ok(loan.clone())
    }

    async fn query_loans(&self, filter: &LoanFilter) -> AppResult<Vec<Loan>> {
        let tables = self.tables.lock().await;
        let mut loans: Vec<Loan> = tables
            .loans
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.borrowed_at);
        Ok(loans)
    }

    async fn audit_snapshot(&self) -> AppResult<Vec<(Book, i32)>> {
        let tables = self.tables.lock().await;
        let mut active: HashMap<Uuid, i32> = HashMap::new();
        for loan in tables.loans.values().filter(|l| l.status.is_active()) {
            *active.entry(loan.book_id).or_default() += 1;
        }

        let mut books: Vec<(Book, i32)> = tables
            .books
            .values()
            .map(|b| (b.clone(), active.get(&b.id).copied().unwrap_or(0)))
            .collect();
        books.sort_by_key(|(b, _)| b.created_at);
        Ok(books)
    }
}
