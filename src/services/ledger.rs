//! Lending ledger: borrow, return and overdue sweep.
//!
//! Each operation combines the inventory guard and the loan state machine so
//! that the counter and the loan records move together. Steps that cannot be
//! made atomic in the store are paired with a compensating release.

use std::{future::Future, sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        book::{Availability, AvailabilityDiscrepancy},
        loan::{BorrowRequest, OverdueLoan, ReturnReceipt},
        Actor, Loan, LoanFilter, LoanStatus,
    },
    repository::SharedStore,
};

use super::{
    clock::SharedClock,
    inventory::InventoryGuard,
    loan_state::{days_late, LoanStateMachine},
};

/// Conditional-update attempts per return before giving up
const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Ledger tuning, derived from `[lending]`
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub default_borrow_days: i64,
    pub max_borrow_days: i64,
    pub operation_timeout: StdDuration,
    pub compensation_retries: u32,
    pub compensation_backoff: StdDuration,
}

impl From<&LendingConfig> for LedgerSettings {
    fn from(config: &LendingConfig) -> Self {
        Self {
            default_borrow_days: config.default_borrow_days,
            max_borrow_days: config.max_borrow_days,
            operation_timeout: StdDuration::from_millis(config.operation_timeout_ms),
            compensation_retries: config.compensation_retries.max(1),
            compensation_backoff: StdDuration::from_millis(config.compensation_backoff_ms),
        }
    }
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self::from(&LendingConfig::default())
    }
}

/// Release that exhausted its retries and still has to be applied
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingCompensation {
    pub book_id: Uuid,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct LendingLedger {
    store: SharedStore,
    inventory: InventoryGuard,
    machine: LoanStateMachine,
    clock: SharedClock,
    settings: LedgerSettings,
    pending: Arc<Mutex<Vec<PendingCompensation>>>,
}

impl LendingLedger {
    pub fn new(
        store: SharedStore,
        machine: LoanStateMachine,
        clock: SharedClock,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            inventory: InventoryGuard::new(store.clone()),
            store,
            machine,
            clock,
            settings,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Borrow a copy of `request.book_id` for the actor
    pub async fn borrow(&self, actor: Actor, request: BorrowRequest) -> AppResult<Loan> {
        request.validate()?;
        let days = request
            .borrow_days
            .unwrap_or(self.settings.default_borrow_days);
        if days > self.settings.max_borrow_days {
            return Err(AppError::Validation(format!(
                "borrow_days must be at most {}",
                self.settings.max_borrow_days
            )));
        }

        let ledger = self.clone();
        let book_id = request.book_id;
        self.bounded("borrow", async move {
            ledger
                .borrow_inner(actor.user_id, book_id, Duration::days(days))
                .await
        })
        .await
    }

    async fn borrow_inner(&self, user_id: Uuid, book_id: Uuid, period: Duration) -> AppResult<Loan> {
        let active = LoanFilter {
            user_id: Some(user_id),
            book_id: Some(book_id),
            ..Default::default()
        }
        .with_statuses(&LoanStatus::ACTIVE);

        if !self.store.query_loans(&active).await?.is_empty() {
            return Err(already_borrowed(user_id, book_id));
        }

        self.inventory.reserve(book_id).await?;

        let loan = Loan::open(user_id, book_id, self.clock.now(), period);
        if let Err(e) = self.store.create_loan(&loan).await {
            if e.is_client_error() {
                tracing::debug!("Loan for book {} rejected by store: {}", book_id, e);
            } else {
                tracing::warn!("Failed to record loan for book {}: {}", book_id, e);
            }
            self.release_with_retry(book_id, &format!("undo reservation for loan {}", loan.id))
                .await?;
            return Err(match e {
                // Lost a race against a concurrent borrow of the same book by the same user
                AppError::Conflict(_) => already_borrowed(user_id, book_id),
                other => other,
            });
        }

        tracing::info!(
            "Loan {} opened: user {} borrowed book {} until {}",
            loan.id,
            user_id,
            book_id,
            loan.due_at
        );
        Ok(loan)
    }

    /// Return a loan; the actor must own it or be a librarian
    pub async fn return_loan(&self, actor: Actor, loan_id: Uuid) -> AppResult<ReturnReceipt> {
        let ledger = self.clone();
        self.bounded("return", async move { ledger.return_inner(actor, loan_id).await })
            .await
    }

    async fn return_inner(&self, actor: Actor, loan_id: Uuid) -> AppResult<ReturnReceipt> {
        let mut last_error = None;

        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let loan = self.store.get_loan(loan_id).await?;
            if !actor.can_act_for(loan.user_id) {
                return Err(AppError::Forbidden(format!(
                    "Not authorized to return loan {}",
                    loan_id
                )));
            }

            let transition = self.machine.return_loan(&loan, self.clock.now())?;
            match self
                .store
                .conditional_update_loan(loan_id, transition.from, transition.update)
                .await
            {
                Ok(returned) => {
                    self.release_with_retry(returned.book_id, &format!("return of loan {}", loan_id))
                        .await?;
                    tracing::info!(
                        "Loan {} returned (book {}, fine {})",
                        loan_id,
                        returned.book_id,
                        returned.fine_amount
                    );
                    return Ok(ReturnReceipt {
                        fine_amount: returned.fine_amount,
                        loan: returned,
                    });
                }
                Err(e @ AppError::StatusMismatch { .. }) => {
                    // A sweep moved the loan under us; re-read and retry
                    tracing::debug!("Retrying return of loan {}: {}", loan_id, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::Internal(format!("Return of loan {} did not converge", loan_id))
        }))
    }

    /// Move every `borrowed` loan due before `now` to `overdue`
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let candidates = LoanFilter {
            due_before: Some(now),
            ..Default::default()
        }
        .with_statuses(&[LoanStatus::Borrowed]);

        let mut swept = Vec::new();
        for loan in self.store.query_loans(&candidates).await? {
            let Some(transition) = self.machine.mark_overdue(&loan, now) else {
                continue;
            };
            match self
                .store
                .conditional_update_loan(loan.id, transition.from, transition.update)
                .await
            {
                Ok(updated) => swept.push(updated),
                // Returned concurrently; the terminal state wins
                Err(AppError::StatusMismatch { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        if !swept.is_empty() {
            tracing::info!("Overdue sweep marked {} loan(s) overdue", swept.len());
        }
        Ok(swept)
    }

    /// Sweep at the current time
    pub async fn sweep_now(&self) -> AppResult<Vec<Loan>> {
        self.sweep_overdue(self.clock.now()).await
    }

    /// Librarians see every loan, members their own; newest first
    pub async fn list_loans(&self, actor: Actor) -> AppResult<Vec<Loan>> {
        let filter = if actor.is_privileged() {
            LoanFilter::default()
        } else {
            LoanFilter::for_user(actor.user_id)
        };
        let mut loans = self.store.query_loans(&filter).await?;
        loans.reverse();
        Ok(loans)
    }

    /// Sweep, then list overdue loans with the fine accrued so far
    pub async fn overdue_report(&self, actor: Actor) -> AppResult<Vec<OverdueLoan>> {
        actor.require_librarian()?;
        let now = self.clock.now();
        self.sweep_overdue(now).await?;

        let overdue = LoanFilter::default().with_statuses(&[LoanStatus::Overdue]);
        let fines = self.machine.fines();
        Ok(self
            .store
            .query_loans(&overdue)
            .await?
            .into_iter()
            .map(|loan| OverdueLoan {
                overdue_days: days_late(loan.due_at, now),
                accrued_fine: fines.fine_for(loan.due_at, now),
                loan,
            })
            .collect())
    }

    pub async fn availability(&self, book_id: Uuid) -> AppResult<Availability> {
        Ok(Availability::from(&self.store.get_book(book_id).await?))
    }

    /// Books whose counter disagrees with `total_copies - active loans`
    pub async fn audit_availability(&self, actor: Actor) -> AppResult<Vec<AvailabilityDiscrepancy>> {
        actor.require_librarian()?;

        let discrepancies: Vec<AvailabilityDiscrepancy> = self
            .store
            .audit_snapshot()
            .await?
            .into_iter()
            .filter_map(|(book, active_loans)| {
                let expected_available = book.total_copies - active_loans;
                (book.available_copies != expected_available).then(|| AvailabilityDiscrepancy {
                    book_id: book.id,
                    total_copies: book.total_copies,
                    available_copies: book.available_copies,
                    active_loans,
                    expected_available,
                })
            })
            .collect();

        for d in &discrepancies {
            tracing::error!(
                "Availability drift on book {}: counter {} but {} expected",
                d.book_id,
                d.available_copies,
                d.expected_available
            );
        }
        Ok(discrepancies)
    }

    pub async fn pending_compensations(&self) -> Vec<PendingCompensation> {
        self.pending.lock().await.clone()
    }

    /// Re-attempt queued releases once each; returns how many were applied
    pub async fn retry_pending_compensations(&self) -> usize {
        let queued = std::mem::take(&mut *self.pending.lock().await);
        let mut applied = 0;
        let mut still_pending = Vec::new();

        for item in queued {
            match self.inventory.release(item.book_id).await {
                Ok(_) => {
                    tracing::info!("Applied pending release for book {} ({})", item.book_id, item.reason);
                    applied += 1;
                }
                Err(e) if e.is_transient() => {
                    tracing::error!("Pending release for book {} still failing: {}", item.book_id, e);
                    still_pending.push(item);
                }
                Err(e) => {
                    tracing::error!(
                        "Dropping pending release for book {} ({}): {}",
                        item.book_id,
                        item.reason,
                        e
                    );
                }
            }
        }

        self.pending.lock().await.extend(still_pending);
        applied
    }

    /// Release one copy, retrying transient failures with linear backoff.
    /// When every attempt fails the release is queued and
    /// `CompensationFailed` is returned. A refused release (counter already at
    /// capacity, unknown book) is reported and never queued.
    async fn release_with_retry(&self, book_id: Uuid, reason: &str) -> AppResult<()> {
        let mut last_error = String::new();

        for attempt in 1..=self.settings.compensation_retries {
            match self.inventory.release(book_id).await {
                Ok(_) => return Ok(()),
                Err(e) if !e.is_transient() => {
                    tracing::error!(
                        "Release of book {} for {} refused, not queued: {}",
                        book_id,
                        reason,
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        "Release of book {} failed (attempt {}/{}): {}",
                        book_id,
                        attempt,
                        self.settings.compensation_retries,
                        e
                    );
                    last_error = e.to_string();
                    if attempt < self.settings.compensation_retries {
                        tokio::time::sleep(self.settings.compensation_backoff * attempt).await;
                    }
                }
            }
        }

        tracing::error!(
            "Release of book {} for {} abandoned, queued for retry: {}",
            book_id,
            reason,
            last_error
        );
        self.pending.lock().await.push(PendingCompensation {
            book_id,
            reason: reason.to_string(),
            recorded_at: self.clock.now(),
        });
        Err(AppError::CompensationFailed(format!(
            "book {} ({}): {}",
            book_id, reason, last_error
        )))
    }

    /// Run `operation` to completion on its own task and wait at most the
    /// configured timeout. On expiry the task keeps running (so compensation
    /// is never cut short) and the caller gets `Indeterminate`.
    async fn bounded<T, F>(&self, name: &str, operation: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: Future<Output = AppResult<T>> + Send + 'static,
    {
        let task = tokio::spawn(operation);
        match tokio::time::timeout(self.settings.operation_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(AppError::Internal(format!(
                "{} task failed: {}",
                name, join_error
            ))),
            Err(_) => {
                tracing::warn!(
                    "{} did not complete within {:?}; outcome unknown",
                    name,
                    self.settings.operation_timeout
                );
                Err(AppError::Indeterminate(format!(
                    "{} not confirmed within {:?}; verify before retrying",
                    name, self.settings.operation_timeout
                )))
            }
        }
    }
}

fn already_borrowed(user_id: Uuid, book_id: Uuid) -> AppError {
    AppError::AlreadyBorrowed {
        user_id: user_id.to_string(),
        book_id: book_id.to_string(),
    }
}
