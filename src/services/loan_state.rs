//! Loan state machine and fine policy.
//!
//! ```text
//! borrowed ──sweep──▶ overdue
//!     │                  │
//!     └──return──▶ returned ◀──return
//! ```
//!
//! `returned` is terminal. Transitions here are pure; the ledger applies them
//! through the store's conditional update so concurrent return and sweep
//! cannot both win.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    error::{AppError, AppResult},
    models::{Loan, LoanStatus, LoanUpdate},
};

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days by which `at` exceeds `due_at`; zero when not late
pub fn days_late(due_at: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    if at <= due_at {
        return 0;
    }
    (at - due_at).num_days()
}

/// Floor of `(due_at - now)` in days; negative once past due
pub fn days_until(due_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (due_at - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Flat per-day fine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinePolicy {
    pub per_day: Decimal,
}

impl Default for FinePolicy {
    fn default() -> Self {
        Self {
            per_day: Decimal::ONE,
        }
    }
}

impl FinePolicy {
    pub fn new(per_day: Decimal) -> Self {
        Self { per_day }
    }

    pub fn fine_for(&self, due_at: DateTime<Utc>, returned_at: DateTime<Utc>) -> Decimal {
        Decimal::from(days_late(due_at, returned_at)) * self.per_day
    }
}

/// A transition to apply with `conditional_update_loan(loan.id, from, update)`
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: LoanStatus,
    pub update: LoanUpdate,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoanStateMachine {
    fines: FinePolicy,
}

impl LoanStateMachine {
    pub fn new(fines: FinePolicy) -> Self {
        Self { fines }
    }

    pub fn fines(&self) -> FinePolicy {
        self.fines
    }

    /// `borrowed → overdue` once `now` is past due. `None` when nothing changes,
    /// which covers already-overdue and returned loans.
    pub fn mark_overdue(&self, loan: &Loan, now: DateTime<Utc>) -> Option<Transition> {
        if loan.status != LoanStatus::Borrowed || now <= loan.due_at {
            return None;
        }
        Some(Transition {
            from: LoanStatus::Borrowed,
            update: LoanUpdate {
                status: LoanStatus::Overdue,
                returned_at: None,
                fine_amount: None,
            },
        })
    }

    /// `borrowed|overdue → returned`, fined on the actual return time
    pub fn return_loan(&self, loan: &Loan, now: DateTime<Utc>) -> AppResult<Transition> {
        if loan.status == LoanStatus::Returned {
            return Err(AppError::AlreadyReturned(loan.id.to_string()));
        }
        Ok(Transition {
            from: loan.status,
            update: LoanUpdate {
                status: LoanStatus::Returned,
                returned_at: Some(now),
                fine_amount: Some(self.fines.fine_for(loan.due_at, now)),
            },
        })
    }
}
