//! Loan (borrow) model and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Loan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Borrowed,
    Overdue,
    Returned,
}

impl LoanStatus {
    /// The copy is still out (counts against availability)
    pub fn is_active(self) -> bool {
        matches!(self, LoanStatus::Borrowed | LoanStatus::Overdue)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "borrowed",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Returned => "returned",
        }
    }

    pub const ACTIVE: [LoanStatus; 2] = [LoanStatus::Borrowed, LoanStatus::Overdue];
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "borrowed" => Ok(LoanStatus::Borrowed),
            "overdue" => Ok(LoanStatus::Overdue),
            "returned" => Ok(LoanStatus::Returned),
            other => Err(format!("Unknown loan status: {}", other)),
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loan record. Never deleted; returned loans stay as history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Loan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    #[schema(value_type = String)]
    pub fine_amount: Decimal,
}

impl Loan {
    /// New loan in `borrowed` state, due `period` after `now`
    pub fn open(user_id: Uuid, book_id: Uuid, now: DateTime<Utc>, period: chrono::Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            book_id,
            borrowed_at: now,
            due_at: now + period,
            returned_at: None,
            status: LoanStatus::Borrowed,
            fine_amount: Decimal::ZERO,
        }
    }

    /// Ever overdue or returned after its due date
    pub fn was_late(&self) -> bool {
        match self.status {
            LoanStatus::Overdue => true,
            LoanStatus::Returned => self.returned_at.map(|r| r > self.due_at).unwrap_or(false),
            LoanStatus::Borrowed => false,
        }
    }
}

/// Fields written by a conditional loan update
#[derive(Debug, Clone, PartialEq)]
pub struct LoanUpdate {
    pub status: LoanStatus,
    pub returned_at: Option<DateTime<Utc>>,
    pub fine_amount: Option<Decimal>,
}

/// Loan query filter; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanFilter {
    pub user_id: Option<Uuid>,
    pub book_id: Option<Uuid>,
    pub statuses: Vec<LoanStatus>,
    pub due_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
    pub borrowed_since: Option<DateTime<Utc>>,
}

impl LoanFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: &[LoanStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn matches(&self, loan: &Loan) -> bool {
        self.user_id.map_or(true, |u| loan.user_id == u)
            && self.book_id.map_or(true, |b| loan.book_id == b)
            && (self.statuses.is_empty() || self.statuses.contains(&loan.status))
            && self.due_before.map_or(true, |d| loan.due_at < d)
            && self.due_after.map_or(true, |d| loan.due_at > d)
            && self.borrowed_since.map_or(true, |d| loan.borrowed_at >= d)
    }
}

/// Borrow request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BorrowRequest {
    pub book_id: Uuid,
    /// Loan period in days (defaults to the configured period)
    #[validate(range(min = 1, message = "borrow_days must be at least 1"))]
    pub borrow_days: Option<i64>,
}

/// Result of a return
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnReceipt {
    pub loan: Loan,
    #[schema(value_type = String)]
    pub fine_amount: Decimal,
}

/// Overdue loan with the fine accrued so far
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OverdueLoan {
    pub loan: Loan,
    pub overdue_days: i64,
    #[schema(value_type = String)]
    pub accrued_fine: Decimal,
}
