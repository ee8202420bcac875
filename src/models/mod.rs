//! Data models for Bookledger

pub mod actor;
pub mod analytics;
pub mod book;
pub mod loan;

// Re-export commonly used types
pub use actor::{Actor, Role};
pub use book::{Availability, Book, NewBook};
pub use loan::{Loan, LoanFilter, LoanStatus, LoanUpdate};
