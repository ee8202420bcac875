//! Book availability record and the catalog fields the ledger reads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Catalog entry as seen by the lending ledger.
///
/// `available_copies` is owned by the inventory guard; everything else is
/// maintained by catalog management and only read here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub genre: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
}

/// Catalog entry used to seed a store (tests, memory backend)
#[derive(Debug, Clone, Deserialize)]
pub struct NewBook {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub genre: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub total_copies: i32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl NewBook {
    pub fn new(title: &str, genre: &str, total_copies: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.to_string(),
            author: "Unknown".to_string(),
            genre: genre.to_string(),
            tags: Vec::new(),
            total_copies,
            created_at: Utc::now(),
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn into_book(self) -> Book {
        Book {
            id: self.id,
            title: self.title,
            author: self.author,
            genre: self.genre,
            tags: self.tags,
            total_copies: self.total_copies,
            available_copies: self.total_copies,
            created_at: self.created_at,
        }
    }
}

/// Availability snapshot for a single book
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Availability {
    pub book_id: Uuid,
    pub total_copies: i32,
    pub available_copies: i32,
}

impl From<&Book> for Availability {
    fn from(book: &Book) -> Self {
        Self {
            book_id: book.id,
            total_copies: book.total_copies,
            available_copies: book.available_copies,
        }
    }
}

/// Book whose counter disagrees with its active loans
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AvailabilityDiscrepancy {
    pub book_id: Uuid,
    pub total_copies: i32,
    pub available_copies: i32,
    pub active_loans: i32,
    /// `total_copies - active_loans`
    pub expected_available: i32,
}
