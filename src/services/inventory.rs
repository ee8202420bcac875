//! Inventory guard: the only writer of `available_copies`

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    repository::SharedStore,
};

#[derive(Clone)]
pub struct InventoryGuard {
    store: SharedStore,
}

impl InventoryGuard {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Take one copy. `Exhausted` when none is left.
    ///
    /// The decrement is a single store-side conditional adjustment, so two
    /// callers racing for the last copy cannot both succeed.
    pub async fn reserve(&self, book_id: Uuid) -> AppResult<i32> {
        match self.store.adjust_copies(book_id, -1).await {
            Ok(remaining) => {
                tracing::debug!("Reserved copy of book {} ({} left)", book_id, remaining);
                Ok(remaining)
            }
            Err(AppError::ConstraintViolation(_)) => Err(AppError::Exhausted(book_id.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Put one copy back.
    ///
    /// A release past `total_copies` means the ledger is corrupt; it is
    /// reported as `ConstraintViolation`, never clamped.
    pub async fn release(&self, book_id: Uuid) -> AppResult<i32> {
        match self.store.adjust_copies(book_id, 1).await {
            Ok(available) => {
                tracing::debug!("Released copy of book {} ({} available)", book_id, available);
                Ok(available)
            }
            Err(AppError::ConstraintViolation(msg)) => {
                tracing::error!("Release beyond capacity for book {}: {}", book_id, msg);
                Err(AppError::ConstraintViolation(msg))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::NewBook, repository::MemoryStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reserve_until_exhausted() {
        let store = Arc::new(MemoryStore::new());
        let book = store.insert_book(NewBook::new("Solaris", "Sci-Fi", 2)).await;
        let guard = InventoryGuard::new(store.clone());

        assert_eq!(guard.reserve(book.id).await.unwrap(), 1);
        assert_eq!(guard.reserve(book.id).await.unwrap(), 0);
        assert!(matches!(guard.reserve(book.id).await, Err(AppError::Exhausted(_))));
    }

    #[tokio::test]
    async fn test_release_beyond_capacity_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let book = store.insert_book(NewBook::new("Solaris", "Sci-Fi", 1)).await;
        let guard = InventoryGuard::new(store.clone());

        assert!(matches!(
            guard.release(book.id).await,
            Err(AppError::ConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_book() {
        let guard = InventoryGuard::new(Arc::new(MemoryStore::new()));
        assert!(matches!(guard.reserve(Uuid::new_v4()).await, Err(AppError::NotFound(_))));
        assert!(matches!(guard.release(Uuid::new_v4()).await, Err(AppError::NotFound(_))));
    }
}
