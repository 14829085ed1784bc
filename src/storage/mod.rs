//! Storage interfaces and implementations for persisting orders.

mod sqlite;

pub use sqlite::{SqliteStorage, SqliteStorageConfig};

use crate::domain::{Order, OrderId};
use async_trait::async_trait;

/// OrderRepository persists orders and their status history.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Upserts the order row and appends history entries not stored yet.
    async fn save(&self, order: &Order) -> Result<(), StorageError>;

    /// Deletes an order and its history. Returns true if a row was removed.
    async fn delete(&self, id: &OrderId) -> Result<bool, StorageError>;

    /// Loads every order with its history, oldest order first.
    async fn load_all(&self) -> Result<Vec<Order>, StorageError>;

    /// Count returns the total number of stored orders.
    async fn count(&self) -> Result<i64, StorageError>;

    /// Close closes the storage connection.
    async fn close(&self) -> Result<(), StorageError>;
}

/// StorageError represents errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
