//! SQLite implementation of OrderRepository.

use crate::domain::{LineItem, Order, OrderId, OrderParts, StatusChange};
use crate::storage::{OrderRepository, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// SqliteStorage implements OrderRepository using SQLite.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

/// SqliteStorageConfig holds SQLite storage configuration.
#[derive(Debug, Clone)]
pub struct SqliteStorageConfig {
    /// Path to the SQLite database file.
    pub path: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
}

impl Default for SqliteStorageConfig {
    fn default() -> Self {
        Self {
            path: "data/orders.db".to_string(),
            max_connections: 5,
        }
    }
}

impl SqliteStorage {
    /// Opens (creating if needed) the database and runs migrations.
    pub async fn new(config: SqliteStorageConfig) -> Result<Self, StorageError> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let storage = Self { pool };
        storage.migrate().await?;

        info!(path = %config.path, "SQLite order storage initialized");
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                buyer_id TEXT NOT NULL,
                line_items TEXT NOT NULL,
                shipping_cost TEXT NOT NULL,
                total_price TEXT NOT NULL,
                payment_method TEXT NOT NULL,
                shipping_address TEXT NOT NULL,
                recipient_phone TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS order_history (
                order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                status TEXT NOT NULL,
                actor TEXT NOT NULL,
                at TEXT NOT NULL,
                PRIMARY KEY (order_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_buyer ON orders(buyer_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl OrderRepository for SqliteStorage {
    async fn save(&self, order: &Order) -> Result<(), StorageError> {
        let line_items = serde_json::to_string(&order.line_items)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, buyer_id, line_items, shipping_cost, total_price, payment_method,
                shipping_address, recipient_phone, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(order.id.as_str())
        .bind(&order.buyer_id)
        .bind(&line_items)
        .bind(order.shipping_cost.to_string())
        .bind(order.total_price.to_string())
        .bind(&order.payment_method)
        .bind(&order.shipping_address)
        .bind(&order.recipient_phone)
        .bind(order.status().as_str())
        .bind(order.created_at.to_rfc3339())
        .bind(order.last_change().at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let stored: i64 =
            sqlx::query("SELECT COUNT(*) as count FROM order_history WHERE order_id = ?")
                .bind(order.id.as_str())
                .fetch_one(&mut *tx)
                .await?
                .try_get("count")?;

        let mut from = usize::try_from(stored).unwrap_or(0);
        if from > order.history().len() {
            // stored history is not a prefix of this one; rewrite it
            sqlx::query("DELETE FROM order_history WHERE order_id = ?")
                .bind(order.id.as_str())
                .execute(&mut *tx)
                .await?;
            from = 0;
        }

        for (seq, change) in order.history().iter().enumerate().skip(from) {
            sqlx::query(
                "INSERT INTO order_history (order_id, seq, status, actor, at) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(order.id.as_str())
            .bind(seq as i64)
            .bind(change.status.as_str())
            .bind(change.actor.to_string())
            .bind(change.at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            order_id = %order.id,
            status = %order.status(),
            appended = order.history().len() - from,
            "Order saved"
        );
        Ok(())
    }

    async fn delete(&self, id: &OrderId) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn load_all(&self) -> Result<Vec<Order>, StorageError> {
        let history_rows = sqlx::query(
            "SELECT order_id, status, actor, at FROM order_history ORDER BY order_id, seq",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut histories: HashMap<String, Vec<StatusChange>> = HashMap::new();
        for row in &history_rows {
            let order_id: String = row.try_get("order_id")?;
            histories
                .entry(order_id)
                .or_default()
                .push(parse_history_row(row)?);
        }

        let rows = sqlx::query(
            r#"
            SELECT id, buyer_id, line_items, shipping_cost, total_price, payment_method,
                shipping_address, recipient_phone, created_at
            FROM orders ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let history = histories.remove(&id).unwrap_or_default();
                parse_order_row(row, history)
            })
            .collect()
    }

    async fn count(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM orders")
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.try_get("count")?;
        Ok(count)
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

fn parse_decimal(row: &SqliteRow, column: &str) -> Result<Decimal, StorageError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
}

fn parse_time(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StorageError> {
    let raw: String = row.try_get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
}

fn parse_history_row(row: &SqliteRow) -> Result<StatusChange, StorageError> {
    let status: String = row.try_get("status")?;
    let actor: String = row.try_get("actor")?;

    Ok(StatusChange {
        status: status
            .parse()
            .map_err(|e| StorageError::InvalidData(format!("Invalid status: {}", e)))?,
        actor: actor
            .parse()
            .map_err(|e| StorageError::InvalidData(format!("Invalid actor: {}", e)))?,
        at: parse_time(row, "at")?,
    })
}

fn parse_order_row(row: &SqliteRow, history: Vec<StatusChange>) -> Result<Order, StorageError> {
    let id: String = row.try_get("id")?;
    let line_items: String = row.try_get("line_items")?;
    let line_items: Vec<LineItem> = serde_json::from_str(&line_items)?;

    Order::from_parts(OrderParts {
        id: OrderId::from(id.clone()),
        buyer_id: row.try_get("buyer_id")?,
        line_items,
        shipping_cost: parse_decimal(row, "shipping_cost")?,
        total_price: parse_decimal(row, "total_price")?,
        payment_method: row.try_get("payment_method")?,
        shipping_address: row.try_get("shipping_address")?,
        recipient_phone: row.try_get("recipient_phone")?,
        created_at: parse_time(row, "created_at")?,
        history,
    })
    .map_err(|e| StorageError::InvalidData(format!("order {}: {}", id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Actor, CanonicalStatus};
    use crate::fixtures::{at, order, order_with_history};
    use crate::lifecycle::OrderStore;
    use tempfile::TempDir;

    async fn open(dir: &TempDir) -> SqliteStorage {
        SqliteStorage::new(SqliteStorageConfig {
            path: dir.path().join("db/orders.db").to_string_lossy().to_string(),
            max_connections: 1,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir).await;
        let original = order("o-1");

        storage.save(&original).await.unwrap();
        let loaded = storage.load_all().await.unwrap();

        assert_eq!(loaded, vec![original]);
        assert_eq!(storage.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_save_appends_new_history_only() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir).await;
        let store = OrderStore::new();
        store.insert(order("o-1")).unwrap();
        storage.save(&store.get(&"o-1".into()).unwrap()).await.unwrap();

        let applied = store
            .apply_status(&"o-1".into(), CanonicalStatus::Processing, Actor::Seller, at(10))
            .unwrap();
        storage.save(&applied.order).await.unwrap();
        // saving the same state again is a no-op
        storage.save(&applied.order).await.unwrap();

        let loaded = storage.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status(), CanonicalStatus::Processing);
        assert_eq!(loaded[0].history().len(), 2);
        assert_eq!(loaded[0].history()[1].actor, Actor::Seller);
        assert_eq!(storage.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_load_all_is_oldest_first() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir).await;

        let mut newer = order_with_history("o-new", &[CanonicalStatus::Pending]);
        newer.created_at = at(50);
        storage.save(&newer).await.unwrap();
        storage.save(&order("o-old")).await.unwrap();

        let ids: Vec<String> = storage
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id.to_string())
            .collect();
        assert_eq!(ids, vec!["o-old", "o-new"]);
    }

    #[tokio::test]
    async fn test_delete_removes_order_and_history() {
        let dir = TempDir::new().unwrap();
        let storage = open(&dir).await;
        storage
            .save(&order_with_history(
                "o-1",
                &[CanonicalStatus::Pending, CanonicalStatus::Cancelled],
            ))
            .await
            .unwrap();

        assert!(storage.delete(&"o-1".into()).await.unwrap());
        assert!(!storage.delete(&"o-1".into()).await.unwrap());
        assert!(storage.load_all().await.unwrap().is_empty());

        // re-saving after delete starts a fresh history
        storage.save(&order("o-1")).await.unwrap();
        assert_eq!(storage.load_all().await.unwrap()[0].history().len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        {
            let storage = open(&dir).await;
            storage.save(&order("o-1")).await.unwrap();
            storage.close().await.unwrap();
        }

        let storage = open(&dir).await;
        assert_eq!(storage.count().await.unwrap(), 1);
    }
}
