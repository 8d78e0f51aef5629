//! SQLite-backed ledger. Multi-writer safe: idempotency under concurrent
//! confirmations comes from `INSERT ... ON CONFLICT DO UPDATE` on the
//! (user_id, product_id) primary key, not from application-level locking.

use std::str::FromStr;

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use super::{now_rfc3339, PaymentOrigin, PurchaseLedger, PurchaseRecord};
use crate::core::AppResult;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

/// Create a connection pool and provision the schema.
///
/// Migrations are embedded and idempotent, so first use on a fresh file
/// creates the purchases table.
pub fn create_pool(database_path: &str) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(database_path);
    let pool = Pool::builder().max_size(10).build(manager)?;

    let mut conn = pool.get()?;
    embedded::migrations::runner()
        .run(&mut *conn)
        .map_err(|e| anyhow::anyhow!("apply migrations: {}", e))?;

    Ok(pool)
}

pub struct SqliteLedger {
    pool: DbPool,
}

impl SqliteLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (and provision) a ledger at the given path.
    pub fn open(database_path: &str) -> AppResult<Self> {
        Ok(Self::new(create_pool(database_path)?))
    }

    fn conn(&self) -> AppResult<DbConnection> {
        Ok(self.pool.get()?)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PurchaseRecord> {
    let origin: String = row.get(4)?;
    Ok(PurchaseRecord {
        user_id: row.get(0)?,
        product_id: row.get(1)?,
        paid_at: row.get(2)?,
        last_delivered_at: row.get(3)?,
        // Unknown origin strings (from a newer schema) degrade to Stars
        // rather than poisoning the whole listing.
        origin: PaymentOrigin::from_str(&origin).unwrap_or(PaymentOrigin::Stars),
        provider_ref: row.get(5)?,
        raw_payload: row.get(6)?,
    })
}

#[async_trait]
impl PurchaseLedger for SqliteLedger {
    async fn exists(&self, user_id: i64, product_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM purchases WHERE user_id = ?1 AND product_id = ?2",
            params![user_id, product_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn list(&self, user_id: i64) -> AppResult<Vec<PurchaseRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, product_id, paid_at, last_delivered_at, origin, provider_ref, raw_payload
             FROM purchases WHERE user_id = ?1",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    async fn upsert(
        &self,
        user_id: i64,
        product_id: &str,
        origin: PaymentOrigin,
        provider_ref: Option<&str>,
        raw_payload: Option<&str>,
    ) -> AppResult<()> {
        let conn = self.conn()?;
        // last_delivered_at is deliberately absent from the update set:
        // a re-confirmation must not reset the delivery stamp.
        conn.execute(
            "INSERT INTO purchases (user_id, product_id, paid_at, origin, provider_ref, raw_payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id, product_id) DO UPDATE SET
                 paid_at = excluded.paid_at,
                 origin = excluded.origin,
                 provider_ref = excluded.provider_ref,
                 raw_payload = excluded.raw_payload",
            params![
                user_id,
                product_id,
                now_rfc3339(),
                origin.to_string(),
                provider_ref,
                raw_payload
            ],
        )?;
        Ok(())
    }

    async fn remove(&self, user_id: i64, product_id: &str) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM purchases WHERE user_id = ?1 AND product_id = ?2",
            params![user_id, product_id],
        )?;
        Ok(())
    }

    async fn mark_delivered(&self, user_id: i64, product_id: &str) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE purchases SET last_delivered_at = ?3 WHERE user_id = ?1 AND product_id = ?2",
            params![user_id, product_id, now_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ledger() -> (tempfile::TempDir, SqliteLedger) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        let ledger = SqliteLedger::open(path.to_str().unwrap()).unwrap();
        (dir, ledger)
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (_dir, ledger) = ledger();
        ledger
            .upsert(42, "city_full", PaymentOrigin::Card, Some("pay-1"), Some("{}"))
            .await
            .unwrap();
        ledger
            .upsert(42, "city_full", PaymentOrigin::Card, Some("pay-2"), Some("{}"))
            .await
            .unwrap();

        let records = ledger.list(42).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].provider_ref.as_deref(), Some("pay-2"));
        assert_eq!(records[0].origin, PaymentOrigin::Card);
    }

    #[tokio::test]
    async fn test_upsert_preserves_delivery_stamp() {
        let (_dir, ledger) = ledger();
        ledger.upsert(7, "p", PaymentOrigin::Stars, None, None).await.unwrap();
        ledger.mark_delivered(7, "p").await.unwrap();
        ledger
            .upsert(7, "p", PaymentOrigin::Stars, Some("again"), None)
            .await
            .unwrap();

        let records = ledger.list(7).await.unwrap();
        assert!(records[0].last_delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_remove_and_mark_delivered_are_noop_safe() {
        let (_dir, ledger) = ledger();
        ledger.remove(1, "ghost").await.unwrap();
        ledger.mark_delivered(1, "ghost").await.unwrap();

        ledger.upsert(1, "p", PaymentOrigin::Usdt, None, None).await.unwrap();
        ledger.remove(1, "p").await.unwrap();
        assert!(!ledger.exists(1, "p").await.unwrap());
        ledger.remove(1, "p").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_unknown_user_is_empty() {
        let (_dir, ledger) = ledger();
        assert!(ledger.list(999).await.unwrap().is_empty());
    }

    #[test]
    fn test_schema_provisioning_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twice.sqlite");
        let path = path.to_str().unwrap();
        create_pool(path).unwrap();
        // Second open re-runs the migration runner against an existing schema.
        create_pool(path).unwrap();
    }
}
