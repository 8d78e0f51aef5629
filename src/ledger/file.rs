//! File-backed ledger: one JSON document, read-modify-write on every
//! mutation. Correct only under single-process, effectively-serial access;
//! the mutex serializes writers inside this process.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{now_rfc3339, PaymentOrigin, PurchaseLedger, PurchaseRecord};
use crate::core::AppResult;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDoc {
    #[serde(default)]
    users: BTreeMap<String, UserBucket>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserBucket {
    #[serde(default)]
    purchases: BTreeMap<String, StoredPurchase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPurchase {
    paid_at: String,
    #[serde(default)]
    last_delivered_at: Option<String>,
    origin: PaymentOrigin,
    #[serde(default)]
    provider_ref: Option<String>,
    #[serde(default)]
    raw_payload: Option<String>,
}

pub struct FileLedger {
    path: PathBuf,
    // Serializes the whole read-modify-write cycle.
    lock: Mutex<()>,
}

impl FileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_doc(&self) -> AppResult<LedgerDoc> {
        if !self.path.exists() {
            return Ok(LedgerDoc::default());
        }
        let raw = fs_err::tokio::read_to_string(&self.path).await?;
        if raw.trim().is_empty() {
            return Ok(LedgerDoc::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write_doc(&self, doc: &LedgerDoc) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if parent != Path::new("") {
                fs_err::tokio::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_string_pretty(doc)?;
        fs_err::tokio::write(&self.path, raw).await?;
        Ok(())
    }
}

#[async_trait]
impl PurchaseLedger for FileLedger {
    async fn exists(&self, user_id: i64, product_id: &str) -> AppResult<bool> {
        let _guard = self.lock.lock().await;
        let doc = self.read_doc().await?;
        Ok(doc
            .users
            .get(&user_id.to_string())
            .map(|u| u.purchases.contains_key(product_id))
            .unwrap_or(false))
    }

    async fn list(&self, user_id: i64) -> AppResult<Vec<PurchaseRecord>> {
        let _guard = self.lock.lock().await;
        let doc = self.read_doc().await?;
        let Some(bucket) = doc.users.get(&user_id.to_string()) else {
            return Ok(Vec::new());
        };
        Ok(bucket
            .purchases
            .iter()
            .map(|(product_id, p)| PurchaseRecord {
                user_id,
                product_id: product_id.clone(),
                paid_at: p.paid_at.clone(),
                last_delivered_at: p.last_delivered_at.clone(),
                origin: p.origin,
                provider_ref: p.provider_ref.clone(),
                raw_payload: p.raw_payload.clone(),
            })
            .collect())
    }

    async fn upsert(
        &self,
        user_id: i64,
        product_id: &str,
        origin: PaymentOrigin,
        provider_ref: Option<&str>,
        raw_payload: Option<&str>,
    ) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_doc().await?;
        let bucket = doc.users.entry(user_id.to_string()).or_default();
        // Keep the delivery stamp across re-confirmations.
        let last_delivered_at = bucket
            .purchases
            .get(product_id)
            .and_then(|p| p.last_delivered_at.clone());
        bucket.purchases.insert(
            product_id.to_string(),
            StoredPurchase {
                paid_at: now_rfc3339(),
                last_delivered_at,
                origin,
                provider_ref: provider_ref.map(str::to_string),
                raw_payload: raw_payload.map(str::to_string),
            },
        );
        self.write_doc(&doc).await
    }

    async fn remove(&self, user_id: i64, product_id: &str) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_doc().await?;
        if let Some(bucket) = doc.users.get_mut(&user_id.to_string()) {
            if bucket.purchases.remove(product_id).is_some() {
                return self.write_doc(&doc).await;
            }
        }
        Ok(())
    }

    async fn mark_delivered(&self, user_id: i64, product_id: &str) -> AppResult<()> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_doc().await?;
        if let Some(bucket) = doc.users.get_mut(&user_id.to_string()) {
            if let Some(purchase) = bucket.purchases.get_mut(product_id) {
                purchase.last_delivered_at = Some(now_rfc3339());
                return self.write_doc(&doc).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ledger() -> (tempfile::TempDir, FileLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(dir.path().join("db.json"));
        (dir, ledger)
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (_dir, ledger) = ledger();
        ledger
            .upsert(42, "city_full", PaymentOrigin::Stars, Some("charge-1"), None)
            .await
            .unwrap();
        ledger
            .upsert(42, "city_full", PaymentOrigin::Stars, Some("charge-2"), None)
            .await
            .unwrap();

        let records = ledger.list(42).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].provider_ref.as_deref(), Some("charge-2"));
        assert!(ledger.exists(42, "city_full").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_preserves_delivery_stamp() {
        let (_dir, ledger) = ledger();
        ledger
            .upsert(7, "p", PaymentOrigin::Card, None, None)
            .await
            .unwrap();
        ledger.mark_delivered(7, "p").await.unwrap();
        ledger
            .upsert(7, "p", PaymentOrigin::Card, Some("again"), None)
            .await
            .unwrap();

        let records = ledger.list(7).await.unwrap();
        assert!(records[0].last_delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (_dir, ledger) = ledger();
        // Removing something that was never there is not an error.
        ledger.remove(1, "ghost").await.unwrap();

        ledger.upsert(1, "p", PaymentOrigin::Usdt, None, None).await.unwrap();
        ledger.remove(1, "p").await.unwrap();
        ledger.remove(1, "p").await.unwrap();
        assert!(!ledger.exists(1, "p").await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_delivered_absent_is_noop() {
        let (_dir, ledger) = ledger();
        ledger.mark_delivered(9, "ghost").await.unwrap();
        assert_eq!(ledger.list(9).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_list_unknown_user_is_empty() {
        let (_dir, ledger) = ledger();
        assert!(ledger.list(12345).await.unwrap().is_empty());
    }
}
