//! Purchase ledger: durable (user, product) → purchase record store.
//!
//! Two interchangeable backends with identical semantics:
//! - [`file::FileLedger`]: JSON document, read-modify-write, single-process
//! - [`sqlite::SqliteLedger`]: r2d2 pool, upsert-on-conflict is the only
//!   concurrency-control primitive
//!
//! `upsert` is commutative-idempotent per (user, product): a duplicate
//! confirmation refreshes paid_at / provider_ref and never creates a
//! second row. `remove` and `mark_delivered` are no-ops for absent rows.

pub mod file;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

pub use file::FileLedger;
pub use sqlite::SqliteLedger;

/// Which payment rail credited a purchase.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentOrigin {
    /// Telegram Stars in-app payment
    Stars,
    /// Card processor (YooKassa)
    Card,
    /// Manually approved USDT transfer
    Usdt,
}

/// One user's paid access to one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub user_id: i64,
    pub product_id: String,
    /// RFC 3339 timestamp of the (latest) payment confirmation
    pub paid_at: String,
    /// RFC 3339 timestamp of the latest delivery, advisory only
    #[serde(default)]
    pub last_delivered_at: Option<String>,
    pub origin: PaymentOrigin,
    /// Provider charge/payment id, kept for audit and refund lookup
    #[serde(default)]
    pub provider_ref: Option<String>,
    /// Raw confirmation payload, opaque audit blob
    #[serde(default)]
    pub raw_payload: Option<String>,
}

/// Backend-agnostic ledger contract.
#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    async fn exists(&self, user_id: i64, product_id: &str) -> AppResult<bool>;

    /// All purchase records for a user, unordered. Empty for unknown users.
    async fn list(&self, user_id: i64) -> AppResult<Vec<PurchaseRecord>>;

    /// Insert or refresh the record for (user, product). Safe to call
    /// twice; the second call overwrites paid_at / origin / provider_ref /
    /// raw_payload and preserves last_delivered_at.
    async fn upsert(
        &self,
        user_id: i64,
        product_id: &str,
        origin: PaymentOrigin,
        provider_ref: Option<&str>,
        raw_payload: Option<&str>,
    ) -> AppResult<()>;

    /// Remove the record if present; absent records are a no-op.
    async fn remove(&self, user_id: i64, product_id: &str) -> AppResult<()>;

    /// Stamp last_delivered_at with the current time; no-op if absent.
    async fn mark_delivered(&self, user_id: i64, product_id: &str) -> AppResult<()>;
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
