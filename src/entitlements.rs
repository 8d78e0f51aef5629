//! Entitlement query service: the read-only "what has this user paid for"
//! projection consumed by the Mini App and the bot.

use std::sync::Arc;

use serde::Serialize;

use crate::core::AppResult;
use crate::ledger::PurchaseLedger;

/// One entitlement as shown to the frontend.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementItem {
    pub product_id: String,
    pub paid_at: String,
    pub last_downloaded_at: Option<String>,
}

/// Pure read over the ledger; no side effects, never errors on new users.
#[derive(Clone)]
pub struct EntitlementService {
    ledger: Arc<dyn PurchaseLedger>,
}

impl EntitlementService {
    pub fn new(ledger: Arc<dyn PurchaseLedger>) -> Self {
        Self { ledger }
    }

    pub async fn entitlements(&self, user_id: i64) -> AppResult<Vec<EntitlementItem>> {
        let records = self.ledger.list(user_id).await?;
        Ok(records
            .into_iter()
            .map(|r| EntitlementItem {
                product_id: r.product_id,
                paid_at: r.paid_at,
                last_downloaded_at: r.last_delivered_at,
            })
            .collect())
    }
}
