//! Payment reconciliation: one handler per rail, all funneling into the
//! same idempotent ledger write followed by a delivery trigger.

pub mod order_token;
pub mod payload;
pub mod stars;
pub mod usdt;
pub mod yookassa;

use crate::core::AppResult;
use crate::delivery::Delivery;
use crate::ledger::{PaymentOrigin, PurchaseLedger};

/// Credit a confirmed payment: ledger write, then delivery, then the
/// advisory delivery stamp.
///
/// The ledger write is never rolled back when delivery fails — entitlement
/// is the source of truth, and the user can re-request the file once the
/// ledger says they own it.
pub async fn credit_purchase(
    ledger: &dyn PurchaseLedger,
    delivery: &dyn Delivery,
    user_id: i64,
    product_id: &str,
    origin: PaymentOrigin,
    provider_ref: Option<&str>,
    raw_payload: Option<&str>,
) -> AppResult<()> {
    ledger
        .upsert(user_id, product_id, origin, provider_ref, raw_payload)
        .await?;

    match delivery.deliver(user_id, product_id).await {
        Ok(()) => {
            if let Err(e) = ledger.mark_delivered(user_id, product_id).await {
                log::warn!(
                    "mark_delivered failed for user {} product {}: {}",
                    user_id,
                    product_id,
                    e
                );
            }
        }
        Err(e) => {
            // Entitlement stands; the file can be re-requested.
            log::warn!(
                "Delivery failed after crediting user {} product {}: {}",
                user_id,
                product_id,
                e
            );
        }
    }

    Ok(())
}
