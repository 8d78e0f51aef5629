//! Telegram Stars rail: the native in-chat purchase flow.
//!
//! Invoice creation and pre-checkout live with the bot handlers; this
//! module owns the reconciliation step that runs when Telegram reports a
//! successful payment.

use crate::core::{AppError, AppResult};
use crate::delivery::Delivery;
use crate::ledger::{PaymentOrigin, PurchaseLedger};
use crate::payments::payload::InvoicePayload;

/// Reconcile a successful Stars payment: recover (user, product) from the
/// invoice payload and credit the ledger.
///
/// The payload is the authoritative routing source — the chat the event
/// arrived in is ignored, so payments credit the right account even when
/// the confirmation surfaces in a group.
pub async fn reconcile_successful_payment(
    ledger: &dyn PurchaseLedger,
    delivery: &dyn Delivery,
    invoice_payload: &str,
    telegram_payment_charge_id: &str,
) -> AppResult<()> {
    let payload = InvoicePayload::decode(invoice_payload).ok_or_else(|| {
        AppError::Validation(format!("undecodable invoice payload: {}", invoice_payload))
    })?;

    log::info!(
        "Stars payment confirmed: user {} product {} charge {}",
        payload.user_id,
        payload.product_id,
        telegram_payment_charge_id
    );

    crate::payments::credit_purchase(
        ledger,
        delivery,
        payload.user_id,
        &payload.product_id,
        PaymentOrigin::Stars,
        Some(telegram_payment_charge_id),
        Some(invoice_payload),
    )
    .await
}
