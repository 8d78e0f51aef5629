//! Manual USDT (TRC-20) rail.
//!
//! No chain is watched and no processor is called: the user submits a
//! transaction id, the operator eyeballs it in a block explorer and
//! approves or rejects. Only the approve path writes to the ledger.

use lazy_regex::{regex_find, regex_is_match};
use serde::Serialize;
use url::Url;

use crate::catalog::Catalog;
use crate::core::{AppError, AppResult};
use crate::delivery::{Delivery, Notices};
use crate::ledger::{PaymentOrigin, PurchaseLedger};

/// A pending manual payment awaiting operator review.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsdtRequest {
    pub user_id: i64,
    pub product_id: String,
    pub amount_usdt: f64,
    pub txid: String,
}

/// Extract a canonical Tron transaction id (64 lowercase hex chars) from
/// whatever the user pasted: the bare id, a tronscan link, or text with
/// the id embedded somewhere.
pub fn normalize_txid(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if regex_is_match!(r"^[0-9a-fA-F]{64}$", trimmed) {
        return Some(trimmed.to_lowercase());
    }

    // Explorer links: prefer explicit query params before scanning.
    if let Ok(parsed) = Url::parse(trimmed) {
        for key in ["txid", "hash", "transaction"] {
            if let Some((_, value)) = parsed.query_pairs().find(|(k, _)| k == key) {
                if regex_is_match!(r"^[0-9a-fA-F]{64}$", &value) {
                    return Some(value.to_lowercase());
                }
            }
        }
        let haystack = format!(
            "{} {} {}",
            parsed.path(),
            parsed.fragment().unwrap_or(""),
            parsed.query().unwrap_or("")
        );
        if let Some(found) = regex_find!(r"[0-9a-fA-F]{64}", &haystack) {
            return Some(found.to_lowercase());
        }
        return None;
    }

    regex_find!(r"[0-9a-fA-F]{64}", trimmed).map(|m| m.to_lowercase())
}

/// Record a user's claim of payment and route it to the operator.
///
/// This grants nothing: the ledger is untouched until the operator
/// approves. The amount is re-derived from the catalog so the review
/// message always shows the real price.
pub async fn submit_request(
    catalog: &Catalog,
    notices: &dyn Notices,
    user_id: i64,
    product_id: &str,
    raw_txid: &str,
) -> AppResult<UsdtRequest> {
    let amount_usdt = catalog.charge_usdt(product_id)?;
    let txid = normalize_txid(raw_txid)
        .ok_or_else(|| AppError::Validation("txid not recognized".to_string()))?;

    let request = UsdtRequest {
        user_id,
        product_id: product_id.to_string(),
        amount_usdt,
        txid,
    };

    log::info!(
        "USDT payment claim: user {} product {} txid {}",
        request.user_id,
        request.product_id,
        request.txid
    );
    notices.operator_payment_review(&request).await;

    Ok(request)
}

/// Operator confirmed the transfer: credit the entitlement and deliver.
/// The txid is kept as provider_ref when the operator included one.
pub async fn approve(
    ledger: &dyn PurchaseLedger,
    delivery: &dyn Delivery,
    user_id: i64,
    product_id: &str,
    txid: Option<&str>,
) -> AppResult<()> {
    log::info!(
        "USDT approved by operator: user {} product {} txid {}",
        user_id,
        product_id,
        txid.unwrap_or("-")
    );
    crate::payments::credit_purchase(
        ledger,
        delivery,
        user_id,
        product_id,
        PaymentOrigin::Usdt,
        txid,
        None,
    )
    .await
}

/// Operator could not verify the transfer: notify the user, touch nothing.
pub async fn reject(notices: &dyn Notices, user_id: i64, product_id: &str) {
    log::info!(
        "USDT rejected by operator: user {} product {}",
        user_id,
        product_id
    );
    notices.user_request_rejected(user_id, product_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TXID: &str = "a3f1c2d4e5b6978012345678901234567890abcdefabcdefabcdefabcdef0123";

    #[test]
    fn test_bare_txid_lowercased() {
        let upper = TXID.to_uppercase();
        assert_eq!(normalize_txid(&upper).as_deref(), Some(TXID));
        assert_eq!(normalize_txid(&format!("  {}  ", TXID)).as_deref(), Some(TXID));
    }

    #[test]
    fn test_tronscan_path_link() {
        let link = format!("https://tronscan.org/#/transaction/{}", TXID);
        assert_eq!(normalize_txid(&link).as_deref(), Some(TXID));
    }

    #[test]
    fn test_query_param_preferred() {
        let link = format!("https://example.com/tx?txid={}", TXID.to_uppercase());
        assert_eq!(normalize_txid(&link).as_deref(), Some(TXID));
    }

    #[test]
    fn test_embedded_in_text() {
        let text = format!("вот платёж: {} спасибо", TXID);
        assert_eq!(normalize_txid(&text).as_deref(), Some(TXID));
    }

    #[test]
    fn test_rejects_non_txid_input() {
        assert!(normalize_txid("").is_none());
        assert!(normalize_txid("not a txid").is_none());
        // 63 hex chars: one short.
        assert!(normalize_txid(&TXID[..63]).is_none());
        assert!(normalize_txid("https://tronscan.org/#/transactions").is_none());
    }
}
