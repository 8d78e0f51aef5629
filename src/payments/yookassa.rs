//! Card rail via the YooKassa hosted checkout.
//!
//! Two-phase: `initiate_card_payment` creates a payment object with the
//! processor and hands the confirmation URL back to the Mini App; the
//! processor later calls our webhook, and `apply_webhook_event` reconciles
//! it into the ledger. The webhook carries our order token in the payment
//! metadata, so no per-order state is kept between the two phases.

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::core::{AppError, AppResult};
use crate::delivery::{Delivery, Notices};
use crate::ledger::{PaymentOrigin, PurchaseLedger};
use crate::payments::order_token::OrderToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amount {
    pub value: String,
    pub currency: String,
}

impl Amount {
    pub fn rub(rub: i64) -> Self {
        Self {
            value: format!("{}.00", rub),
            currency: "RUB".to_string(),
        }
    }

    /// Monetary value in minor units (kopecks), for refund comparison.
    /// Fails closed: an unparsable amount is not a number we act on.
    pub fn minor_units(&self) -> Option<i64> {
        let (major, minor) = match self.value.split_once('.') {
            Some((m, k)) => (m, k),
            None => (self.value.as_str(), "0"),
        };
        if minor.len() > 2 {
            return None;
        }
        let major: i64 = major.parse().ok()?;
        let minor: i64 = format!("{:0<2}", minor).parse().ok()?;
        if major < 0 || minor < 0 {
            return None;
        }
        Some(major * 100 + minor)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMetadata {
    #[serde(default)]
    pub order_id: Option<String>,
}

/// A payment object as the processor reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentObject {
    pub id: String,
    pub status: String,
    pub amount: Amount,
    #[serde(default)]
    pub metadata: PaymentMetadata,
    #[serde(default)]
    pub confirmation: Option<Confirmation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub confirmation_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundObject {
    pub id: String,
    pub payment_id: String,
    pub status: String,
    pub amount: Amount,
}

/// Parsed webhook notification.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    PaymentSucceeded(PaymentObject),
    RefundSucceeded(RefundObject),
    /// Any other event type: acknowledged, never acted on.
    Other(String),
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    event: String,
    object: serde_json::Value,
}

/// Parse a raw webhook body. Unknown event types parse into `Other` so the
/// endpoint can ack them; a malformed body is an error.
pub fn parse_webhook(raw: &str) -> AppResult<WebhookEvent> {
    let body: WebhookBody = serde_json::from_str(raw)?;
    match body.event.as_str() {
        "payment.succeeded" => Ok(WebhookEvent::PaymentSucceeded(serde_json::from_value(
            body.object,
        )?)),
        "refund.succeeded" => Ok(WebhookEvent::RefundSucceeded(serde_json::from_value(
            body.object,
        )?)),
        other => Ok(WebhookEvent::Other(other.to_string())),
    }
}

/// What a webhook ended up doing, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Credited,
    Revoked,
    Ignored,
}

/// Thin client over the processor's REST API.
#[derive(Clone)]
pub struct YookassaClient {
    http: reqwest::Client,
    api_base: String,
    shop_id: String,
    secret_key: String,
    return_url: String,
}

impl YookassaClient {
    pub fn new(api_base: &str, shop_id: &str, secret_key: &str, return_url: &str) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(crate::core::config::network::timeout())
                .build()
                .unwrap_or_default(),
            api_base: api_base.trim_end_matches('/').to_string(),
            shop_id: shop_id.to_string(),
            secret_key: secret_key.to_string(),
            return_url: return_url.to_string(),
        }
    }

    /// Build from environment. None when credentials are absent: the card
    /// rail is simply off, not misconfigured.
    pub fn from_env() -> Option<Self> {
        use crate::core::config::payments as cfg;
        if cfg::YOOKASSA_SHOP_ID.is_empty() || cfg::YOOKASSA_SECRET_KEY.is_empty() {
            return None;
        }
        Some(Self::new(
            &cfg::YOOKASSA_API_BASE,
            &cfg::YOOKASSA_SHOP_ID,
            &cfg::YOOKASSA_SECRET_KEY,
            &cfg::YOOKASSA_RETURN_URL,
        ))
    }

    /// Create a payment object; returns it with the hosted-checkout URL.
    pub async fn create_payment(
        &self,
        token: &OrderToken,
        amount_rub: i64,
        description: &str,
    ) -> AppResult<PaymentObject> {
        let body = serde_json::json!({
            "amount": Amount::rub(amount_rub),
            "capture": true,
            "confirmation": {
                "type": "redirect",
                "return_url": self.return_url,
            },
            "description": description,
            "metadata": { "orderId": token.encode() },
        });

        let response = self
            .http
            .post(format!("{}/v3/payments", self.api_base))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", uuid::Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "payment create failed: {} {}",
                status, text
            )));
        }

        Ok(response.json::<PaymentObject>().await?)
    }

    /// Look a payment up by id (used to resolve refund webhooks).
    pub async fn get_payment(&self, payment_id: &str) -> AppResult<PaymentObject> {
        let response = self
            .http
            .get(format!("{}/v3/payments/{}", self.api_base, payment_id))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "payment lookup failed: {}",
                response.status()
            )));
        }

        Ok(response.json::<PaymentObject>().await?)
    }
}

/// A freshly created payment, ready to hand to the Mini App.
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub payment_id: String,
    pub confirmation_url: String,
}

/// Phase one: price the product, create the payment, return the id and the
/// URL to send the user to. The charge amount comes from the catalog — a
/// product without a card price never reaches the processor.
pub async fn initiate_card_payment(
    client: &YookassaClient,
    catalog: &Catalog,
    user_id: i64,
    product_id: &str,
) -> AppResult<CreatedPayment> {
    let amount_rub = catalog.charge_rub(product_id)?;
    let token = OrderToken::issue(user_id, product_id)
        .ok_or_else(|| AppError::Validation("cannot issue order token".to_string()))?;

    let description = catalog
        .product(product_id)
        .map(|p| p.display_title(catalog))
        .unwrap_or_else(|| product_id.to_string());

    let payment = client
        .create_payment(&token, amount_rub, &description)
        .await?;

    let confirmation_url = payment
        .confirmation
        .and_then(|c| c.confirmation_url)
        .ok_or_else(|| AppError::Upstream("payment created without confirmation URL".to_string()))?;

    Ok(CreatedPayment {
        payment_id: payment.id,
        confirmation_url,
    })
}

/// Phase two: reconcile a webhook notification into the ledger.
///
/// Success credits; a refund revokes only when it covers the full charge.
/// Undecodable metadata is logged and acked — replying non-2xx would only
/// make the processor retry a notification we can never route.
pub async fn apply_webhook_event(
    client: &YookassaClient,
    ledger: &dyn PurchaseLedger,
    delivery: &dyn Delivery,
    notices: &dyn Notices,
    event: WebhookEvent,
) -> AppResult<WebhookOutcome> {
    match event {
        WebhookEvent::PaymentSucceeded(payment) => {
            let token = match payment
                .metadata
                .order_id
                .as_deref()
                .and_then(OrderToken::decode)
            {
                Some(t) => t,
                None => {
                    log::warn!("payment {} has no usable order metadata", payment.id);
                    return Ok(WebhookOutcome::Ignored);
                }
            };

            let raw = serde_json::to_string(&payment).ok();
            crate::payments::credit_purchase(
                ledger,
                delivery,
                token.user_id,
                &token.product_id,
                PaymentOrigin::Card,
                Some(&payment.id),
                raw.as_deref(),
            )
            .await?;
            Ok(WebhookOutcome::Credited)
        }

        WebhookEvent::RefundSucceeded(refund) => {
            // The refund object does not carry our metadata; resolve the
            // original payment to recover the order and the full charge.
            let payment = client.get_payment(&refund.payment_id).await?;

            let full_refund = match (refund.amount.minor_units(), payment.amount.minor_units()) {
                (Some(refunded), Some(charged)) => refunded >= charged,
                _ => false,
            };
            if !full_refund {
                log::info!(
                    "Partial refund {} on payment {}: entitlement kept",
                    refund.id,
                    refund.payment_id
                );
                return Ok(WebhookOutcome::Ignored);
            }

            let token = match payment
                .metadata
                .order_id
                .as_deref()
                .and_then(OrderToken::decode)
            {
                Some(t) => t,
                None => {
                    log::warn!("refunded payment {} has no usable order metadata", payment.id);
                    return Ok(WebhookOutcome::Ignored);
                }
            };

            ledger.remove(token.user_id, &token.product_id).await?;
            notices
                .user_access_revoked(token.user_id, &token.product_id)
                .await;
            log::info!(
                "Full refund {}: revoked {} for user {}",
                refund.id,
                token.product_id,
                token.user_id
            );
            Ok(WebhookOutcome::Revoked)
        }

        WebhookEvent::Other(event) => {
            log::debug!("Ignoring webhook event {}", event);
            Ok(WebhookOutcome::Ignored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_amount_minor_units() {
        assert_eq!(Amount::rub(499).minor_units(), Some(49900));
        let half = Amount {
            value: "249.50".to_string(),
            currency: "RUB".to_string(),
        };
        assert_eq!(half.minor_units(), Some(24950));
        let junk = Amount {
            value: "oops".to_string(),
            currency: "RUB".to_string(),
        };
        assert_eq!(junk.minor_units(), None);
    }

    #[test]
    fn test_parse_webhook_events() {
        let success = r#"{
            "type": "notification",
            "event": "payment.succeeded",
            "object": {
                "id": "pay_1", "status": "succeeded",
                "amount": { "value": "499.00", "currency": "RUB" },
                "metadata": { "orderId": "v1:42:city_full:n:0" }
            }
        }"#;
        match parse_webhook(success).unwrap() {
            WebhookEvent::PaymentSucceeded(p) => {
                assert_eq!(p.id, "pay_1");
                assert_eq!(p.metadata.order_id.as_deref(), Some("v1:42:city_full:n:0"));
            }
            other => panic!("wrong event: {:?}", other),
        }

        let canceled = r#"{ "event": "payment.canceled", "object": {} }"#;
        assert!(matches!(
            parse_webhook(canceled).unwrap(),
            WebhookEvent::Other(_)
        ));

        assert!(parse_webhook("not json").is_err());
    }

    #[tokio::test]
    async fn test_create_payment_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/payments"))
            .and(header_exists("Idempotence-Key"))
            .and(header_exists("Authorization"))
            .and(body_partial_json(serde_json::json!({
                "amount": { "value": "499.00", "currency": "RUB" },
                "capture": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pay_1",
                "status": "pending",
                "amount": { "value": "499.00", "currency": "RUB" },
                "confirmation": {
                    "type": "redirect",
                    "confirmation_url": "https://checkout.example/pay_1"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = YookassaClient::new(&server.uri(), "shop", "secret", "https://t.me/back");
        let token = OrderToken::issue(42, "city_full").unwrap();
        let payment = client.create_payment(&token, 499, "Батуми — тест").await.unwrap();
        assert_eq!(payment.id, "pay_1");
        assert_eq!(
            payment.confirmation.unwrap().confirmation_url.as_deref(),
            Some("https://checkout.example/pay_1")
        );
    }

    #[tokio::test]
    async fn test_create_payment_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/payments"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = YookassaClient::new(&server.uri(), "shop", "bad", "https://t.me/back");
        let token = OrderToken::issue(42, "city_full").unwrap();
        assert!(client.create_payment(&token, 499, "x").await.is_err());
    }
}
