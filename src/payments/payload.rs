//! Stars invoice payload: the string Telegram echoes back in the
//! successful-payment event, used to recover which (user, product) to
//! credit.
//!
//! JSON is the authoritative encoding. The legacy colon-delimited form
//! ("product:user:nonce") is accepted strictly as a fallback for invoices
//! issued by the previous bot generation — a payload that parses as JSON
//! is never re-interpreted through the legacy splitter.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayload {
    pub product_id: String,
    pub user_id: i64,
    #[serde(default)]
    pub nonce: Option<String>,
}

impl InvoicePayload {
    pub fn new(product_id: &str, user_id: i64) -> Self {
        Self {
            product_id: product_id.to_string(),
            user_id,
            nonce: Some(uuid::Uuid::new_v4().simple().to_string()),
        }
    }

    /// JSON encoding, always used for new invoices.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            // A struct of strings and ints cannot fail to serialize; this
            // arm exists to keep the signature infallible.
            format!("{}:{}:", self.product_id, self.user_id)
        })
    }

    /// Decode a payload; JSON first, legacy "product:user:nonce" second.
    /// Returns None for anything that fits neither shape.
    pub fn decode(raw: &str) -> Option<Self> {
        if let Ok(parsed) = serde_json::from_str::<Self>(raw) {
            if parsed.user_id > 0 && !parsed.product_id.is_empty() {
                return Some(parsed);
            }
            // JSON-decodable but invalid: reject, never fall through to
            // the delimiter guess.
            return None;
        }

        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 3 {
            return None;
        }
        let user_id = parts[1].parse::<i64>().ok()?;
        if user_id <= 0 || parts[0].is_empty() {
            return None;
        }
        Some(Self {
            product_id: parts[0].to_string(),
            user_id,
            nonce: if parts[2].is_empty() {
                None
            } else {
                Some(parts[2].to_string())
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_round_trip() {
        let payload = InvoicePayload::new("city_full", 42);
        let decoded = InvoicePayload::decode(&payload.encode()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_legacy_fallback() {
        let decoded = InvoicePayload::decode("batumi_full_v1:42:abc123").unwrap();
        assert_eq!(decoded.product_id, "batumi_full_v1");
        assert_eq!(decoded.user_id, 42);
        assert_eq!(decoded.nonce.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_json_is_authoritative_over_legacy() {
        // Valid JSON with a bogus user id must be rejected outright, not
        // re-parsed as a colon-delimited string.
        assert!(InvoicePayload::decode(r#"{"productId":"p","userId":0}"#).is_none());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(InvoicePayload::decode("").is_none());
        assert!(InvoicePayload::decode("no-delimiters-here").is_none());
        assert!(InvoicePayload::decode("a:b:c").is_none());
        assert!(InvoicePayload::decode("p:-5:n").is_none());
        assert!(InvoicePayload::decode("a:1:b:c").is_none());
    }
}
