//! Order correlation token for asynchronous rails (card, crypto).
//!
//! Generated when a payment is initiated, round-tripped through the
//! provider's metadata, and decoded when the confirmation arrives to
//! recover which (user, product) to credit. Decoding fails closed: a
//! malformed or tampered token yields None, never a guess.

const PREFIX: &str = "v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderToken {
    pub user_id: i64,
    pub product_id: String,
    pub nonce: String,
    pub created_at: i64,
}

impl OrderToken {
    /// Build a token for a fresh payment attempt. Product ids containing
    /// the field delimiter cannot be represented and are rejected.
    pub fn issue(user_id: i64, product_id: &str) -> Option<Self> {
        if user_id <= 0 || product_id.is_empty() || product_id.contains(':') {
            return None;
        }
        Some(Self {
            user_id,
            product_id: product_id.to_string(),
            nonce: uuid::Uuid::new_v4().simple().to_string(),
            created_at: chrono::Utc::now().timestamp(),
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            PREFIX, self.user_id, self.product_id, self.nonce, self.created_at
        )
    }

    pub fn decode(raw: &str) -> Option<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 5 || parts[0] != PREFIX {
            return None;
        }
        let user_id = parts[1].parse::<i64>().ok()?;
        let created_at = parts[4].parse::<i64>().ok()?;
        if user_id <= 0 || parts[2].is_empty() || parts[3].is_empty() {
            return None;
        }
        Some(Self {
            user_id,
            product_id: parts[2].to_string(),
            nonce: parts[3].to_string(),
            created_at,
        })
    }
}
