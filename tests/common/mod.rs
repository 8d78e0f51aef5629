//! Common test utilities
//!
//! Recording stand-ins for the outbound seams (file delivery, notices) so
//! reconciliation flows can be exercised without a Telegram connection.

use std::sync::Mutex;

use async_trait::async_trait;

use putevod::core::{AppError, AppResult};
use putevod::delivery::{Delivery, Notices};
use putevod::payments::usdt::UsdtRequest;

/// Records every delivery attempt; optionally fails them all.
#[derive(Default)]
pub struct RecordingDelivery {
    pub deliveries: Mutex<Vec<(i64, String)>>,
    fail: bool,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// A delivery seam where every attempt fails.
    pub fn failing() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn deliver(&self, user_id: i64, product_id: &str) -> AppResult<()> {
        self.deliveries
            .lock()
            .unwrap()
            .push((user_id, product_id.to_string()));
        if self.fail {
            return Err(AppError::Validation("delivery unavailable".to_string()));
        }
        Ok(())
    }
}

/// Records notices instead of sending Telegram messages.
#[derive(Default)]
pub struct RecordingNotices {
    pub reviews: Mutex<Vec<UsdtRequest>>,
    pub revoked: Mutex<Vec<(i64, String)>>,
    pub rejected: Mutex<Vec<(i64, String)>>,
}

impl RecordingNotices {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Notices for RecordingNotices {
    async fn operator_payment_review(&self, request: &UsdtRequest) {
        self.reviews.lock().unwrap().push(request.clone());
    }

    async fn user_access_revoked(&self, user_id: i64, product_id: &str) {
        self.revoked
            .lock()
            .unwrap()
            .push((user_id, product_id.to_string()));
    }

    async fn user_request_rejected(&self, user_id: i64, product_id: &str) {
        self.rejected
            .lock()
            .unwrap()
            .push((user_id, product_id.to_string()));
    }
}

/// Catalog used across the reconciliation tests.
pub const TEST_CATALOG: &str = r#"{
    "cities": [{ "id": "batumi", "name": "Батуми" }],
    "products": [
        { "id": "batumi_full_v1", "cityId": "batumi", "type": "full",
          "priceStars": 199, "priceRub": 499, "priceUsdt": 5 },
        { "id": "batumi_mini_v1", "cityId": "batumi", "type": "mini" }
    ]
}"#;
