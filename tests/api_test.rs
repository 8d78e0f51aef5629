//! HTTP API behavior: opaque auth, webhook gating, health.

mod common;

use std::sync::Arc;

use common::{RecordingDelivery, RecordingNotices, TEST_CATALOG};
use pretty_assertions::assert_eq;

use putevod::api::{build_router, ApiState};
use putevod::catalog::Catalog;
use putevod::entitlements::EntitlementService;
use putevod::ledger::{FileLedger, PurchaseLedger};
use putevod::payments::yookassa::YookassaClient;

const WEBHOOK_TOKEN: &str = "hook-sekret";

fn test_state(dir: &tempfile::TempDir) -> ApiState {
    // First access wins for the Lazy config; every test uses the same value.
    std::env::set_var("YOOKASSA_WEBHOOK_TOKEN", WEBHOOK_TOKEN);

    let ledger: Arc<dyn PurchaseLedger> = Arc::new(FileLedger::new(dir.path().join("db.json")));
    ApiState {
        ledger: Arc::clone(&ledger),
        catalog: Arc::new(Catalog::from_json(TEST_CATALOG).unwrap()),
        entitlements: EntitlementService::new(ledger),
        delivery: Arc::new(RecordingDelivery::new()),
        notices: Arc::new(RecordingNotices::new()),
        // Never called by these tests; webhook gating happens first.
        yookassa: Some(YookassaClient::new(
            "http://127.0.0.1:9",
            "shop",
            "secret",
            "https://t.me/back",
        )),
        bot_token: "123456:test-token".to_string(),
    }
}

async fn spawn_api(state: ApiState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, build_router(state)).await;
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_api(test_state(&dir)).await;

    let body: serde_json::Value = reqwest::get(format!("{}/api/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn test_entitlements_auth_is_opaque() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_api(test_state(&dir)).await;
    let client = reqwest::Client::new();

    // Forged, stale-looking and empty init data all get the same answer.
    for init_data in ["hash=deadbeef&user=%7B%22id%22%3A1%7D", "nonsense", ""] {
        let resp = client
            .get(format!("{}/api/entitlements", base))
            .query(&[("initData", init_data)])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "unauthorized");
    }
}

#[tokio::test]
async fn test_pay_create_requires_auth_before_validation() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_api(test_state(&dir)).await;
    let client = reqwest::Client::new();

    // Even a nonexistent product id yields only "unauthorized".
    let resp = client
        .post(format!("{}/api/pay/create", base))
        .json(&serde_json::json!({ "initData": "junk", "productId": "no_such" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_webhook_token_gate() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn_api(test_state(&dir)).await;
    let client = reqwest::Client::new();

    let unknown_event = r#"{ "event": "payment.waiting_for_capture", "object": {} }"#;

    // Wrong token: indistinguishable from a missing route.
    let resp = client
        .post(format!("{}/api/yookassa/webhook/wrong-token", base))
        .body(unknown_event)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Right token, event we do not act on: acknowledged.
    let resp = client
        .post(format!("{}/api/yookassa/webhook/{}", base, WEBHOOK_TOKEN))
        .body(unknown_event)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Right token, malformed body: bad request.
    let resp = client
        .post(format!("{}/api/yookassa/webhook/{}", base, WEBHOOK_TOKEN))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
