//! HTTP API for the Mini App: entitlement queries, card payment
//! initiation, the processor webhook and the manual-rail submission form.
//!
//! Every user-facing endpoint authenticates via Telegram initData; the
//! webhook is gated by a secret path token instead, since the processor
//! cannot sign initData.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::catalog::Catalog;
use crate::core::{config, AppError, AppResult};
use crate::delivery::{Delivery, Notices};
use crate::entitlements::EntitlementService;
use crate::ledger::PurchaseLedger;
use crate::payments::yookassa::{self, WebhookOutcome, YookassaClient};
use crate::telegram::webapp_auth::verify_init_data;

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub ledger: Arc<dyn PurchaseLedger>,
    pub catalog: Arc<Catalog>,
    pub entitlements: EntitlementService,
    pub delivery: Arc<dyn Delivery>,
    pub notices: Arc<dyn Notices>,
    pub yookassa: Option<YookassaClient>,
    pub bot_token: String,
}

/// API-facing error wrapper. Auth failures are deliberately opaque: the
/// client learns "unauthorized", never which verification step failed.
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Upstream(_) => {
                log::error!("Upstream failure in API handler: {}", self.0);
                (StatusCode::BAD_GATEWAY, "payment provider error".to_string())
            }
            other => {
                log::error!("API handler error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(json!({ "ok": false, "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitDataQuery {
    init_data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitDataBody {
    init_data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayCreateBody {
    init_data: String,
    product_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsdtRequestBody {
    init_data: String,
    product_id: String,
    txid: String,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn entitlements_response(
    state: &ApiState,
    init_data: &str,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = verify_init_data(init_data, &state.bot_token)?;
    let items = state.entitlements.entitlements(user_id).await?;
    let ids: Vec<&str> = items.iter().map(|i| i.product_id.as_str()).collect();
    Ok(Json(json!({
        "ok": true,
        "userId": user_id,
        "purchases": ids,
        "purchasesDetailed": items,
    })))
}

async fn entitlements_get(
    State(state): State<ApiState>,
    Query(query): Query<InitDataQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    entitlements_response(&state, &query.init_data).await
}

async fn entitlements_post(
    State(state): State<ApiState>,
    Json(body): Json<InitDataBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    entitlements_response(&state, &body.init_data).await
}

/// Create a card payment and return the hosted-checkout URL.
async fn pay_create(
    State(state): State<ApiState>,
    Json(body): Json<PayCreateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = verify_init_data(&body.init_data, &state.bot_token)?;

    let client = state.yookassa.as_ref().ok_or_else(|| {
        AppError::Validation("card payments are not available".to_string())
    })?;

    let payment =
        yookassa::initiate_card_payment(client, &state.catalog, user_id, &body.product_id).await?;
    Ok(Json(json!({
        "ok": true,
        "paymentId": payment.payment_id,
        "confirmationUrl": payment.confirmation_url,
    })))
}

/// Processor webhook. The path token is the only gate; a mismatch looks
/// identical to a route that does not exist.
async fn yookassa_webhook(
    State(state): State<ApiState>,
    Path(token): Path<String>,
    body: String,
) -> Response {
    let expected = &*config::payments::YOOKASSA_WEBHOOK_TOKEN;
    if expected.is_empty() || token != *expected {
        return StatusCode::NOT_FOUND.into_response();
    }

    let client = match state.yookassa.as_ref() {
        Some(c) => c,
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    let event = match yookassa::parse_webhook(&body) {
        Ok(event) => event,
        Err(e) => {
            log::warn!("Malformed webhook body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match yookassa::apply_webhook_event(
        client,
        &*state.ledger,
        &*state.delivery,
        &*state.notices,
        event,
    )
    .await
    {
        Ok(outcome) => {
            if outcome == WebhookOutcome::Ignored {
                log::debug!("Webhook acknowledged without ledger change");
            }
            // 200 even for business no-ops: a retry cannot make an
            // unroutable notification routable.
            (StatusCode::OK, Json(json!({ "ok": true }))).into_response()
        }
        Err(e) => {
            // Storage or lookup failure: non-2xx so the processor retries.
            log::error!("Webhook reconciliation failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Manual USDT rail: record the claim and show the transfer details.
async fn usdt_request(
    State(state): State<ApiState>,
    Json(body): Json<UsdtRequestBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = verify_init_data(&body.init_data, &state.bot_token)?;

    let request = crate::payments::usdt::submit_request(
        &state.catalog,
        &*state.notices,
        user_id,
        &body.product_id,
        &body.txid,
    )
    .await?;

    Ok(Json(json!({
        "ok": true,
        "status": "pending",
        "address": &*config::payments::USDT_ADDRESS,
        "network": &*config::payments::USDT_NETWORK,
        "amountUsdt": request.amount_usdt,
    })))
}

pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Entitlement responses are per-user; nothing here may be cached.
    let no_store = SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );

    Router::new()
        .route("/api/health", get(health).post(health))
        .route("/api/entitlements", get(entitlements_get).post(entitlements_post))
        .route("/api/pay/create", post(pay_create))
        .route("/api/yookassa/webhook/{token}", post(yookassa_webhook))
        .route("/api/usdt/request", post(usdt_request))
        .layer(no_store)
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn run_api_server(state: ApiState) -> AppResult<()> {
    let port = *config::api::API_PORT;
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("API server listening on {}", addr);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
