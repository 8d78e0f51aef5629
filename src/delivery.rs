//! Outbound collaborator seams: file delivery and user/operator notices.
//!
//! The ledger is the source of truth; delivery happens after the ledger
//! write and is at-least-once. Implementations must tolerate being invoked
//! more than once for the same (user, product) — a retried webhook or a
//! user's "download again" both resend the same file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::InputFile;

use crate::catalog::Catalog;
use crate::core::{AppError, AppResult};
use crate::payments::usdt::UsdtRequest;

/// Hands a purchased product to the user. Invoked after every successful
/// ledger write; idempotent-safe by contract.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, user_id: i64, product_id: &str) -> AppResult<()>;
}

/// User- and operator-facing notices that are not file deliveries.
#[async_trait]
pub trait Notices: Send + Sync {
    /// Ask the operator to verify a manual USDT payment.
    async fn operator_payment_review(&self, request: &UsdtRequest);

    /// Tell the user their access was revoked after a full refund.
    async fn user_access_revoked(&self, user_id: i64, product_id: &str);

    /// Tell the user their manual payment request was rejected.
    async fn user_request_rejected(&self, user_id: i64, product_id: &str);
}

/// Инструкция по импорту точек, отправляется после каждого файла.
pub fn import_instructions() -> String {
    [
        "📍 Как импортировать точки в Organic Maps / MAPS.ME",
        "1) Скачай файл .kmz (я отправляю его документом).",
        "2) Открой файл на телефоне и выбери Organic Maps или MAPS.ME.",
        "3) Подтверди импорт — точки появятся в закладках/избранном.",
        "",
        "Если не импортируется — напиши /support (модель телефона + скрин ошибки).",
    ]
    .join("\n")
}

/// Telegram implementation: sends the .kmz document into the user's chat.
pub struct TelegramDelivery {
    bot: Bot,
    catalog: Arc<Catalog>,
}

impl TelegramDelivery {
    pub fn new(bot: Bot, catalog: Arc<Catalog>) -> Self {
        Self { bot, catalog }
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    async fn deliver(&self, user_id: i64, product_id: &str) -> AppResult<()> {
        let product = self
            .catalog
            .product(product_id)
            .ok_or_else(|| AppError::Validation(format!("unknown product: {}", product_id)))?;

        let path = product.file_path();
        if !Path::new(&path).exists() {
            return Err(AppError::Validation(format!(
                "deliverable missing on disk: {}",
                path
            )));
        }

        let chat_id = ChatId(user_id);
        self.bot
            .send_document(chat_id, InputFile::file(path))
            .caption(format!("📎 {} (.kmz)", product.display_title(&self.catalog)))
            .await?;
        self.bot.send_message(chat_id, import_instructions()).await?;

        log::info!("Delivered {} to user {}", product_id, user_id);
        Ok(())
    }
}
