//! Operator and user notices sent through the bot.

use async_trait::async_trait;
use teloxide::prelude::*;

use crate::core::config;
use crate::delivery::Notices;
use crate::payments::usdt::UsdtRequest;

/// Send a plain text message to the configured operator, best-effort.
pub async fn notify_operator_text(bot: &Bot, text: &str) {
    let operator_id = *config::admin::ADMIN_USER_ID;
    if operator_id == 0 {
        log::warn!("No operator configured, dropping notice: {}", text);
        return;
    }
    if let Err(e) = bot.send_message(ChatId(operator_id), text).await {
        log::error!("Failed to notify operator: {}", e);
    }
}

/// Telegram-backed notices implementation.
pub struct TelegramNotices {
    bot: Bot,
}

impl TelegramNotices {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notices for TelegramNotices {
    async fn operator_payment_review(&self, request: &UsdtRequest) {
        let text = format!(
            "💰 USDT-платёж на проверку\n\
             Пользователь: {}\n\
             Товар: {}\n\
             Сумма: {} USDT ({})\n\
             TXID: {}\n\n\
             Подтвердить: /approve {} {} {}\n\
             Отклонить: /reject {} {}",
            request.user_id,
            request.product_id,
            request.amount_usdt,
            &*config::payments::USDT_NETWORK,
            request.txid,
            request.user_id,
            request.product_id,
            request.txid,
            request.user_id,
            request.product_id,
        );
        notify_operator_text(&self.bot, &text).await;
    }

    async fn user_access_revoked(&self, user_id: i64, product_id: &str) {
        let text = format!(
            "↩️ Возврат оформлен: доступ к набору «{}» отключён.\n\
             Если это ошибка — напишите /support.",
            product_id
        );
        if let Err(e) = self.bot.send_message(ChatId(user_id), text).await {
            log::error!("Failed to notify user {} about revocation: {}", user_id, e);
        }
    }

    async fn user_request_rejected(&self, user_id: i64, product_id: &str) {
        let text = format!(
            "❌ Платёж за «{}» не удалось подтвердить.\n\
             Проверьте TXID и сумму перевода или напишите /support.",
            product_id
        );
        if let Err(e) = self.bot.send_message(ChatId(user_id), text).await {
            log::error!("Failed to notify user {} about rejection: {}", user_id, e);
        }
    }
}
