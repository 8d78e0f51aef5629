//! Dispatcher schema and handler chain builders.
//!
//! The same schema is used in production and in tests. Order matters:
//! the successful-payment branch sits first so a payment confirmation can
//! never be swallowed by a more general message branch.

use std::sync::Arc;

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{LabeledPrice, Message};

use crate::catalog::Catalog;
use crate::core::config;
use crate::delivery::{import_instructions, Delivery, Notices};
use crate::ledger::PurchaseLedger;
use crate::payments::payload::InvoicePayload;
use crate::payments::{stars, usdt};
use crate::telegram::bot::Command;
use crate::telegram::keyboards;
use crate::telegram::notifications::notify_operator_text;
use crate::telegram::Bot;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Dependencies threaded through every handler.
#[derive(Clone)]
pub struct HandlerDeps {
    pub ledger: Arc<dyn PurchaseLedger>,
    pub catalog: Arc<Catalog>,
    pub delivery: Arc<dyn Delivery>,
    pub notices: Arc<dyn Notices>,
}

/// Creates the main dispatcher schema for the Telegram bot.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_payment = deps.clone();
    let deps_approve = deps.clone();
    let deps_reject = deps.clone();
    let deps_commands = deps.clone();
    let deps_webapp = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        // Successful payment handler must be first
        .branch(successful_payment_handler(deps_payment))
        // Hidden operator commands (not in Command enum)
        .branch(approve_handler(deps_approve))
        .branch(reject_handler(deps_reject))
        // Command handler
        .branch(command_handler(deps_commands))
        // Mini App sendData messages
        .branch(web_app_data_handler(deps_webapp))
        // Pre-checkout query handler
        .branch(pre_checkout_handler())
        // Callback query handler
        .branch(callback_handler(deps_callback))
}

fn message_user_id(msg: &Message) -> i64 {
    msg.from
        .as_ref()
        .and_then(|u| i64::try_from(u.id.0).ok())
        .unwrap_or(0)
}

/// Handler for successful Telegram Stars payments
fn successful_payment_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.successful_payment().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let Some(payment) = msg.successful_payment() else {
                    return Ok(());
                };
                log::info!(
                    "Received successful_payment: charge {}",
                    payment.telegram_payment_charge_id
                );

                if let Err(e) = stars::reconcile_successful_payment(
                    &*deps.ledger,
                    &*deps.delivery,
                    &payment.invoice_payload,
                    &payment.telegram_payment_charge_id.0,
                )
                .await
                {
                    log::error!("Failed to handle successful payment: {:?}", e);
                    notify_operator_text(
                        &bot,
                        &format!(
                            "PAYMENT HANDLER ERROR\nchat_id: {}\npayload: {}\nerror: {:?}",
                            msg.chat.id.0, payment.invoice_payload, e
                        ),
                    )
                    .await;
                }
                Ok(())
            }
        })
}

/// Handler for /approve operator command (hidden, not in Command enum)
///
/// Format: `/approve <user_id> <product_id> <txid>`
fn approve_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| {
            msg.text()
                .map(|text| text.starts_with("/approve"))
                .unwrap_or(false)
        })
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let operator_id = message_user_id(&msg);
                if !config::admin::is_operator(operator_id) {
                    // Hidden command: non-operators get no reaction at all.
                    log::warn!("/approve attempted by non-operator {}", operator_id);
                    return Ok(());
                }

                let text = msg.text().unwrap_or_default();
                let args: Vec<&str> = text.split_whitespace().skip(1).collect();
                let parsed = match args.as_slice() {
                    [user, product] => user.parse::<i64>().ok().map(|u| (u, *product, None)),
                    [user, product, txid] => {
                        user.parse::<i64>().ok().map(|u| (u, *product, Some(*txid)))
                    }
                    _ => None,
                };
                let Some((user_id, product_id, txid)) = parsed else {
                    let _ = bot
                        .send_message(msg.chat.id, "Формат: /approve <user_id> <product_id> [txid]")
                        .await;
                    return Ok(());
                };

                match usdt::approve(&*deps.ledger, &*deps.delivery, user_id, product_id, txid).await
                {
                    Ok(()) => {
                        let _ = bot
                            .send_message(
                                msg.chat.id,
                                format!("✅ Доступ выдан: {} → {}", user_id, product_id),
                            )
                            .await;
                    }
                    Err(e) => {
                        log::error!("/approve failed for user {}: {}", user_id, e);
                        let _ = bot
                            .send_message(msg.chat.id, format!("❌ /approve failed: {}", e))
                            .await;
                    }
                }
                Ok(())
            }
        })
}

/// Handler for /reject operator command (hidden, not in Command enum)
///
/// Format: `/reject <user_id> <product_id>`
fn reject_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| {
            msg.text()
                .map(|text| text.starts_with("/reject"))
                .unwrap_or(false)
        })
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let operator_id = message_user_id(&msg);
                if !config::admin::is_operator(operator_id) {
                    log::warn!("/reject attempted by non-operator {}", operator_id);
                    return Ok(());
                }

                let text = msg.text().unwrap_or_default();
                let args: Vec<&str> = text.split_whitespace().skip(1).collect();
                let parsed = match args.as_slice() {
                    [user, product] => user.parse::<i64>().ok().map(|u| (u, *product)),
                    _ => None,
                };
                let Some((user_id, product_id)) = parsed else {
                    let _ = bot
                        .send_message(msg.chat.id, "Формат: /reject <user_id> <product_id>")
                        .await;
                    return Ok(());
                };

                usdt::reject(&*deps.notices, user_id, product_id).await;
                let _ = bot
                    .send_message(
                        msg.chat.id,
                        format!("🚫 Запрос отклонён: {} → {}", user_id, product_id),
                    )
                    .await;
                Ok(())
            }
        })
}

/// Handler for bot commands (/start, /howto, /terms, /support)
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("Received command: {:?} from chat {}", cmd, msg.chat.id);

                match cmd {
                    Command::Start => {
                        let greeting = "👋 Привет! Здесь можно купить наборы точек \
                                        для Organic Maps / MAPS.ME.\n\
                                        Выбери город или открой магазин:";
                        if let Err(e) = bot
                            .send_message(msg.chat.id, greeting)
                            .reply_markup(keyboards::main_menu(&deps.catalog))
                            .await
                        {
                            log::error!("Failed to send main menu: {}", e);
                        }
                    }
                    Command::Howto => {
                        let _ = bot.send_message(msg.chat.id, import_instructions()).await;
                    }
                    Command::Terms => {
                        let _ = bot.send_message(msg.chat.id, terms_text()).await;
                    }
                    Command::Support => {
                        let _ = bot
                            .send_message(
                                msg.chat.id,
                                "🛟 Поддержка: опиши проблему одним сообщением, \
                                 мы ответим здесь же.",
                            )
                            .await;
                        notify_operator_text(
                            &bot,
                            &format!("SUPPORT REQUEST from chat {}", msg.chat.id.0),
                        )
                        .await;
                    }
                }
                Ok(())
            }
        },
    ))
}

fn terms_text() -> String {
    [
        "📄 Условия:",
        "• Покупка — разовый платёж, файл остаётся у вас навсегда.",
        "• Файл можно запросить повторно в любой момент — /start → купленный набор.",
        "• Возврат оформляется через поддержку; при полном возврате доступ отключается.",
    ]
    .join("\n")
}

/// Translate a Mini App `sendData` JSON action into the callback data
/// format the inline keyboard uses, so both surfaces share one code path.
fn web_app_action_to_callback(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let action = value.get("action")?.as_str()?;
    match action {
        "howto" => Some("howto".to_string()),
        "mini" => Some(format!("mini:{}", value.get("cityId")?.as_str()?)),
        "buy" => Some(format!("buy:{}", value.get("productId")?.as_str()?)),
        "again" => Some(format!("again:{}", value.get("productId")?.as_str()?)),
        _ => None,
    }
}

/// Handler for messages carrying Mini App sendData payloads
fn web_app_data_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.web_app_data().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let Some(web_app_data) = msg.web_app_data() else {
                    return Ok(());
                };
                let user_id = message_user_id(&msg);
                log::info!("web_app_data from user {}: {}", user_id, web_app_data.data);

                let Some(callback) = web_app_action_to_callback(&web_app_data.data) else {
                    log::warn!("Unrecognized web_app_data payload: {}", web_app_data.data);
                    return Ok(());
                };

                if let Err(e) = handle_callback(&bot, &deps, user_id, &callback).await {
                    log::error!("web_app_data action {} failed: {}", callback, e);
                    let _ = bot
                        .send_message(msg.chat.id, "Что-то пошло не так, попробуйте ещё раз.")
                        .await;
                }
                Ok(())
            }
        })
}

/// Handler for pre-checkout queries (Telegram Stars payments)
///
/// Always answered, immediately and positively: the charge amount was
/// derived from the catalog when the invoice was created, and Telegram
/// cancels the payment if the query times out.
fn pre_checkout_handler() -> UpdateHandler<HandlerError> {
    Update::filter_pre_checkout_query().endpoint(
        |bot: Bot, query: teloxide::types::PreCheckoutQuery| async move {
            log::info!(
                "Received pre_checkout_query: id={}, payload={}",
                query.id,
                query.invoice_payload
            );
            if let Err(e) = bot.answer_pre_checkout_query(query.id, true).await {
                log::error!("Failed to answer pre_checkout_query: {:?}", e);
            }
            Ok(())
        },
    )
}

/// Handler for callback queries (inline keyboard buttons)
fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            let user_id = i64::try_from(q.from.id.0).unwrap_or(0);
            let data = q.data.clone().unwrap_or_default();

            if let Err(e) = handle_callback(&bot, &deps, user_id, &data).await {
                log::error!("Callback {} failed for user {}: {}", data, user_id, e);
                let _ = bot
                    .send_message(ChatId(user_id), "Что-то пошло не так, попробуйте ещё раз.")
                    .await;
            }

            // Stop the button spinner regardless of outcome.
            let _ = bot.answer_callback_query(q.id).await;
            Ok(())
        }
    })
}

async fn handle_callback(
    bot: &Bot,
    deps: &HandlerDeps,
    user_id: i64,
    data: &str,
) -> crate::core::AppResult<()> {
    if data == "howto" {
        bot.send_message(ChatId(user_id), import_instructions()).await?;
        return Ok(());
    }

    if let Some(city_id) = data.strip_prefix("mini:") {
        // Free teaser: delivered without a ledger write.
        match deps.catalog.mini_product(city_id) {
            Some(product) => {
                let product_id = product.id.clone();
                deps.delivery.deliver(user_id, &product_id).await?;
            }
            None => {
                bot.send_message(ChatId(user_id), "Для этого города пока нет бесплатного набора.")
                    .await?;
            }
        }
        return Ok(());
    }

    if let Some(product_id) = data.strip_prefix("buy:") {
        return handle_buy(bot, deps, user_id, product_id).await;
    }

    if let Some(product_id) = data.strip_prefix("again:") {
        if deps.ledger.exists(user_id, product_id).await? {
            deps.delivery.deliver(user_id, product_id).await?;
            if let Err(e) = deps.ledger.mark_delivered(user_id, product_id).await {
                log::warn!("mark_delivered failed on resend: {}", e);
            }
        } else {
            bot.send_message(ChatId(user_id), "Этот набор ещё не куплен.").await?;
        }
        return Ok(());
    }

    log::warn!("Unknown callback data: {}", data);
    Ok(())
}

/// Buy button: resend if already owned, otherwise send a Stars invoice.
async fn handle_buy(
    bot: &Bot,
    deps: &HandlerDeps,
    user_id: i64,
    product_id: &str,
) -> crate::core::AppResult<()> {
    if deps.ledger.exists(user_id, product_id).await? {
        bot.send_message(ChatId(user_id), "Этот набор уже куплен — отправляю ещё раз.")
            .reply_markup(keyboards::resend_button(product_id))
            .await?;
        deps.delivery.deliver(user_id, product_id).await?;
        return Ok(());
    }

    // Fail closed: no invoice for unknown, inactive or unpriced products.
    let price_stars = deps.catalog.charge_stars(product_id)?;
    let title = deps
        .catalog
        .product(product_id)
        .map(|p| p.display_title(&deps.catalog))
        .unwrap_or_else(|| product_id.to_string());

    let payload = InvoicePayload::new(product_id, user_id).encode();
    bot.send_invoice(
        ChatId(user_id),
        title.clone(),
        "Набор точек .kmz для Organic Maps / MAPS.ME".to_string(),
        payload,
        "XTR".to_string(),
        vec![LabeledPrice::new(title, price_stars)],
    )
    .await?;

    Ok(())
}
