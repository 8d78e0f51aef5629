//! Inline keyboards for the storefront.
//!
//! Callback data formats:
//! - `mini:<city_id>`     бесплатный мини-набор города
//! - `buy:<product_id>`   оплата звёздами (инвойс в чате)
//! - `again:<product_id>` повторная отправка купленного файла
//! - `howto`              инструкция по импорту

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, WebAppInfo};

use crate::catalog::Catalog;
use crate::core::config;

/// Главное меню: мини-наборы, платные наборы, Mini App и инструкция.
pub fn main_menu(catalog: &Catalog) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();

    let mut products: Vec<_> = catalog.active_products().collect();
    products.sort_by(|a, b| a.id.cmp(&b.id));

    for product in &products {
        if product.kind == "mini" {
            let city_name = catalog
                .city(&product.city_id)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| product.city_id.clone());
            rows.push(vec![InlineKeyboardButton::callback(
                format!("🎁 {} — бесплатные точки", city_name),
                format!("mini:{}", product.city_id),
            )]);
        }
    }

    for product in &products {
        if product.kind == "full" && product.price_stars > 0 {
            rows.push(vec![InlineKeyboardButton::callback(
                format!("🛒 {} — {} ⭐", product.display_title(catalog), product.price_stars),
                format!("buy:{}", product.id),
            )]);
        }
    }

    if let Some(url) = config::WEBAPP_URL.as_deref() {
        if let Ok(parsed) = url::Url::parse(url) {
            rows.push(vec![InlineKeyboardButton::web_app(
                "🗺 Открыть магазин".to_string(),
                WebAppInfo { url: parsed },
            )]);
        }
    }

    rows.push(vec![InlineKeyboardButton::callback(
        "📖 Как импортировать точки".to_string(),
        "howto".to_string(),
    )]);

    InlineKeyboardMarkup::new(rows)
}

/// Кнопка повторной отправки под сообщением о уже купленном наборе.
pub fn resend_button(product_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "📥 Прислать файл ещё раз".to_string(),
        format!("again:{}", product_id),
    )]])
}
