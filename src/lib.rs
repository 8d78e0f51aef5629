//! Путевод — Telegram-бот и Mini App магазин наборов точек (.kmz)
//! для Organic Maps / MAPS.ME.
//!
//! The ledger of paid entitlements is the source of truth; three payment
//! rails (Telegram Stars, card via YooKassa, manual USDT) reconcile into
//! it, and delivery is a re-runnable consequence of an entitlement.

pub mod api;
pub mod catalog;
pub mod cli;
pub mod core;
pub mod delivery;
pub mod entitlements;
pub mod ledger;
pub mod payments;
pub mod telegram;

pub use crate::core::{AppError, AppResult};
