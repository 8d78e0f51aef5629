//! Telegram side of the storefront: bot setup, handler schema, keyboards,
//! notices and Mini App init data verification.

pub mod bot;
pub mod handlers;
pub mod keyboards;
pub mod notifications;
pub mod webapp_auth;

pub use teloxide::Bot;
