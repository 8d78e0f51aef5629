//! Валидация Telegram Web App init data.
//!
//! Telegram подписывает данные с помощью HMAC-SHA256.
//! Ключ для HMAC создаётся из bot token: HMAC_SHA256("WebAppData", bot_token).
//!
//! Every rejection is the same opaque `Unauthorized`: the caller never
//! learns whether the hash, the age or the user field failed.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

use crate::core::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of signed init data, seconds.
const MAX_AUTH_AGE_SECONDS: i64 = 86400;

fn parse_params(init_data: &str) -> HashMap<String, String> {
    init_data
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some(key), Some(value)) => {
                    let decoded_value = urlencoding::decode(value).ok()?;
                    Some((key.to_string(), decoded_value.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

/// Verify init data and return the authenticated user id.
///
/// Checks, in order: signature (constant-time), auth_date freshness,
/// presence of a positive user id. The chat the request claims to come
/// from is irrelevant — the signed user object is the identity.
pub fn verify_init_data(init_data: &str, bot_token: &str) -> AppResult<i64> {
    if bot_token.is_empty() {
        return Err(AppError::Unauthorized);
    }

    let params = parse_params(init_data);

    let received_hash = params.get("hash").ok_or(AppError::Unauthorized)?;
    let received_hash = hex::decode(received_hash).map_err(|_| AppError::Unauthorized)?;

    // data_check_string: все параметры кроме hash, отсортированные по ключу
    let mut check_pairs: Vec<String> = params
        .iter()
        .filter(|(key, _)| key.as_str() != "hash")
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    check_pairs.sort();
    let data_check_string = check_pairs.join("\n");

    // secret key: HMAC_SHA256("WebAppData", bot_token)
    let mut secret_key_mac =
        HmacSha256::new_from_slice(b"WebAppData").map_err(|_| AppError::Unauthorized)?;
    secret_key_mac.update(bot_token.as_bytes());
    let secret_key = secret_key_mac.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&secret_key).map_err(|_| AppError::Unauthorized)?;
    mac.update(data_check_string.as_bytes());
    // verify_slice is constant-time
    mac.verify_slice(&received_hash)
        .map_err(|_| AppError::Unauthorized)?;

    // auth_date обязателен и не старше 24 часов
    let auth_date: i64 = params
        .get("auth_date")
        .and_then(|s| s.parse().ok())
        .ok_or(AppError::Unauthorized)?;
    let now = chrono::Utc::now().timestamp();
    if now - auth_date > MAX_AUTH_AGE_SECONDS {
        return Err(AppError::Unauthorized);
    }

    // user id из подписанного JSON объекта user
    let user_json = params.get("user").ok_or(AppError::Unauthorized)?;
    let user: serde_json::Value =
        serde_json::from_str(user_json).map_err(|_| AppError::Unauthorized)?;
    let user_id = user
        .get("id")
        .and_then(|v| v.as_i64())
        .ok_or(AppError::Unauthorized)?;
    if user_id <= 0 {
        return Err(AppError::Unauthorized);
    }

    Ok(user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "123456:test-token";

    /// Sign a parameter set the way Telegram does and append the hash.
    fn signed_init_data(params: &[(&str, &str)], bot_token: &str) -> String {
        let mut check_pairs: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        check_pairs.sort();
        let data_check_string = check_pairs.join("\n");

        let mut secret_key_mac = HmacSha256::new_from_slice(b"WebAppData").unwrap();
        secret_key_mac.update(bot_token.as_bytes());
        let secret_key = secret_key_mac.finalize().into_bytes();

        let mut mac = HmacSha256::new_from_slice(&secret_key).unwrap();
        mac.update(data_check_string.as_bytes());
        let hash = hex::encode(mac.finalize().into_bytes());

        let mut encoded: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        encoded.push(format!("hash={}", hash));
        encoded.join("&")
    }

    fn fresh_auth_date() -> String {
        chrono::Utc::now().timestamp().to_string()
    }

    #[test]
    fn test_valid_init_data() {
        let auth_date = fresh_auth_date();
        let init_data = signed_init_data(
            &[
                ("user", r#"{"id":123456789,"first_name":"Test"}"#),
                ("auth_date", &auth_date),
                ("query_id", "AAHdF6IQAAAAAN0XohDhrOrc"),
            ],
            BOT_TOKEN,
        );
        assert_eq!(verify_init_data(&init_data, BOT_TOKEN).unwrap(), 123456789);
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let auth_date = fresh_auth_date();
        let init_data = signed_init_data(
            &[("user", r#"{"id":1}"#), ("auth_date", &auth_date)],
            BOT_TOKEN,
        );
        // Flip the last hex digit of the hash.
        let mut tampered = init_data.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert!(matches!(
            verify_init_data(&tampered, BOT_TOKEN),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_wrong_bot_token_rejected() {
        let auth_date = fresh_auth_date();
        let init_data = signed_init_data(
            &[("user", r#"{"id":1}"#), ("auth_date", &auth_date)],
            "999999:other-token",
        );
        assert!(verify_init_data(&init_data, BOT_TOKEN).is_err());
    }

    #[test]
    fn test_missing_hash_rejected() {
        let init_data = "user=%7B%22id%22%3A123%7D&auth_date=1234567890";
        assert!(verify_init_data(init_data, BOT_TOKEN).is_err());
    }

    #[test]
    fn test_stale_auth_date_rejected() {
        let stale = (chrono::Utc::now().timestamp() - 2 * 86400).to_string();
        let init_data = signed_init_data(
            &[("user", r#"{"id":1}"#), ("auth_date", &stale)],
            BOT_TOKEN,
        );
        assert!(verify_init_data(&init_data, BOT_TOKEN).is_err());
    }

    #[test]
    fn test_non_positive_user_id_rejected() {
        let auth_date = fresh_auth_date();
        let init_data = signed_init_data(
            &[("user", r#"{"id":0}"#), ("auth_date", &auth_date)],
            BOT_TOKEN,
        );
        assert!(verify_init_data(&init_data, BOT_TOKEN).is_err());
    }

    #[test]
    fn test_missing_user_rejected() {
        let auth_date = fresh_auth_date();
        let init_data = signed_init_data(&[("auth_date", &auth_date)], BOT_TOKEN);
        assert!(verify_init_data(&init_data, BOT_TOKEN).is_err());
    }
}
