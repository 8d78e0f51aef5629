use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Configuration constants for the bot
/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Ledger backend selection: "sqlite" (default) or "file"
pub static LEDGER_BACKEND: Lazy<String> =
    Lazy::new(|| env::var("LEDGER_BACKEND").unwrap_or_else(|_| "sqlite".to_string()));

/// SQLite database file path for the relational ledger backend
/// Read from DATABASE_PATH environment variable
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "putevod.sqlite".to_string()));

/// JSON document path for the file ledger backend
/// Read from LEDGER_FILE environment variable
pub static LEDGER_FILE: Lazy<String> =
    Lazy::new(|| env::var("LEDGER_FILE").unwrap_or_else(|_| "data/db.json".to_string()));

/// Catalog document path ({cities, products})
pub static CATALOG_PATH: Lazy<String> =
    Lazy::new(|| env::var("CATALOG_PATH").unwrap_or_else(|_| "assets/products.json".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "putevod.log".to_string()));

/// Mini App URL shown in the main menu keyboard
pub static WEBAPP_URL: Lazy<Option<String>> = Lazy::new(|| env::var("WEBAPP_URL").ok());

/// API server configuration
pub mod api {
    use super::*;

    /// Port for the Mini App API server
    /// Read from API_PORT environment variable, default 8080
    pub static API_PORT: Lazy<u16> = Lazy::new(|| {
        env::var("API_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080)
    });
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Timeout for outbound HTTP requests (Telegram API, payment processor)
    pub const TIMEOUT_SECONDS: u64 = 30;

    pub fn timeout() -> Duration {
        Duration::from_secs(TIMEOUT_SECONDS)
    }
}

/// Operator (admin) configuration
pub mod admin {
    use once_cell::sync::Lazy;
    use std::env;

    fn parse_admin_ids(raw: &str) -> Vec<i64> {
        raw.split([',', ' ', '\n', '\t'])
            .filter_map(|part| part.trim().parse::<i64>().ok())
            .collect()
    }

    /// Operator user IDs (comma-separated)
    /// Read from ADMIN_IDS environment variable
    pub static ADMIN_IDS: Lazy<Vec<i64>> = Lazy::new(|| {
        env::var("ADMIN_IDS")
            .ok()
            .map(|raw| parse_admin_ids(&raw))
            .unwrap_or_default()
    });

    /// Operator user ID for direct notifications (USDT requests, errors)
    /// Read from ADMIN_USER_ID or fallback to first ADMIN_IDS entry
    pub static ADMIN_USER_ID: Lazy<i64> = Lazy::new(|| {
        env::var("ADMIN_USER_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .or_else(|| ADMIN_IDS.first().copied())
            .unwrap_or(0)
    });

    /// Check if a user may run operator commands (/approve, /reject).
    /// No configured operators means no one is an operator.
    pub fn is_operator(user_id: i64) -> bool {
        if !ADMIN_IDS.is_empty() {
            return ADMIN_IDS.contains(&user_id);
        }
        if *ADMIN_USER_ID != 0 {
            return *ADMIN_USER_ID == user_id;
        }
        false
    }

    #[cfg(test)]
    mod tests {
        use super::parse_admin_ids;

        #[test]
        fn test_parse_admin_ids() {
            assert_eq!(parse_admin_ids("1, 2,3"), vec![1, 2, 3]);
            assert_eq!(parse_admin_ids(""), Vec::<i64>::new());
            assert_eq!(parse_admin_ids("42 junk 7"), vec![42, 7]);
        }
    }
}

/// Payment rail configuration
pub mod payments {
    use once_cell::sync::Lazy;
    use std::env;

    /// YooKassa shop ID (card rail). Empty string disables the rail.
    pub static YOOKASSA_SHOP_ID: Lazy<String> =
        Lazy::new(|| env::var("YOOKASSA_SHOP_ID").unwrap_or_else(|_| String::new()));

    /// YooKassa secret API key
    pub static YOOKASSA_SECRET_KEY: Lazy<String> =
        Lazy::new(|| env::var("YOOKASSA_SECRET_KEY").unwrap_or_else(|_| String::new()));

    /// URL the hosted checkout redirects back to after payment
    pub static YOOKASSA_RETURN_URL: Lazy<String> = Lazy::new(|| {
        env::var("YOOKASSA_RETURN_URL").unwrap_or_else(|_| "https://t.me".to_string())
    });

    /// Secret path segment for the webhook endpoint. The webhook is not
    /// initData-authenticated; this token is the transport-level gate.
    pub static YOOKASSA_WEBHOOK_TOKEN: Lazy<String> =
        Lazy::new(|| env::var("YOOKASSA_WEBHOOK_TOKEN").unwrap_or_else(|_| String::new()));

    /// API base, overridable for staging
    pub static YOOKASSA_API_BASE: Lazy<String> = Lazy::new(|| {
        env::var("YOOKASSA_API_BASE").unwrap_or_else(|_| "https://api.yookassa.ru".to_string())
    });

    /// USDT TRC20 receiving address shown to the user (manual rail)
    pub static USDT_ADDRESS: Lazy<String> =
        Lazy::new(|| env::var("USDT_TRC20_ADDRESS").unwrap_or_else(|_| String::new()));

    /// USDT network label, display only
    pub static USDT_NETWORK: Lazy<String> =
        Lazy::new(|| env::var("USDT_NETWORK").unwrap_or_else(|_| "TRC20".to_string()));
}
