use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;

use putevod::api::{run_api_server, ApiState};
use putevod::catalog::Catalog;
use putevod::cli::{Cli, Commands};
use putevod::core::{config, init_logger};
use putevod::delivery::{Delivery, Notices, TelegramDelivery};
use putevod::entitlements::EntitlementService;
use putevod::ledger::{FileLedger, PurchaseLedger, SqliteLedger};
use putevod::payments::yookassa::YookassaClient;
use putevod::telegram::bot::{create_bot, setup_bot_commands};
use putevod::telegram::handlers::{schema, HandlerDeps};
use putevod::telegram::notifications::TelegramNotices;

/// Main entry point for the Telegram bot and the Mini App API server.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Set up global panic handler to catch panics in dispatcher
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    // Load environment variables from .env if present
    let _ = dotenv();

    match cli.command {
        Some(Commands::Run) | None => run_bot().await,
        Some(Commands::CheckCatalog { path }) => {
            let path = path.unwrap_or_else(|| config::CATALOG_PATH.clone());
            check_catalog(&path)
        }
    }
}

/// Validate the catalog file and print a product summary.
fn check_catalog(path: &str) -> Result<()> {
    let catalog = Catalog::load(path)?;
    println!("Catalog OK: {}", path);
    let mut products: Vec<_> = catalog.active_products().collect();
    products.sort_by(|a, b| a.id.cmp(&b.id));
    for product in products {
        println!(
            "  {} [{}] stars={} rub={} usdt={} file={}",
            product.id,
            product.kind,
            product.price_stars,
            product.price_rub,
            product.price_usdt,
            product.file_path(),
        );
        if !std::path::Path::new(&product.file_path()).exists() {
            println!("    ⚠️ deliverable missing: {}", product.file_path());
        }
    }
    Ok(())
}

fn create_ledger() -> Result<Arc<dyn PurchaseLedger>> {
    match config::LEDGER_BACKEND.as_str() {
        "file" => {
            log::info!("Using file ledger at {}", &*config::LEDGER_FILE);
            Ok(Arc::new(FileLedger::new(config::LEDGER_FILE.clone())))
        }
        "sqlite" => {
            log::info!("Using SQLite ledger at {}", &*config::DATABASE_PATH);
            let ledger = SqliteLedger::open(&config::DATABASE_PATH)
                .map_err(|e| anyhow::anyhow!("Failed to open SQLite ledger: {}", e))?;
            Ok(Arc::new(ledger))
        }
        other => Err(anyhow::anyhow!("Unknown LEDGER_BACKEND: {}", other)),
    }
}

/// Run the Telegram bot and the API server.
async fn run_bot() -> Result<()> {
    log::info!("Starting putevod...");

    if config::BOT_TOKEN.is_empty() {
        return Err(anyhow::anyhow!("BOT_TOKEN environment variable not set"));
    }

    let bot = create_bot()?;
    setup_bot_commands(&bot).await?;

    let catalog = Arc::new(
        Catalog::load(&config::CATALOG_PATH)
            .map_err(|e| anyhow::anyhow!("Failed to load catalog: {}", e))?,
    );
    log::info!(
        "Catalog loaded: {} active product(s)",
        catalog.active_products().count()
    );

    let ledger = create_ledger()?;
    let delivery: Arc<dyn Delivery> = Arc::new(TelegramDelivery::new(bot.clone(), Arc::clone(&catalog)));
    let notices: Arc<dyn Notices> = Arc::new(TelegramNotices::new(bot.clone()));

    let yookassa = YookassaClient::from_env();
    if yookassa.is_some() {
        log::info!("Card payments enabled (YooKassa)");
    } else {
        log::info!("Card payments disabled (YOOKASSA_SHOP_ID / YOOKASSA_SECRET_KEY unset)");
    }

    // Mini App API server
    let api_state = ApiState {
        ledger: Arc::clone(&ledger),
        catalog: Arc::clone(&catalog),
        entitlements: EntitlementService::new(Arc::clone(&ledger)),
        delivery: Arc::clone(&delivery),
        notices: Arc::clone(&notices),
        yookassa,
        bot_token: config::BOT_TOKEN.clone(),
    };
    tokio::spawn(async move {
        if let Err(e) = run_api_server(api_state).await {
            log::error!("API server error: {}", e);
        }
    });

    let handler_deps = HandlerDeps {
        ledger,
        catalog,
        delivery,
        notices,
    };
    let handler = schema(handler_deps);

    log::info!("Starting bot in long polling mode");
    Dispatcher::builder(bot, handler)
        .dependencies(DependencyMap::new())
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
