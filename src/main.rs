use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use perfume_support_bot::bot;
use perfume_support_bot::config::BotConfig;
use perfume_support_bot::db::{self, PgRepository};
use perfume_support_bot::engine::{Engine, EngineSettings};
use perfume_support_bot::localization::init_localization;
use perfume_support_bot::notifier::{
    AdminBotNotifier, LogNotifier, NotificationDispatcher, Notifier,
};
use perfume_support_bot::repository::Repository;
use perfume_support_bot::session::{spawn_idle_sweeper, InMemorySessionStore};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();
    info!("Starting perfume support bot");

    let config = BotConfig::from_env()?;
    init_localization();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    db::init_database_schema(&pool).await?;
    if config.seed_demo_catalog {
        db::seed_demo_catalog(&pool).await?;
    }

    let repo: Arc<dyn Repository> = Arc::new(PgRepository::new(pool));

    let sessions = Arc::new(InMemorySessionStore::new());
    if let Some(ttl) = config.session_idle_ttl {
        spawn_idle_sweeper(Arc::clone(&sessions), ttl, SWEEP_INTERVAL);
    }

    let notifier: Arc<dyn Notifier> = match &config.admin {
        Some(admin) => {
            info!(admin_chat = %admin.chat_id, "Operator notifications go to the admin bot");
            Arc::new(AdminBotNotifier::new(
                Bot::new(&admin.bot_token),
                admin.chat_id,
                admin.language.clone(),
                config.notifier_recovery,
            ))
        }
        None => {
            warn!("TELEGRAM_ADMIN_BOT_TOKEN / TELEGRAM_ADMIN_ID not set, operator notices are only logged");
            Arc::new(LogNotifier)
        }
    };
    let notifications = NotificationDispatcher::new(notifier);

    let engine = Arc::new(Engine::new(
        repo,
        sessions,
        notifications.clone(),
        EngineSettings {
            promo_code: config.promo_code.clone(),
        },
    ));

    let bot = Bot::new(&config.bot_token);
    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(bot::message_handler))
        .branch(Update::filter_callback_query().endpoint(bot::callback_handler));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!(pending = notifications.pending(), "Dispatcher stopped, flushing notifications");
    notifications.flush().await;

    Ok(())
}
