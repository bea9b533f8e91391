//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::ingress;

use super::ui_builder::deliver_replies;

/// Handle callback queries from inline keyboards
pub async fn callback_handler(bot: Bot, q: CallbackQuery, engine: Arc<Engine>) -> Result<()> {
    debug!(user_id = %q.from.id, data = ?q.data, "Received callback query");

    // Answer first to remove the loading state, whatever happens next
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!(user_id = %q.from.id, error = %e, "Failed to answer callback query");
    }

    let Some(event) = ingress::from_callback(&q) else {
        return Ok(());
    };

    let chat_id = q
        .message
        .as_ref()
        .map(|m| m.chat().id)
        .unwrap_or_else(|| ChatId::from(q.from.id));

    let replies = engine.handle(event).await;
    if let Err(e) = deliver_replies(&bot, chat_id, &replies).await {
        warn!(user_id = %q.from.id, error = %e, "Reply delivery aborted");
    }

    Ok(())
}
