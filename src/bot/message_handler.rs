//! Message Handler module for incoming text, contact, photo and document messages

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::ingress;

use super::ui_builder::deliver_replies;

pub async fn message_handler(bot: Bot, msg: Message, engine: Arc<Engine>) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        debug!(chat_id = %msg.chat.id, "Ignoring message without sender");
        return Ok(());
    };

    let Some(event) = ingress::from_message(&msg) else {
        let Some(entry) = ingress::unsupported_log_entry(&msg) else {
            return Ok(());
        };
        let reply = engine
            .reject_unsupported(entry, user.language_code.as_deref())
            .await;
        deliver_replies(&bot, msg.chat.id, &[reply]).await?;
        return Ok(());
    };

    debug!(user_id = %user.id, kind = ?event.kind, "Received message");
    let replies = engine.handle(event).await;

    if let Err(e) = deliver_replies(&bot, msg.chat.id, &replies).await {
        warn!(user_id = %user.id, error = %e, "Reply delivery aborted");
    }

    Ok(())
}
