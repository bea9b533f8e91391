//! UI Builder module: renders engine replies as Telegram messages and keyboards

use teloxide::prelude::*;
use teloxide::types::{
    ButtonRequest, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
    KeyboardRemove, ReplyMarkup,
};
use tracing::{debug, error};

use crate::engine::{InlineButton, Keyboard, Reply};

/// Create an inline keyboard; callback data is the button action id
pub fn create_inline_keyboard(rows: &[Vec<InlineButton>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.action.to_string()))
            .collect::<Vec<_>>()
    }))
}

/// One-time reply keyboard asking Telegram to share the user's phone number
pub fn create_contact_keyboard(label: &str) -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(label).request(ButtonRequest::Contact)
    ]])
    .resize_keyboard()
    .one_time_keyboard()
}

pub fn reply_markup(keyboard: &Keyboard) -> Option<ReplyMarkup> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::Inline(rows) => Some(ReplyMarkup::InlineKeyboard(create_inline_keyboard(rows))),
        Keyboard::RequestContact { label } => {
            Some(ReplyMarkup::Keyboard(create_contact_keyboard(label)))
        }
        Keyboard::Remove => Some(ReplyMarkup::KeyboardRemove(KeyboardRemove::new())),
    }
}

/// Send replies in order.
///
/// Stops at the first failed send: the error is logged, not retried, and
/// the remaining replies for this event are dropped.
pub async fn deliver_replies(
    bot: &Bot,
    chat_id: ChatId,
    replies: &[Reply],
) -> Result<(), teloxide::RequestError> {
    for (index, reply) in replies.iter().enumerate() {
        let request = bot.send_message(chat_id, reply.text.clone());
        let result = match reply_markup(&reply.keyboard) {
            Some(markup) => request.reply_markup(markup).await,
            None => request.await,
        };

        if let Err(e) = result {
            error!(
                chat_id = %chat_id,
                error = %e,
                dropped = replies.len() - index - 1,
                "Failed to send reply"
            );
            return Err(e);
        }
    }
    debug!(chat_id = %chat_id, sent = replies.len(), "Replies delivered");
    Ok(())
}
