//! Bot module for handling Telegram interactions
//!
//! - `message_handler`: text, contact, photo and document messages
//! - `callback_handler`: inline keyboard callback queries
//! - `ui_builder`: renders engine replies as keyboards and sends them

pub mod callback_handler;
pub mod message_handler;
pub mod ui_builder;

pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

pub use ui_builder::{create_contact_keyboard, create_inline_keyboard, deliver_replies};
