//! Event ingress: turns Telegram updates into one transport-neutral event.
//!
//! Four inbound shapes are recognised: free text, a button tap (callback
//! data), a shared contact, and a photo (or an image sent as a document).

use serde_json::json;
use teloxide::types::{CallbackQuery, Message, User};
use tracing::debug;

use crate::dialogue::normalize_shared_phone;
use crate::models::{ExternalId, NewDialogEntry};

/// Contact card shared through Telegram's "share contact" button
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedContact {
    pub phone: String,
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Text(String),
    /// Callback data of the tapped inline button
    Button(String),
    SharedContact(SharedContact),
    /// Opaque file reference of the photo
    Photo(String),
}

/// A normalized inbound event from one user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: ExternalId,
    pub display_name: Option<String>,
    pub language_code: Option<String>,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn new(user_id: ExternalId, kind: EventKind) -> Self {
        Self {
            user_id,
            display_name: None,
            language_code: None,
            kind,
        }
    }

    pub fn text(user_id: ExternalId, text: impl Into<String>) -> Self {
        Self::new(user_id, EventKind::Text(text.into()))
    }

    pub fn button(user_id: ExternalId, data: impl Into<String>) -> Self {
        Self::new(user_id, EventKind::Button(data.into()))
    }

    pub fn contact(user_id: ExternalId, phone: impl Into<String>, name: Option<String>) -> Self {
        Self::new(
            user_id,
            EventKind::SharedContact(SharedContact {
                phone: normalize_shared_phone(&phone.into()),
                name,
            }),
        )
    }

    pub fn photo(user_id: ExternalId, file_ref: impl Into<String>) -> Self {
        Self::new(user_id, EventKind::Photo(file_ref.into()))
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into()).filter(|n: &String| !n.trim().is_empty());
        self
    }

    pub fn with_language(mut self, language_code: Option<String>) -> Self {
        self.language_code = language_code;
        self
    }

    pub fn language(&self) -> Option<&str> {
        self.language_code.as_deref()
    }

    /// Audit record written for this event before the engine handles it
    pub fn incoming_log_entry(&self) -> NewDialogEntry {
        match &self.kind {
            EventKind::Text(text) => NewDialogEntry::incoming(self.user_id, "text_message")
                .with_message(text.clone())
                .with_metadata(json!({})),
            EventKind::Button(data) => NewDialogEntry::incoming(self.user_id, "button_pressed")
                .with_metadata(json!({ "button": data })),
            EventKind::SharedContact(contact) => {
                NewDialogEntry::incoming(self.user_id, "contact_message")
                    .with_metadata(json!({ "phone": contact.phone, "name": contact.name }))
            }
            EventKind::Photo(file_ref) => NewDialogEntry::incoming(self.user_id, "photo_message")
                .with_metadata(json!({ "file_id": file_ref })),
        }
    }
}

fn external_id(user: &User) -> Option<ExternalId> {
    ExternalId::try_from(user.id.0).ok()
}

fn from_user(user: &User, kind: EventKind) -> Option<InboundEvent> {
    let user_id = external_id(user)?;
    Some(
        InboundEvent::new(user_id, kind)
            .with_display_name(user.first_name.clone())
            .with_language(user.language_code.clone()),
    )
}

/// Normalize a chat message; `None` for shapes the bot does not handle
pub fn from_message(msg: &Message) -> Option<InboundEvent> {
    let user = msg.from.as_ref()?;

    let kind = if let Some(text) = msg.text() {
        EventKind::Text(text.to_string())
    } else if let Some(contact) = msg.contact() {
        let name = Some(contact.first_name.clone()).filter(|n| !n.trim().is_empty());
        EventKind::SharedContact(SharedContact {
            phone: normalize_shared_phone(&contact.phone_number),
            name,
        })
    } else if let Some(largest_photo) = msg.photo().and_then(|photos| photos.last()) {
        EventKind::Photo(largest_photo.file.id.0.clone())
    } else if let Some(doc) = msg.document() {
        let is_image = doc
            .mime_type
            .as_ref()
            .is_some_and(|mime| mime.to_string().starts_with("image/"));
        if !is_image {
            debug!(user_id = %user.id, "Ignoring non-image document");
            return None;
        }
        EventKind::Photo(doc.file.id.0.clone())
    } else {
        debug!(user_id = %user.id, "Ignoring unsupported message kind");
        return None;
    };

    let mut event = from_user(user, kind)?;
    if let EventKind::SharedContact(contact) = &event.kind {
        if let Some(name) = contact.name.clone() {
            event = event.with_display_name(name);
        }
    }
    Some(event)
}

/// Incoming log entry for a message shape the bot does not handle
pub fn unsupported_log_entry(msg: &Message) -> Option<NewDialogEntry> {
    let user_id = external_id(msg.from.as_ref()?)?;
    Some(
        NewDialogEntry::incoming(user_id, "unsupported_message")
            .with_metadata(json!({ "kind": unsupported_kind(msg) })),
    )
}

fn unsupported_kind(msg: &Message) -> &'static str {
    if msg.sticker().is_some() {
        "sticker"
    } else if msg.voice().is_some() {
        "voice"
    } else if msg.audio().is_some() {
        "audio"
    } else if msg.video().is_some() || msg.video_note().is_some() {
        "video"
    } else if msg.animation().is_some() {
        "animation"
    } else if msg.document().is_some() {
        "document"
    } else if msg.location().is_some() {
        "location"
    } else {
        "other"
    }
}

/// Normalize an inline button tap; `None` when the query carries no data
pub fn from_callback(q: &CallbackQuery) -> Option<InboundEvent> {
    let data = q.data.as_deref()?;
    from_user(&q.from, EventKind::Button(data.to_string()))
}
