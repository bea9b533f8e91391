//! # Conversation Engine
//!
//! Drives one user's conversation forward per inbound event:
//!
//! 1. load the session (defaults to START)
//! 2. log the incoming event
//! 3. evaluate `(state, trigger)` in [`transitions`]
//! 4. store the next state, log the outgoing audit record
//! 5. hand the replies back to the transport
//!
//! The engine knows nothing about Telegram; [`crate::bot`] renders the
//! [`Reply`] values it returns.

pub mod prompts;
pub mod reply;
pub mod transitions;

use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::DEFAULT_PROMO_CODE;
use crate::ingress::InboundEvent;
use crate::localization::t_lang;
use crate::models::NewDialogEntry;
use crate::notifier::NotificationDispatcher;
use crate::repository::{Repository, RepositoryError};
use crate::session::SessionStore;

pub use reply::{ButtonAction, InlineButton, Keyboard, Reply};
pub use transitions::{Command, Outcome, Trigger, CHAT_REQUEST_MESSAGE};

/// Failure inside a transition; the user's state is left unchanged
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Promo code handed out after every review
    pub promo_code: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            promo_code: DEFAULT_PROMO_CODE.to_string(),
        }
    }
}

pub struct Engine {
    repo: Arc<dyn Repository>,
    sessions: Arc<dyn SessionStore>,
    notifications: NotificationDispatcher,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        repo: Arc<dyn Repository>,
        sessions: Arc<dyn SessionStore>,
        notifications: NotificationDispatcher,
        settings: EngineSettings,
    ) -> Self {
        Self {
            repo,
            sessions,
            notifications,
            settings,
        }
    }

    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifications
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Process one inbound event and return the replies to deliver, in order.
    ///
    /// Never fails: a repository error becomes a generic failure reply with a
    /// retry button and the stored state stays as it was.
    pub async fn handle(&self, event: InboundEvent) -> Vec<Reply> {
        let user_id = event.user_id;
        let session = self.sessions.get(user_id).await;
        let step = session.step();
        let current_order = session.state.order_details().map(|d| d.order.id);

        let mut incoming = event.incoming_log_entry().with_order(current_order);
        insert_state(&mut incoming.metadata, step.as_str());
        self.log(incoming).await;

        let trigger = Trigger::classify(&event.kind);
        debug!(user_id, %step, ?trigger, "Handling event");

        match self.transition(&event, session.state, trigger).await {
            Ok(outcome) => {
                let next_step = match &outcome.next {
                    Some(next) => {
                        self.sessions.set(user_id, next.clone()).await;
                        next.step()
                    }
                    None => step,
                };

                if let Some(audit) = outcome.audit {
                    let message = outcome
                        .replies
                        .iter()
                        .map(|r| r.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n\n");
                    let mut entry = NewDialogEntry::outgoing(user_id, audit.action)
                        .with_message(message)
                        .with_order(audit.order_id.or(current_order))
                        .with_metadata(audit.metadata);
                    insert_state(&mut entry.metadata, next_step.as_str());
                    self.log(entry).await;
                }

                outcome.replies
            }
            Err(e) => {
                error!(user_id, %step, error = %e, "Transition failed");
                vec![prompts::failure(event.language())]
            }
        }
    }

    /// Log a message the bot cannot handle and return the reply for it.
    ///
    /// The session is read for log context only and never written.
    pub async fn reject_unsupported(
        &self,
        mut entry: NewDialogEntry,
        language: Option<&str>,
    ) -> Reply {
        if let Some(user_id) = entry.external_id {
            let session = self.sessions.get(user_id).await;
            entry.order_id = session.state.order_details().map(|d| d.order.id);
            insert_state(&mut entry.metadata, session.step().as_str());
        }
        self.log(entry).await;
        Reply::text(t_lang("unsupported-message", language))
    }

    /// Append an audit record; failures are logged and otherwise ignored
    async fn log(&self, entry: NewDialogEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.repo.log_dialog(entry).await {
            warn!(%action, error = %e, "Failed to write dialog log");
        }
    }
}

fn insert_state(metadata: &mut Option<Value>, step: &str) {
    match metadata {
        Some(Value::Object(map)) => {
            map.insert("state".to_string(), json!(step));
        }
        Some(_) => {}
        None => *metadata = Some(json!({ "state": step })),
    }
}
