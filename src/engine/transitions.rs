//! The `(state, trigger)` transition table.
//!
//! Every handler returns an [`Outcome`]: the next state (or `None` to stay),
//! the replies to send, and the outgoing audit record. Repository errors
//! bubble up as [`TransitionError`] and leave the session untouched.

use chrono::{Datelike, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::dialogue::{
    review_comment, validate_phone_number, validate_support_message, ConversationState,
};
use crate::ingress::{EventKind, InboundEvent, SharedContact};
use crate::localization::t_lang;
use crate::models::{
    normalize_order_number, NewReview, NewSupportRequest, OrderDetails, Platform, Rating,
    RequestType, Season, UserProfile,
};
use crate::notifier::{Customer, OrderFoundNotice, ReviewNotice, SupportNotice};

use super::prompts;
use super::reply::{ButtonAction, Keyboard, Reply};
use super::{Engine, TransitionError};

/// Message stored on chat support requests, which carry no user text
pub const CHAT_REQUEST_MESSAGE: &str = "Customer asked to chat with an operator";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `/start` with an optional deep-link payload
    Start(Option<String>),
    Help,
    Menu,
}

impl Command {
    /// Parse `/start`, `/help` or `/menu` (with an optional `@botname` suffix)
    pub fn parse(text: &str) -> Option<Command> {
        let mut parts = text.trim().splitn(2, char::is_whitespace);
        let head = parts.next()?.strip_prefix('/')?;
        let name = head.split('@').next().unwrap_or(head);
        let payload = parts
            .next()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start(payload)),
            "help" => Some(Command::Help),
            "menu" => Some(Command::Menu),
            _ => None,
        }
    }
}

/// An inbound event classified for the transition table
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    Command(Command),
    Button(ButtonAction),
    Text(String),
    Contact(SharedContact),
    Photo(String),
    /// Button data or slash command the bot does not know
    Unknown(String),
}

impl Trigger {
    pub fn classify(kind: &EventKind) -> Trigger {
        match kind {
            EventKind::Text(text) if text.trim_start().starts_with('/') => {
                match Command::parse(text) {
                    Some(command) => Trigger::Command(command),
                    None => Trigger::Unknown(text.clone()),
                }
            }
            EventKind::Text(text) => Trigger::Text(text.clone()),
            EventKind::Button(data) => data
                .parse()
                .map(Trigger::Button)
                .unwrap_or_else(|_| Trigger::Unknown(data.clone())),
            EventKind::SharedContact(contact) => Trigger::Contact(contact.clone()),
            EventKind::Photo(file_ref) => Trigger::Photo(file_ref.clone()),
        }
    }
}

/// Outgoing audit record for a transition
#[derive(Clone, Debug, PartialEq)]
pub struct Audit {
    pub action: &'static str,
    pub order_id: Option<i64>,
    pub metadata: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    /// `None` keeps the current state
    pub next: Option<ConversationState>,
    pub replies: Vec<Reply>,
    pub audit: Option<Audit>,
}

impl Outcome {
    fn stay(replies: Vec<Reply>) -> Self {
        Self {
            next: None,
            replies,
            audit: None,
        }
    }

    fn to(next: ConversationState, replies: Vec<Reply>) -> Self {
        Self {
            next: Some(next),
            replies,
            audit: None,
        }
    }

    fn audited(mut self, action: &'static str, metadata: Value) -> Self {
        let order_id = self
            .next
            .as_ref()
            .and_then(|s| s.order_details())
            .map(|d| d.order.id);
        self.audit = Some(Audit {
            action,
            order_id,
            metadata,
        });
        self
    }

    fn for_order(mut self, order_id: Option<i64>) -> Self {
        if let Some(audit) = self.audit.as_mut() {
            audit.order_id = order_id.or(audit.order_id);
        }
        self
    }
}

type TransitionResult = Result<Outcome, TransitionError>;

impl Engine {
    /// Evaluate one trigger against the user's current state
    pub(super) async fn transition(
        &self,
        event: &InboundEvent,
        state: ConversationState,
        trigger: Trigger,
    ) -> TransitionResult {
        use ConversationState as S;
        use Trigger as T;

        let lang = event.language();

        match (state, trigger) {
            // Global commands and buttons
            (_, T::Command(Command::Start(payload))) => self.start(event, payload, false).await,
            (_, T::Button(ButtonAction::StartAgain)) => self.start(event, None, false).await,
            (_, T::Button(ButtonAction::Restart)) => self.start(event, None, true).await,
            (_, T::Command(Command::Help)) => Ok(Outcome::stay(vec![Reply::text(t_lang(
                "help-text",
                lang,
            ))])),
            (state, T::Command(Command::Menu) | T::Button(ButtonAction::MainMenu)) => {
                let details = state.order_details().cloned();
                Ok(Outcome::to(S::main_menu(details), vec![prompts::main_menu(lang)])
                    .audited("menu_opened", json!({})))
            }
            (S::Start, T::Button(ButtonAction::Retry)) => self.start(event, None, false).await,
            (state, T::Button(ButtonAction::Retry)) => {
                Ok(Outcome::stay(vec![prompts::for_state(&state, lang)]))
            }

            // Platform and order lookup
            (S::PlatformSelection, T::Button(ButtonAction::Platform(platform))) => {
                Ok(Outcome::to(
                    S::OrderInput { platform },
                    vec![prompts::order_input(platform, lang)],
                )
                .audited("platform_selected", json!({ "platform": platform })))
            }
            (S::OrderInput { platform }, T::Text(text)) => {
                self.lookup_order(event, platform, &text).await
            }
            (S::OrderInput { platform }, T::Photo(file_ref)) => Ok(Outcome::stay(vec![
                Reply::text(t_lang("photo-received", lang)),
            ])
            .audited(
                "photo_received",
                json!({ "file_id": file_ref, "platform": platform }),
            )),
            (S::OrderInput { .. }, T::Button(ButtonAction::UploadReceipt)) => {
                Ok(Outcome::stay(vec![prompts::upload_receipt(lang)]))
            }
            (
                S::OrderInput { platform } | S::OrderFound { platform, .. },
                T::Button(ButtonAction::RetryOrder),
            ) => Ok(Outcome::to(
                S::OrderInput { platform },
                vec![prompts::order_input(platform, lang)],
            )
            .audited("order_retry", json!({ "platform": platform }))),

            // Contact capture
            (S::OrderFound { .. }, T::Button(ButtonAction::ShareContact)) => Ok(Outcome::stay(
                vec![prompts::request_contact("share-contact-prompt", lang)],
            )),
            (S::OrderFound { details, .. }, T::Contact(contact)) => {
                self.save_contact(event, details, contact).await
            }
            (S::OrderFound { details, .. }, T::Button(ButtonAction::SkipContact)) => {
                Ok(
                    Outcome::to(S::main_menu(Some(details)), vec![prompts::main_menu(lang)])
                        .audited("contact_skipped", json!({})),
                )
            }

            // Main menu
            (S::MainMenu { details }, T::Button(ButtonAction::MenuInfo)) => {
                Ok(self.product_info(details.as_ref(), lang))
            }
            (S::MainMenu { details }, T::Button(ButtonAction::MenuAlternatives)) => {
                self.alternatives(details.as_ref(), lang).await
            }
            (S::MainMenu { details }, T::Button(ButtonAction::MenuSeasonal)) => {
                self.seasonal(details.as_ref(), lang).await
            }
            (S::MainMenu { details }, T::Button(ButtonAction::MenuReview)) => Ok(Outcome::to(
                S::ReviewRating { details },
                vec![prompts::review_rating(lang)],
            )
            .audited("review_started", json!({}))),
            (S::MainMenu { details }, T::Button(ButtonAction::MenuSupport)) => Ok(Outcome::to(
                S::SupportSelection { details },
                vec![prompts::support_selection(lang)],
            )
            .audited("support_requested", json!({}))),

            // Reviews
            (S::ReviewRating { details }, T::Button(ButtonAction::Rate(rating))) => {
                Ok(Self::rated(details, rating, lang))
            }
            (S::ReviewRating { details }, T::Text(text)) => match text.parse::<Rating>() {
                Ok(rating) => Ok(Self::rated(details, rating, lang)),
                Err(_) => Ok(Outcome::stay(vec![prompts::review_rating(lang)])),
            },
            (S::ReviewText { details, rating }, T::Text(text)) => {
                self.submit_review(event, details, rating, review_comment(&text))
                    .await
            }
            (S::ReviewText { details, rating }, T::Button(ButtonAction::SkipReviewText)) => {
                self.submit_review(event, details, rating, None).await
            }

            // Support
            (S::SupportSelection { details }, T::Button(ButtonAction::SupportCall)) => Ok(
                Outcome::to(S::SupportCall { details }, vec![prompts::support_call(lang)])
                    .audited("support_call_selected", json!({})),
            ),
            (S::SupportSelection { details }, T::Button(ButtonAction::SupportChat)) => {
                self.request_chat(event, details).await
            }
            (S::SupportSelection { details }, T::Button(ButtonAction::SupportEmail)) => Ok(
                Outcome::to(S::SupportEmail { details }, vec![prompts::support_email(lang)])
                    .audited("support_email_selected", json!({})),
            ),
            (S::SupportCall { details }, T::Contact(contact)) => {
                self.request_call(event, details, contact.phone, contact.name)
                    .await
            }
            (S::SupportCall { details }, T::Text(text)) => match validate_phone_number(&text) {
                Ok(phone) => self.request_call(event, details, phone, None).await,
                Err(key) => Ok(Outcome::stay(vec![
                    Reply::text(t_lang(key, lang)),
                    prompts::support_call(lang),
                ])),
            },
            (S::SupportEmail { details }, T::Text(text)) => {
                match validate_support_message(&text) {
                    Ok(message) => self.request_email(event, details, message).await,
                    Err(key) => Ok(Outcome::stay(vec![Reply::text(t_lang(key, lang))])),
                }
            }

            // START waits for /start; everything else is not understood
            (S::Start, trigger) => {
                debug!(user_id = event.user_id, ?trigger, "Ignoring trigger before start");
                Ok(Outcome::stay(vec![prompts::start_button(lang)]))
            }
            (state, trigger) => {
                debug!(
                    user_id = event.user_id,
                    step = %state.step(),
                    ?trigger,
                    "Trigger not understood"
                );
                Ok(Outcome::stay(vec![
                    Reply::text(t_lang("not-understood", lang)),
                    prompts::for_state(&state, lang),
                ]))
            }
        }
    }

    /// START: record the user and ask for the platform
    async fn start(
        &self,
        event: &InboundEvent,
        payload: Option<String>,
        restart: bool,
    ) -> TransitionResult {
        let lang = event.language();
        let profile = UserProfile {
            name: event.display_name.clone(),
            ..Default::default()
        };
        let user = self.repo.get_or_create_user(event.user_id, &profile).await?;
        info!(user_id = event.user_id, db_user_id = user.id, restart, "Conversation started");

        let mut replies = Vec::new();
        if restart {
            replies.push(
                Reply::text(t_lang("restart-notice", lang)).with_keyboard(Keyboard::Remove),
            );
        }
        replies.push(prompts::welcome(lang));

        let (action, metadata) = if restart {
            ("restart", json!({}))
        } else {
            ("bot_started", json!({ "payload": payload }))
        };
        Ok(Outcome::to(ConversationState::PlatformSelection, replies).audited(action, metadata))
    }

    async fn lookup_order(
        &self,
        event: &InboundEvent,
        platform: Platform,
        input: &str,
    ) -> TransitionResult {
        let lang = event.language();
        let order_number = normalize_order_number(input);
        if order_number.is_empty() {
            return Ok(Outcome::stay(vec![Reply::text(t_lang("order-number-empty", lang))]));
        }

        let Some(details) = self.repo.get_order_with_product(&order_number).await? else {
            info!(user_id = event.user_id, %order_number, "Order not found");
            return Ok(Outcome::stay(vec![prompts::order_not_found(&order_number, lang)])
                .audited(
                    "order_not_found",
                    json!({ "order_number": order_number, "platform": platform }),
                ));
        };

        info!(user_id = event.user_id, %order_number, sku = %details.product.sku, "Order found");
        let customer = self.customer(event).await?;
        self.notifications.order_found(OrderFoundNotice {
            customer,
            details: details.clone(),
        });

        let metadata = json!({
            "order_number": details.order.order_number,
            "platform": platform,
            "order_platform": details.order.platform,
            "sku": details.product.sku,
        });
        let reply = prompts::order_found(&details, lang);
        Ok(
            Outcome::to(ConversationState::OrderFound { platform, details }, vec![reply])
                .audited("order_found", metadata),
        )
    }

    async fn save_contact(
        &self,
        event: &InboundEvent,
        details: OrderDetails,
        contact: SharedContact,
    ) -> TransitionResult {
        let lang = event.language();
        let profile = UserProfile {
            name: contact.name.clone().or_else(|| event.display_name.clone()),
            phone: Some(contact.phone.clone()),
            email: None,
        };
        self.repo.get_or_create_user(event.user_id, &profile).await?;

        Ok(Outcome::to(
            ConversationState::main_menu(Some(details)),
            vec![
                Reply::text(t_lang("contact-saved", lang)).with_keyboard(Keyboard::Remove),
                prompts::main_menu(lang),
            ],
        )
        .audited("contact_shared", json!({ "phone": contact.phone })))
    }

    fn product_info(&self, details: Option<&OrderDetails>, lang: Option<&str>) -> Outcome {
        let Some(details) = details else {
            return Outcome::stay(vec![prompts::order_unknown(lang)]);
        };
        let product = &details.product;
        Outcome::stay(vec![prompts::with_menu(prompts::product_info(product, lang), lang)])
            .audited("product_info_viewed", json!({ "sku": product.sku }))
            .for_order(Some(details.order.id))
    }

    async fn alternatives(
        &self,
        details: Option<&OrderDetails>,
        lang: Option<&str>,
    ) -> TransitionResult {
        let Some(details) = details else {
            return Ok(Outcome::stay(vec![prompts::order_unknown(lang)]));
        };
        let product = &details.product;
        let alternatives = self.repo.get_alternatives(&product.sku).await?;
        let text = prompts::alternatives(product, &alternatives, lang);

        Ok(Outcome::stay(vec![prompts::with_menu(text, lang)])
            .audited(
                "alternatives_viewed",
                json!({ "sku": product.sku, "count": alternatives.len() }),
            )
            .for_order(Some(details.order.id)))
    }

    async fn seasonal(
        &self,
        details: Option<&OrderDetails>,
        lang: Option<&str>,
    ) -> TransitionResult {
        let season = Season::for_month(Utc::now().month());
        let products = self.repo.get_seasonal_products(season).await?;
        let text = prompts::seasonal(season, &products, lang);

        Ok(Outcome::stay(vec![prompts::with_menu(text, lang)])
            .audited(
                "seasonal_viewed",
                json!({ "season": season, "count": products.len() }),
            )
            .for_order(details.map(|d| d.order.id)))
    }

    fn rated(details: Option<OrderDetails>, rating: Rating, lang: Option<&str>) -> Outcome {
        Outcome::to(
            ConversationState::ReviewText { details, rating },
            vec![prompts::review_text(rating, lang)],
        )
        .audited("review_rated", json!({ "rating": rating }))
    }

    async fn submit_review(
        &self,
        event: &InboundEvent,
        details: Option<OrderDetails>,
        rating: Rating,
        text: Option<String>,
    ) -> TransitionResult {
        let lang = event.language();
        let user = self
            .repo
            .get_or_create_user(event.user_id, &UserProfile::default())
            .await?;
        let review = self
            .repo
            .save_review(NewReview {
                user_id: Some(user.id),
                order_id: details.as_ref().map(|d| d.order.id),
                rating,
                text,
            })
            .await?;
        info!(user_id = event.user_id, review_id = review.id, rating = rating.value(), "Review saved");

        let notice = ReviewNotice {
            customer: Customer::from(&user),
            review: review.clone(),
            order_number: details.as_ref().map(|d| d.order.order_number.clone()),
        };
        if rating.is_negative() {
            self.notifications.negative_review(notice.clone());
        }
        self.notifications.new_review(notice);

        let metadata = json!({
            "review_id": review.id,
            "rating": rating,
            "has_text": review.text.is_some(),
        });
        Ok(Outcome::to(
            ConversationState::main_menu(details),
            vec![
                prompts::review_thanks(&self.settings.promo_code, lang),
                prompts::main_menu(lang),
            ],
        )
        .audited("review_submitted", metadata))
    }

    async fn request_call(
        &self,
        event: &InboundEvent,
        details: Option<OrderDetails>,
        phone: String,
        contact_name: Option<String>,
    ) -> TransitionResult {
        let lang = event.language();
        let profile = UserProfile {
            name: contact_name.or_else(|| event.display_name.clone()),
            phone: Some(phone.clone()),
            email: None,
        };
        let user = self.repo.get_or_create_user(event.user_id, &profile).await?;
        let request = self
            .repo
            .create_support_request(NewSupportRequest {
                user_id: Some(user.id),
                request_type: RequestType::Call,
                phone: Some(phone.clone()),
                message: None,
            })
            .await?;

        let request_id = request.id;
        self.notifications.support_request(SupportNotice {
            customer: Customer::from(&user),
            request,
        });

        Ok(Outcome::to(
            ConversationState::main_menu(details),
            vec![
                prompts::support_call_confirmed(&phone, lang),
                prompts::main_menu(lang),
            ],
        )
        .audited(
            "support_call_requested",
            json!({ "request_id": request_id, "phone": phone }),
        ))
    }

    async fn request_chat(
        &self,
        event: &InboundEvent,
        details: Option<OrderDetails>,
    ) -> TransitionResult {
        let lang = event.language();
        let request_id = self
            .create_request(event, RequestType::Chat, CHAT_REQUEST_MESSAGE.to_string())
            .await?;
        Ok(Outcome::to(
            ConversationState::main_menu(details),
            vec![prompts::with_menu(t_lang("support-chat-confirmed", lang), lang)],
        )
        .audited("support_chat_requested", json!({ "request_id": request_id })))
    }

    async fn request_email(
        &self,
        event: &InboundEvent,
        details: Option<OrderDetails>,
        message: String,
    ) -> TransitionResult {
        let lang = event.language();
        let request_id = self.create_request(event, RequestType::Email, message).await?;
        Ok(Outcome::to(
            ConversationState::main_menu(details),
            vec![prompts::with_menu(t_lang("support-email-confirmed", lang), lang)],
        )
        .audited("support_email_requested", json!({ "request_id": request_id })))
    }

    /// Persist a chat or email request and alert the operators; returns its id
    async fn create_request(
        &self,
        event: &InboundEvent,
        request_type: RequestType,
        message: String,
    ) -> Result<i64, TransitionError> {
        let user = self
            .repo
            .get_or_create_user(event.user_id, &UserProfile::default())
            .await?;
        let request = self
            .repo
            .create_support_request(NewSupportRequest {
                user_id: Some(user.id),
                request_type,
                phone: user.phone.clone(),
                message: Some(message),
            })
            .await?;
        info!(user_id = event.user_id, request_id = request.id, %request_type, "Support request created");

        let request_id = request.id;
        self.notifications.support_request(SupportNotice {
            customer: Customer::from(&user),
            request,
        });
        Ok(request_id)
    }

    async fn customer(&self, event: &InboundEvent) -> Result<Customer, TransitionError> {
        Ok(self
            .repo
            .get_user(event.user_id)
            .await?
            .map(|user| Customer::from(&user))
            .unwrap_or_else(|| Customer {
                name: event.display_name.clone(),
                ..Customer::anonymous(event.user_id)
            }))
    }
}
