//! # Operator Notifications
//!
//! One-way alerts about order matches, reviews and support requests. The
//! engine never waits on delivery: [`NotificationDispatcher`] spawns each
//! notice as a tracked background task and failures end up in the log.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::NotifierRecoveryConfig;
use crate::localization::{t_args_lang, t_lang};
use crate::models::{ExternalId, OrderDetails, Review, SupportRequest, User};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Telegram API error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("Notification delivery suspended after repeated failures")]
    CircuitOpen,

    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Who the notice is about
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub telegram_id: ExternalId,
    pub name: Option<String>,
    pub phone: Option<String>,
}

impl Customer {
    pub fn anonymous(telegram_id: ExternalId) -> Self {
        Self {
            telegram_id,
            name: None,
            phone: None,
        }
    }
}

impl From<&User> for Customer {
    fn from(user: &User) -> Self {
        Self {
            telegram_id: user.telegram_id,
            name: user.name.clone(),
            phone: user.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderFoundNotice {
    pub customer: Customer,
    pub details: OrderDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewNotice {
    pub customer: Customer,
    pub review: Review,
    pub order_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupportNotice {
    pub customer: Customer,
    pub request: SupportRequest,
}

/// Delivery of operator alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_order_found(&self, notice: &OrderFoundNotice) -> Result<(), NotifyError>;

    async fn notify_new_review(&self, notice: &ReviewNotice) -> Result<(), NotifyError>;

    /// Sent in addition to [`notify_new_review`](Self::notify_new_review) for low ratings
    async fn notify_negative_review(&self, notice: &ReviewNotice) -> Result<(), NotifyError>;

    async fn notify_support_request(&self, notice: &SupportNotice) -> Result<(), NotifyError>;
}

fn or_fallback(value: Option<&str>, fallback_key: &str, lang: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| t_lang(fallback_key, lang))
}

pub fn format_order_found(notice: &OrderFoundNotice, lang: Option<&str>) -> String {
    let customer = &notice.customer;
    let args = vec![
        ("user", or_fallback(customer.name.as_deref(), "admin-unknown", lang)),
        ("telegram_id", customer.telegram_id.to_string()),
        ("phone", or_fallback(customer.phone.as_deref(), "admin-not-provided", lang)),
        ("order_number", notice.details.order.order_number.clone()),
        ("platform", notice.details.order.platform.as_str().to_string()),
        ("product", notice.details.product.title.clone()),
    ];
    format_with("admin-order-found", &args, lang)
}

fn review_args(notice: &ReviewNotice, lang: Option<&str>) -> Vec<(&'static str, String)> {
    let customer = &notice.customer;
    vec![
        ("user", or_fallback(customer.name.as_deref(), "admin-unknown", lang)),
        ("telegram_id", customer.telegram_id.to_string()),
        ("phone", or_fallback(customer.phone.as_deref(), "admin-not-provided", lang)),
        ("order_number", or_fallback(notice.order_number.as_deref(), "admin-unknown", lang)),
        ("rating", notice.review.rating.to_string()),
        ("stars", "⭐".repeat(usize::from(notice.review.rating.value()))),
        ("comment", or_fallback(notice.review.text.as_deref(), "admin-no-comment", lang)),
    ]
}

fn format_with(key: &str, args: &[(&'static str, String)], lang: Option<&str>) -> String {
    let borrowed: Vec<(&str, &str)> = args.iter().map(|(k, v)| (*k, v.as_str())).collect();
    t_args_lang(key, &borrowed, lang)
}

pub fn format_new_review(notice: &ReviewNotice, lang: Option<&str>) -> String {
    format_with("admin-new-review", &review_args(notice, lang), lang)
}

pub fn format_negative_review(notice: &ReviewNotice, lang: Option<&str>) -> String {
    format_with("admin-negative-review", &review_args(notice, lang), lang)
}

pub fn format_support_request(notice: &SupportNotice, lang: Option<&str>) -> String {
    let customer = &notice.customer;
    let request = &notice.request;
    let phone = request.phone.as_deref().or(customer.phone.as_deref());
    let args = vec![
        ("request_type", request.request_type.as_str().to_string()),
        ("user", or_fallback(customer.name.as_deref(), "admin-unknown", lang)),
        ("telegram_id", customer.telegram_id.to_string()),
        ("phone", or_fallback(phone, "admin-not-provided", lang)),
        ("message", or_fallback(request.message.as_deref(), "admin-no-comment", lang)),
    ];
    format_with("admin-support-request", &args, lang)
}

/// Writes notices to the log; used when no admin bot is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_order_found(&self, notice: &OrderFoundNotice) -> Result<(), NotifyError> {
        info!(
            telegram_id = notice.customer.telegram_id,
            order_number = %notice.details.order.order_number,
            "Order found"
        );
        Ok(())
    }

    async fn notify_new_review(&self, notice: &ReviewNotice) -> Result<(), NotifyError> {
        info!(
            telegram_id = notice.customer.telegram_id,
            rating = notice.review.rating.value(),
            "New review"
        );
        Ok(())
    }

    async fn notify_negative_review(&self, notice: &ReviewNotice) -> Result<(), NotifyError> {
        warn!(
            telegram_id = notice.customer.telegram_id,
            rating = notice.review.rating.value(),
            "Negative review"
        );
        Ok(())
    }

    async fn notify_support_request(&self, notice: &SupportNotice) -> Result<(), NotifyError> {
        info!(
            telegram_id = notice.customer.telegram_id,
            request_type = %notice.request.request_type,
            request_id = notice.request.id,
            "Support request"
        );
        Ok(())
    }
}

/// Sends notices to the operators' chat through the administrative bot
pub struct AdminBotNotifier {
    bot: Bot,
    admin_chat: ChatId,
    language: String,
    breaker: CircuitBreaker,
}

impl AdminBotNotifier {
    pub fn new(
        bot: Bot,
        admin_chat: ChatId,
        language: impl Into<String>,
        recovery: NotifierRecoveryConfig,
    ) -> Self {
        Self {
            bot,
            admin_chat,
            language: language.into(),
            breaker: CircuitBreaker::new(recovery),
        }
    }

    fn lang(&self) -> Option<&str> {
        Some(self.language.as_str())
    }

    async fn deliver(&self, text: String) -> Result<(), NotifyError> {
        if self.breaker.is_open() {
            return Err(NotifyError::CircuitOpen);
        }

        match self.bot.send_message(self.admin_chat, text).await {
            Ok(_) => {
                self.breaker.record_success();
                Ok(())
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl Notifier for AdminBotNotifier {
    async fn notify_order_found(&self, notice: &OrderFoundNotice) -> Result<(), NotifyError> {
        self.deliver(format_order_found(notice, self.lang())).await
    }

    async fn notify_new_review(&self, notice: &ReviewNotice) -> Result<(), NotifyError> {
        self.deliver(format_new_review(notice, self.lang())).await
    }

    async fn notify_negative_review(&self, notice: &ReviewNotice) -> Result<(), NotifyError> {
        self.deliver(format_negative_review(notice, self.lang())).await
    }

    async fn notify_support_request(&self, notice: &SupportNotice) -> Result<(), NotifyError> {
        self.deliver(format_support_request(notice, self.lang())).await
    }
}

/// Fire-and-forget front of a [`Notifier`].
///
/// Every notice runs in its own task on a [`TaskTracker`]; callers return
/// immediately and a failed delivery is only logged.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    tracker: TaskTracker,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            tracker: TaskTracker::new(),
        }
    }

    fn spawn<F>(&self, kind: &'static str, delivery: F)
    where
        F: Future<Output = Result<(), NotifyError>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            match delivery.await {
                Ok(()) => debug!(kind, "Notification delivered"),
                Err(e) => warn!(kind, error = %e, "Notification failed"),
            }
        });
    }

    pub fn order_found(&self, notice: OrderFoundNotice) {
        let notifier = Arc::clone(&self.notifier);
        self.spawn("order_found", async move {
            notifier.notify_order_found(&notice).await
        });
    }

    pub fn new_review(&self, notice: ReviewNotice) {
        let notifier = Arc::clone(&self.notifier);
        self.spawn("new_review", async move {
            notifier.notify_new_review(&notice).await
        });
    }

    pub fn negative_review(&self, notice: ReviewNotice) {
        let notifier = Arc::clone(&self.notifier);
        self.spawn("negative_review", async move {
            notifier.notify_negative_review(&notice).await
        });
    }

    pub fn support_request(&self, notice: SupportNotice) {
        let notifier = Arc::clone(&self.notifier);
        self.spawn("support_request", async move {
            notifier.notify_support_request(&notice).await
        });
    }

    /// Number of deliveries still running
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every notice spawned so far has finished
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
