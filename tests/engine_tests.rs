//! # Conversation Engine Tests
//!
//! Drives the engine end to end against the in-memory repository and session
//! store, with recording and failing fakes for the notifier and repository.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use perfume_support_bot::dialogue::{ConversationState, Step};
use perfume_support_bot::engine::{
    ButtonAction, Engine, EngineSettings, Keyboard, Reply, CHAT_REQUEST_MESSAGE,
};
use perfume_support_bot::ingress::InboundEvent;
use perfume_support_bot::models::{
    Direction, ExternalId, NewDialogEntry, NewReview, NewSupportRequest, Order, OrderDetails,
    Platform, Product, Rating, RequestType, Review, Season, SupportRequest, SupportStatus, User,
    UserProfile,
};
use perfume_support_bot::notifier::{
    NotificationDispatcher, Notifier, NotifyError, OrderFoundNotice, ReviewNotice, SupportNotice,
};
use perfume_support_bot::repository::{
    InMemoryRepository, Repository, RepositoryError, RepositoryResult,
};
use perfume_support_bot::session::{InMemorySessionStore, Session, SessionStore};
use tokio::sync::Barrier;

/// Records every notice it receives as `kind:detail`
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn record(&self, entry: String) {
        self.sent.lock().unwrap().push(entry);
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn count(&self, kind: &str) -> usize {
        self.sent()
            .iter()
            .filter(|e| e.split(':').next() == Some(kind))
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_order_found(&self, notice: &OrderFoundNotice) -> Result<(), NotifyError> {
        self.record(format!("order_found:{}", notice.details.order.order_number));
        Ok(())
    }

    async fn notify_new_review(&self, notice: &ReviewNotice) -> Result<(), NotifyError> {
        self.record(format!("new_review:{}", notice.review.rating));
        Ok(())
    }

    async fn notify_negative_review(&self, notice: &ReviewNotice) -> Result<(), NotifyError> {
        self.record(format!("negative_review:{}", notice.review.rating));
        Ok(())
    }

    async fn notify_support_request(&self, notice: &SupportNotice) -> Result<(), NotifyError> {
        self.record(format!("support_request:{}", notice.request.request_type));
        Ok(())
    }
}

/// Notifier whose every delivery fails
struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn notify_order_found(&self, _: &OrderFoundNotice) -> Result<(), NotifyError> {
        Err(NotifyError::CircuitOpen)
    }

    async fn notify_new_review(&self, _: &ReviewNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("admin chat unreachable".to_string()))
    }

    async fn notify_negative_review(&self, _: &ReviewNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery("admin chat unreachable".to_string()))
    }

    async fn notify_support_request(&self, _: &SupportNotice) -> Result<(), NotifyError> {
        Err(NotifyError::CircuitOpen)
    }
}

/// In-memory repository that can be told to fail lookups or audit writes
#[derive(Default)]
struct FlakyRepository {
    inner: Arc<InMemoryRepository>,
    fail_lookups: AtomicBool,
    fail_logs: AtomicBool,
}

impl FlakyRepository {
    fn check(&self, flag: &AtomicBool) -> RepositoryResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn get_or_create_user(
        &self,
        external_id: ExternalId,
        profile: &UserProfile,
    ) -> RepositoryResult<User> {
        self.inner.get_or_create_user(external_id, profile).await
    }

    async fn get_user(&self, external_id: ExternalId) -> RepositoryResult<Option<User>> {
        self.inner.get_user(external_id).await
    }

    async fn find_order(&self, order_number: &str) -> RepositoryResult<Option<Order>> {
        self.check(&self.fail_lookups)?;
        self.inner.find_order(order_number).await
    }

    async fn get_order_with_product(
        &self,
        order_number: &str,
    ) -> RepositoryResult<Option<OrderDetails>> {
        self.check(&self.fail_lookups)?;
        self.inner.get_order_with_product(order_number).await
    }

    async fn get_product(&self, sku: &str) -> RepositoryResult<Option<Product>> {
        self.inner.get_product(sku).await
    }

    async fn get_alternatives(&self, sku: &str) -> RepositoryResult<Vec<Product>> {
        self.inner.get_alternatives(sku).await
    }

    async fn get_seasonal_products(&self, season: Season) -> RepositoryResult<Vec<Product>> {
        self.inner.get_seasonal_products(season).await
    }

    async fn save_review(&self, review: NewReview) -> RepositoryResult<Review> {
        self.inner.save_review(review).await
    }

    async fn create_support_request(
        &self,
        request: NewSupportRequest,
    ) -> RepositoryResult<SupportRequest> {
        self.inner.create_support_request(request).await
    }

    async fn log_dialog(&self, entry: NewDialogEntry) -> RepositoryResult<()> {
        self.check(&self.fail_logs)?;
        self.inner.log_dialog(entry).await
    }
}

fn product(sku: &str, title: &str, season: Season, alternatives: &[&str]) -> Product {
    Product {
        sku: sku.to_string(),
        title: title.to_string(),
        volume: Some("50ml".to_string()),
        concentration: Some("EDP".to_string()),
        description: Some("Woody floral scent.".to_string()),
        instructions: None,
        price: Some(150_000),
        season_tag: season,
        alternatives: alternatives.iter().map(|s| s.to_string()).collect(),
    }
}

fn order(number: &str, platform: Platform, sku: &str) -> Order {
    Order {
        id: 0,
        order_number: number.to_string(),
        platform,
        user_id: None,
        product_sku: sku.to_string(),
        status: "delivered".to_string(),
        raw_payload: Some(json!({ "source": "test" })),
        created_at: Utc::now(),
    }
}

fn seeded_repository() -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    repo.insert_product(product(
        "DATUM-EDP-50",
        "Bilmim EDP",
        Season::AllYear,
        &["DATUM-EDT-30", "DATUM-INTENSE-50"],
    ));
    repo.insert_product(product("DATUM-EDT-30", "Azim EDT", Season::Summer, &["DATUM-EDP-50"]));
    repo.insert_product(product(
        "DATUM-INTENSE-50",
        "Ravshan Intense",
        Season::AutumnWinter,
        &[],
    ));
    repo.insert_order(order("ORD12345", Platform::Wolt, "DATUM-EDP-50"));
    repo.insert_order(order("ORD67890", Platform::Uzum, "DATUM-EDT-30"));
    repo.insert_order(order("#1234567", Platform::Yandex, "DATUM-INTENSE-50"));
    repo
}

/// Session store whose next `racers` reads wait for each other, so
/// concurrent events for one user all see the same starting state
struct RacingSessionStore {
    inner: InMemorySessionStore,
    racers: AtomicUsize,
    barrier: Barrier,
}

impl RacingSessionStore {
    fn new(racers: usize) -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            racers: AtomicUsize::new(0),
            barrier: Barrier::new(racers),
        }
    }

    fn arm(&self, racers: usize) {
        self.racers.store(racers, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionStore for RacingSessionStore {
    async fn get(&self, user_id: ExternalId) -> Session {
        let session = self.inner.get(user_id).await;
        let racing = self
            .racers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if racing {
            self.barrier.wait().await;
        }
        session
    }

    async fn set(&self, user_id: ExternalId, state: ConversationState) {
        self.inner.set(user_id, state).await;
    }

    async fn clear(&self, user_id: ExternalId) {
        self.inner.clear(user_id).await;
    }
}

struct Harness {
    engine: Engine,
    repo: Arc<InMemoryRepository>,
    sessions: Arc<dyn SessionStore>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new() -> Self {
        Self::with_sessions(Arc::new(InMemorySessionStore::new()))
    }

    fn with_sessions(sessions: Arc<dyn SessionStore>) -> Self {
        let repo = Arc::new(seeded_repository());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = Engine::new(
            repo.clone(),
            sessions.clone(),
            NotificationDispatcher::new(notifier.clone()),
            EngineSettings::default(),
        );
        Self {
            engine,
            repo,
            sessions,
            notifier,
        }
    }

    async fn send(&self, event: InboundEvent) -> Vec<Reply> {
        self.engine.handle(event).await
    }

    async fn text(&self, user: ExternalId, text: &str) -> Vec<Reply> {
        self.send(InboundEvent::text(user, text)).await
    }

    async fn press(&self, user: ExternalId, action: ButtonAction) -> Vec<Reply> {
        self.send(InboundEvent::button(user, action.to_string())).await
    }

    async fn state(&self, user: ExternalId) -> ConversationState {
        self.sessions.get(user).await.state
    }

    /// Walk a user from /start to MAIN_MENU with order ORD67890
    async fn reach_main_menu(&self, user: ExternalId) {
        self.text(user, "/start").await;
        self.press(user, ButtonAction::Platform(Platform::Uzum)).await;
        self.text(user, "ord67890").await;
        self.press(user, ButtonAction::SkipContact).await;
        assert_eq!(self.state(user).await.step(), Step::MainMenu);
    }

    async fn flush(&self) {
        self.engine.notifications().flush().await;
    }
}

fn rating(value: u8) -> ButtonAction {
    ButtonAction::Rate(Rating::new(value).unwrap())
}

fn all_text(replies: &[Reply]) -> String {
    replies
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn offers(replies: &[Reply], action: ButtonAction) -> bool {
    replies.iter().any(|r| r.actions().contains(&action))
}

#[tokio::test]
async fn test_start_records_user_and_asks_for_platform() {
    let h = Harness::new();
    let replies = h
        .send(InboundEvent::text(1, "/start promo_ig").with_display_name("Dilnoza"))
        .await;

    assert_eq!(h.state(1).await, ConversationState::PlatformSelection);
    assert!(offers(&replies, ButtonAction::Platform(Platform::Wolt)));

    let users = h.repo.users();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name.as_deref(), Some("Dilnoza"));

    let started = h
        .repo
        .dialogs()
        .into_iter()
        .find(|d| d.action == "bot_started")
        .unwrap();
    assert_eq!(started.direction, Direction::Outgoing);
    assert_eq!(started.metadata.unwrap()["payload"], "promo_ig");
}

#[tokio::test]
async fn test_lowercase_order_number_is_found() {
    let h = Harness::new();
    h.text(1, "/start").await;
    h.press(1, ButtonAction::Platform(Platform::Uzum)).await;
    let replies = h.text(1, "  ord67890 ").await;

    match h.state(1).await {
        ConversationState::OrderFound { platform, details } => {
            assert_eq!(platform, Platform::Uzum);
            assert_eq!(details.order.order_number, "ORD67890");
            assert_eq!(details.product.sku, "DATUM-EDT-30");
        }
        other => panic!("expected ORDER_FOUND, got {other:?}"),
    }
    assert!(all_text(&replies).contains("ORD67890"));
    assert!(offers(&replies, ButtonAction::ShareContact));

    h.flush().await;
    assert_eq!(h.notifier.sent(), vec!["order_found:ORD67890".to_string()]);
}

#[tokio::test]
async fn test_hash_order_number_is_found() {
    let h = Harness::new();
    h.text(1, "/start").await;
    h.press(1, ButtonAction::Platform(Platform::Yandex)).await;
    h.text(1, "#1234567").await;

    let state = h.state(1).await;
    assert_eq!(state.step(), Step::OrderFound);
    assert_eq!(state.order_details().unwrap().order.order_number, "#1234567");
}

#[tokio::test]
async fn test_unknown_order_stays_in_order_input() {
    let h = Harness::new();
    h.text(1, "/start").await;
    h.press(1, ButtonAction::Platform(Platform::Wolt)).await;
    let replies = h.text(1, "nonexistent").await;

    assert_eq!(
        h.state(1).await,
        ConversationState::OrderInput {
            platform: Platform::Wolt
        }
    );
    assert!(all_text(&replies).contains("NONEXISTENT"));
    assert!(h.repo.dialogs().iter().any(|d| d.action == "order_not_found"));

    h.flush().await;
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_order_with_missing_product_is_not_found() {
    let h = Harness::new();
    h.repo.remove_product("DATUM-EDT-30");
    h.text(1, "/start").await;
    h.press(1, ButtonAction::Platform(Platform::Uzum)).await;
    h.text(1, "ORD67890").await;

    assert_eq!(h.state(1).await.step(), Step::OrderInput);
    h.flush().await;
    assert_eq!(h.notifier.count("order_found"), 0);
}

#[tokio::test]
async fn test_empty_order_number_reprompts() {
    let h = Harness::new();
    h.text(1, "/start").await;
    h.press(1, ButtonAction::Platform(Platform::Olx)).await;
    let replies = h.text(1, "   ").await;

    assert_eq!(h.state(1).await.step(), Step::OrderInput);
    assert!(all_text(&replies).contains("cannot be empty"));
}

#[tokio::test]
async fn test_receipt_photo_is_logged_and_state_kept() {
    let h = Harness::new();
    h.text(1, "/start").await;
    h.press(1, ButtonAction::Platform(Platform::Other)).await;
    h.press(1, ButtonAction::UploadReceipt).await;
    let replies = h.send(InboundEvent::photo(1, "photo-file-1")).await;

    assert_eq!(h.state(1).await.step(), Step::OrderInput);
    assert!(all_text(&replies).contains("receipt photo"));

    let dialogs = h.repo.dialogs();
    let incoming = dialogs
        .iter()
        .find(|d| d.action == "photo_message")
        .unwrap();
    assert_eq!(incoming.metadata.as_ref().unwrap()["file_id"], "photo-file-1");
    assert!(dialogs.iter().any(|d| d.action == "photo_received"));
}

#[tokio::test]
async fn test_shared_contact_is_saved_and_menu_shown() {
    let h = Harness::new();
    h.text(1, "/start").await;
    h.press(1, ButtonAction::Platform(Platform::Uzum)).await;
    h.text(1, "ORD67890").await;
    h.press(1, ButtonAction::ShareContact).await;
    let replies = h
        .send(InboundEvent::contact(1, "998901234567", Some("Aziz".to_string())))
        .await;

    let state = h.state(1).await;
    assert_eq!(state.step(), Step::MainMenu);
    assert_eq!(
        state.order_details().unwrap().order.order_number,
        "ORD67890"
    );
    assert_eq!(replies[0].keyboard, Keyboard::Remove);
    assert!(offers(&replies, ButtonAction::MenuReview));

    let user = &h.repo.users()[0];
    assert_eq!(user.phone.as_deref(), Some("+998901234567"));
    assert_eq!(user.name.as_deref(), Some("Aziz"));
}

#[tokio::test]
async fn test_rating_one_sends_two_notifications() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    h.press(1, ButtonAction::MenuReview).await;
    h.press(1, rating(1)).await;
    h.text(1, "The scent faded in an hour").await;
    h.flush().await;

    assert_eq!(h.notifier.count("new_review"), 1);
    assert_eq!(h.notifier.count("negative_review"), 1);

    let reviews = h.repo.reviews();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].text.as_deref(), Some("The scent faded in an hour"));
}

#[tokio::test]
async fn test_rating_five_sends_one_notification() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    h.press(1, ButtonAction::MenuReview).await;
    h.press(1, rating(5)).await;
    h.press(1, ButtonAction::SkipReviewText).await;
    h.flush().await;

    assert_eq!(h.notifier.count("new_review"), 1);
    assert_eq!(h.notifier.count("negative_review"), 0);
}

#[tokio::test]
async fn test_review_three_with_skip() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    h.press(1, ButtonAction::MenuReview).await;
    assert_eq!(h.state(1).await.step(), Step::ReviewRating);

    h.press(1, rating(3)).await;
    assert_eq!(h.state(1).await.step(), Step::ReviewText);

    let replies = h.press(1, ButtonAction::SkipReviewText).await;

    let reviews = h.repo.reviews();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].rating.value(), 3);
    assert_eq!(reviews[0].text, None);
    assert!(reviews[0].order_id.is_some());

    let state = h.state(1).await;
    assert_eq!(state.step(), Step::MainMenu);
    assert!(state.order_details().is_some());
    assert!(all_text(&replies).contains("DATUM10"));
}

#[tokio::test]
async fn test_typed_rating_is_accepted_and_invalid_rejected() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    h.press(1, ButtonAction::MenuReview).await;

    h.text(1, "7").await;
    assert_eq!(h.state(1).await.step(), Step::ReviewRating);

    h.text(1, "4").await;
    assert!(matches!(
        h.state(1).await,
        ConversationState::ReviewText { rating, .. } if rating.value() == 4
    ));
}

#[tokio::test]
async fn test_product_views_stay_in_main_menu() {
    let h = Harness::new();
    h.reach_main_menu(1).await;

    let info = h.press(1, ButtonAction::MenuInfo).await;
    assert!(all_text(&info).contains("Azim EDT"));
    assert!(all_text(&info).contains("150000"));

    let alternatives = h.press(1, ButtonAction::MenuAlternatives).await;
    assert!(all_text(&alternatives).contains("Bilmim EDP"));

    let seasonal = h.press(1, ButtonAction::MenuSeasonal).await;
    // all-year products are recommended in every season
    assert!(all_text(&seasonal).contains("Bilmim EDP"));

    assert_eq!(h.state(1).await.step(), Step::MainMenu);
    let actions: Vec<String> = h.repo.dialogs().into_iter().map(|d| d.action).collect();
    for tag in ["product_info_viewed", "alternatives_viewed", "seasonal_viewed"] {
        assert!(actions.iter().any(|a| a == tag), "missing {tag}");
    }
}

#[tokio::test]
async fn test_product_info_without_order() {
    let h = Harness::new();
    h.text(1, "/start").await;
    h.text(1, "/menu").await;
    assert_eq!(h.state(1).await, ConversationState::MainMenu { details: None });

    let replies = h.press(1, ButtonAction::MenuInfo).await;
    assert!(offers(&replies, ButtonAction::Restart));
    assert_eq!(h.state(1).await.step(), Step::MainMenu);
}

#[tokio::test]
async fn test_support_call_with_typed_phone() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    h.press(1, ButtonAction::MenuSupport).await;
    let prompt = h.press(1, ButtonAction::SupportCall).await;
    assert!(matches!(prompt[0].keyboard, Keyboard::RequestContact { .. }));
    assert_eq!(h.repo.dialogs().pop().unwrap().action, "support_call_selected");

    let invalid = h.text(1, "call me").await;
    assert_eq!(h.state(1).await.step(), Step::SupportCall);
    assert!(all_text(&invalid).contains("does not look like a phone number"));

    h.text(1, "+998 90 123-45-67").await;
    assert_eq!(h.state(1).await.step(), Step::MainMenu);

    let requests = h.repo.support_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].request_type, RequestType::Call);
    assert_eq!(requests[0].phone.as_deref(), Some("+998901234567"));
    assert_eq!(requests[0].status, SupportStatus::Pending);

    h.flush().await;
    assert_eq!(h.notifier.sent().last().unwrap(), "support_request:call");
}

#[tokio::test]
async fn test_support_call_with_shared_contact() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    h.press(1, ButtonAction::MenuSupport).await;
    h.press(1, ButtonAction::SupportCall).await;
    h.send(InboundEvent::contact(1, "+998711112233", None)).await;

    let requests = h.repo.support_requests();
    assert_eq!(requests[0].phone.as_deref(), Some("+998711112233"));
    assert_eq!(h.repo.users()[0].phone.as_deref(), Some("+998711112233"));
}

#[tokio::test]
async fn test_support_chat_is_created_immediately() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    h.press(1, ButtonAction::MenuSupport).await;
    h.press(1, ButtonAction::SupportChat).await;

    let requests = h.repo.support_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].request_type, RequestType::Chat);
    assert_eq!(requests[0].message.as_deref(), Some(CHAT_REQUEST_MESSAGE));
    assert_eq!(h.state(1).await.step(), Step::MainMenu);
}

#[tokio::test]
async fn test_support_email_requires_text() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    h.press(1, ButtonAction::MenuSupport).await;
    h.press(1, ButtonAction::SupportEmail).await;
    let selected = h.repo.dialogs().pop().unwrap();
    assert_eq!(selected.direction, Direction::Outgoing);
    assert_eq!(selected.action, "support_email_selected");

    h.text(1, "   ").await;
    assert_eq!(h.state(1).await.step(), Step::SupportEmail);

    h.text(1, "Can I exchange a bottle?").await;
    assert_eq!(h.state(1).await.step(), Step::MainMenu);
    assert_eq!(
        h.repo.support_requests()[0].message.as_deref(),
        Some("Can I exchange a bottle?")
    );
}

#[tokio::test]
async fn test_concurrent_support_requests_are_independent() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    h.reach_main_menu(2).await;
    h.press(1, ButtonAction::MenuSupport).await;
    h.press(2, ButtonAction::MenuSupport).await;
    h.press(1, ButtonAction::SupportCall).await;
    h.press(2, ButtonAction::SupportEmail).await;

    let (call, email) = tokio::join!(
        h.text(1, "+998901234567"),
        h.text(2, "Where is my parcel?")
    );
    assert!(!call.is_empty());
    assert!(!email.is_empty());

    let requests = h.repo.support_requests();
    assert_eq!(requests.len(), 2);
    let call = requests
        .iter()
        .find(|r| r.request_type == RequestType::Call)
        .unwrap();
    let email = requests
        .iter()
        .find(|r| r.request_type == RequestType::Email)
        .unwrap();
    assert_ne!(call.user_id, email.user_id);
    assert_eq!(call.phone.as_deref(), Some("+998901234567"));
    assert_eq!(email.message.as_deref(), Some("Where is my parcel?"));

    assert_eq!(h.state(1).await.step(), Step::MainMenu);
    assert_eq!(h.state(2).await.step(), Step::MainMenu);

    h.flush().await;
    assert_eq!(h.notifier.count("support_request"), 2);
}

#[tokio::test]
async fn test_same_user_race_is_last_write_wins() {
    // Two events for one user evaluated against the same starting state:
    // both succeed and whichever writes last decides the stored state.
    let sessions = Arc::new(RacingSessionStore::new(2));
    let h = Harness::with_sessions(sessions.clone());
    h.reach_main_menu(1).await;

    sessions.arm(2);
    let (review, support) = tokio::join!(
        h.press(1, ButtonAction::MenuReview),
        h.press(1, ButtonAction::MenuSupport)
    );
    assert!(offers(&review, rating(5)));
    assert!(offers(&support, ButtonAction::SupportCall));
    assert!(!all_text(&review).contains("did not understand"));
    assert!(!all_text(&support).contains("did not understand"));

    let step = h.state(1).await.step();
    assert!(
        step == Step::ReviewRating || step == Step::SupportSelection,
        "unexpected step {step}"
    );

    // Both transitions ran and were audited
    let actions: Vec<_> = h
        .repo
        .dialogs()
        .into_iter()
        .filter(|d| d.direction == Direction::Outgoing)
        .map(|d| d.action)
        .collect();
    assert!(actions.contains(&"review_started".to_string()));
    assert!(actions.contains(&"support_requested".to_string()));
}

#[tokio::test]
async fn test_unrecognized_input_keeps_state_without_audit() {
    let h = Harness::new();
    h.text(1, "/start").await;
    let logged_before = h.repo.dialogs().len();

    let replies = h.text(1, "hello there").await;

    assert_eq!(h.state(1).await, ConversationState::PlatformSelection);
    assert!(all_text(&replies).contains("did not understand"));

    let new_entries: Vec<_> = h.repo.dialogs().into_iter().skip(logged_before).collect();
    assert_eq!(new_entries.len(), 1);
    assert_eq!(new_entries[0].direction, Direction::Incoming);
    assert_eq!(new_entries[0].metadata.as_ref().unwrap()["state"], "platform_selection");
}

#[tokio::test]
async fn test_unsupported_message_is_logged_without_state_change() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    let before = h.repo.dialogs().len();

    let entry = NewDialogEntry::incoming(1, "unsupported_message")
        .with_metadata(json!({ "kind": "sticker" }));
    let reply = h.engine.reject_unsupported(entry, Some("en")).await;

    assert_eq!(reply.keyboard, Keyboard::None);
    assert_eq!(h.state(1).await.step(), Step::MainMenu);

    let dialogs = h.repo.dialogs();
    assert_eq!(dialogs.len(), before + 1);
    let logged = dialogs.last().unwrap();
    assert_eq!(logged.direction, Direction::Incoming);
    assert_eq!(logged.action, "unsupported_message");
    assert!(logged.order_id.is_some());
    assert_eq!(
        logged.metadata.clone().unwrap(),
        json!({ "kind": "sticker", "state": "main_menu" })
    );
}

#[tokio::test]
async fn test_stale_button_is_not_understood() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    h.send(InboundEvent::button(1, "edit_3")).await;
    h.press(1, ButtonAction::SupportCall).await;
    assert_eq!(h.state(1).await.step(), Step::MainMenu);
}

#[tokio::test]
async fn test_events_before_start_ask_to_start() {
    let h = Harness::new();
    let replies = h.text(1, "ORD12345").await;
    assert!(offers(&replies, ButtonAction::StartAgain));
    assert_eq!(h.state(1).await, ConversationState::Start);

    h.press(1, ButtonAction::StartAgain).await;
    assert_eq!(h.state(1).await, ConversationState::PlatformSelection);
}

#[tokio::test]
async fn test_restart_runs_start_directly() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    let replies = h.press(1, ButtonAction::Restart).await;

    assert_eq!(h.state(1).await, ConversationState::PlatformSelection);
    assert!(offers(&replies, ButtonAction::Platform(Platform::Olx)));
    assert!(h.repo.dialogs().iter().any(|d| d.action == "restart"));
    assert_eq!(h.repo.users().len(), 1);
}

#[tokio::test]
async fn test_help_and_menu_commands() {
    let h = Harness::new();
    h.reach_main_menu(1).await;
    h.press(1, ButtonAction::MenuReview).await;

    let help = h.text(1, "/help").await;
    assert!(all_text(&help).contains("/menu"));
    assert_eq!(h.state(1).await.step(), Step::ReviewRating);

    h.text(1, "/menu").await;
    let state = h.state(1).await;
    assert_eq!(state.step(), Step::MainMenu);
    assert!(state.order_details().is_some());
}

#[tokio::test]
async fn test_retry_order_returns_to_input() {
    let h = Harness::new();
    h.text(1, "/start").await;
    h.press(1, ButtonAction::Platform(Platform::Uzum)).await;
    h.text(1, "ORD67890").await;
    h.press(1, ButtonAction::RetryOrder).await;

    assert_eq!(
        h.state(1).await,
        ConversationState::OrderInput {
            platform: Platform::Uzum
        }
    );

    let retry = h.repo.dialogs().pop().unwrap();
    assert_eq!(retry.direction, Direction::Outgoing);
    assert_eq!(retry.action, "order_retry");
    assert_eq!(
        retry.metadata.unwrap(),
        json!({ "platform": "UZUM", "state": "order_input" })
    );
}

#[tokio::test]
async fn test_repository_failure_leaves_state_unchanged() {
    let repo = Arc::new(FlakyRepository {
        inner: Arc::new(seeded_repository()),
        ..Default::default()
    });
    let sessions = Arc::new(InMemorySessionStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = Engine::new(
        repo.clone(),
        sessions.clone(),
        NotificationDispatcher::new(notifier.clone()),
        EngineSettings::default(),
    );

    engine.handle(InboundEvent::text(1, "/start")).await;
    engine
        .handle(InboundEvent::button(1, "platform_wolt"))
        .await;

    repo.fail_lookups.store(true, Ordering::SeqCst);
    let replies = engine.handle(InboundEvent::text(1, "ORD12345")).await;

    assert_eq!(replies.len(), 1);
    assert!(replies[0].text.contains("Something went wrong"));
    assert!(offers(&replies, ButtonAction::Retry));
    assert_eq!(
        sessions.get(1).await.state,
        ConversationState::OrderInput {
            platform: Platform::Wolt
        }
    );

    repo.fail_lookups.store(false, Ordering::SeqCst);
    let retry = engine.handle(InboundEvent::button(1, "retry")).await;
    assert!(all_text(&retry).contains("order number"));

    engine.handle(InboundEvent::text(1, "ORD12345")).await;
    assert_eq!(sessions.get(1).await.step(), Step::OrderFound);
}

#[tokio::test]
async fn test_log_failure_is_not_fatal() -> Result<()> {
    let inner = Arc::new(seeded_repository());
    let repo = Arc::new(FlakyRepository {
        inner: inner.clone(),
        ..Default::default()
    });
    repo.fail_logs.store(true, Ordering::SeqCst);

    let sessions = Arc::new(InMemorySessionStore::new());
    let engine = Engine::new(
        repo,
        sessions.clone(),
        NotificationDispatcher::new(Arc::new(RecordingNotifier::default())),
        EngineSettings::default(),
    );

    engine.handle(InboundEvent::text(1, "/start")).await;
    engine
        .handle(InboundEvent::button(1, "platform_uzum"))
        .await;
    engine.handle(InboundEvent::text(1, "ord67890")).await;

    assert_eq!(sessions.get(1).await.step(), Step::OrderFound);
    assert!(inner.dialogs().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_notifier_failure_is_swallowed() {
    let repo = Arc::new(seeded_repository());
    let sessions = Arc::new(InMemorySessionStore::new());
    let engine = Engine::new(
        repo.clone(),
        sessions.clone(),
        NotificationDispatcher::new(Arc::new(BrokenNotifier)),
        EngineSettings {
            promo_code: "SPRING5".to_string(),
        },
    );

    for event in [
        InboundEvent::text(1, "/start"),
        InboundEvent::button(1, "platform_wolt"),
        InboundEvent::text(1, "ORD12345"),
        InboundEvent::button(1, "skip_contact"),
        InboundEvent::button(1, "menu_review"),
        InboundEvent::button(1, "review_2"),
    ] {
        engine.handle(event).await;
    }
    let replies = engine
        .handle(InboundEvent::text(1, "Bottle arrived broken"))
        .await;
    engine.notifications().flush().await;

    assert!(all_text(&replies).contains("SPRING5"));
    assert_eq!(repo.reviews().len(), 1);
    assert_eq!(sessions.get(1).await.step(), Step::MainMenu);
}

#[tokio::test]
async fn test_every_event_is_logged_incoming_then_outgoing() {
    let h = Harness::new();
    h.reach_main_menu(1).await;

    let dialogs = h.repo.dialogs();
    let incoming = dialogs
        .iter()
        .filter(|d| d.direction == Direction::Incoming)
        .count();
    assert_eq!(incoming, 4);

    let outgoing: Vec<&str> = dialogs
        .iter()
        .filter(|d| d.direction == Direction::Outgoing)
        .map(|d| d.action.as_str())
        .collect();
    assert_eq!(
        outgoing,
        vec!["bot_started", "platform_selected", "order_found", "contact_skipped"]
    );

    let found = dialogs.iter().find(|d| d.action == "order_found").unwrap();
    assert!(found.order_id.is_some());
    assert_eq!(found.metadata.as_ref().unwrap()["state"], "order_found");
}
