//! # Repository Contract
//!
//! The small CRUD-style persistence surface the conversation engine needs.
//! [`crate::db::PgRepository`] implements it on Postgres; [`InMemoryRepository`]
//! keeps everything in process memory for tests and database-less runs.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{
    normalize_order_number, DialogEntry, ExternalId, NewDialogEntry, NewReview,
    NewSupportRequest, Order, OrderDetails, Product, Review, Season, SupportRequest,
    SupportStatus, User, UserProfile,
};

/// Errors raised by a repository backend
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persistence operations consumed by the conversation engine.
///
/// Implementations must be safe to call concurrently from many handler tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Fetch the user for `external_id`, creating it on first contact.
    ///
    /// Non-empty profile fields overwrite stored values; empty or missing
    /// ones leave stored data untouched.
    async fn get_or_create_user(
        &self,
        external_id: ExternalId,
        profile: &UserProfile,
    ) -> RepositoryResult<User>;

    async fn get_user(&self, external_id: ExternalId) -> RepositoryResult<Option<User>>;

    /// Exact match on the normalized order number
    async fn find_order(&self, order_number: &str) -> RepositoryResult<Option<Order>>;

    /// Order plus its product; `None` when either is missing
    async fn get_order_with_product(
        &self,
        order_number: &str,
    ) -> RepositoryResult<Option<OrderDetails>>;

    async fn get_product(&self, sku: &str) -> RepositoryResult<Option<Product>>;

    /// Products listed as alternatives of `sku`, one level deep
    async fn get_alternatives(&self, sku: &str) -> RepositoryResult<Vec<Product>>;

    /// Products tagged with `season` or `all-year`
    async fn get_seasonal_products(&self, season: Season) -> RepositoryResult<Vec<Product>>;

    async fn save_review(&self, review: NewReview) -> RepositoryResult<Review>;

    /// Always stored with [`SupportStatus::Pending`]
    async fn create_support_request(
        &self,
        request: NewSupportRequest,
    ) -> RepositoryResult<SupportRequest>;

    async fn log_dialog(&self, entry: NewDialogEntry) -> RepositoryResult<()>;
}

#[derive(Debug, Default)]
struct MemoryTables {
    users: Vec<User>,
    products: HashMap<String, Product>,
    orders: Vec<Order>,
    reviews: Vec<Review>,
    support_requests: Vec<SupportRequest>,
    dialogs: Vec<DialogEntry>,
    next_id: i64,
}

impl MemoryTables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-memory repository.
///
/// Also exposes seeding and inspection helpers that the engine never calls,
/// so tests can arrange catalog data and assert on written rows.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: Mutex<MemoryTables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, MemoryTables> {
        // A panic while holding the lock cannot leave the tables half-written
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_product(&self, product: Product) {
        self.tables().products.insert(product.sku.clone(), product);
    }

    pub fn remove_product(&self, sku: &str) -> Option<Product> {
        self.tables().products.remove(sku)
    }

    /// Insert an order; its number is stored normalized
    pub fn insert_order(&self, mut order: Order) -> Order {
        let mut tables = self.tables();
        if order.id == 0 {
            order.id = tables.next_id();
        }
        order.order_number = normalize_order_number(&order.order_number);
        tables.orders.push(order.clone());
        order
    }

    pub fn users(&self) -> Vec<User> {
        self.tables().users.clone()
    }

    pub fn reviews(&self) -> Vec<Review> {
        self.tables().reviews.clone()
    }

    pub fn support_requests(&self) -> Vec<SupportRequest> {
        self.tables().support_requests.clone()
    }

    pub fn dialogs(&self) -> Vec<DialogEntry> {
        self.tables().dialogs.clone()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_or_create_user(
        &self,
        external_id: ExternalId,
        profile: &UserProfile,
    ) -> RepositoryResult<User> {
        let mut tables = self.tables();
        if let Some(user) = tables.users.iter_mut().find(|u| u.telegram_id == external_id) {
            if let Some(name) = profile.name() {
                user.name = Some(name.to_string());
            }
            if let Some(phone) = profile.phone() {
                user.phone = Some(phone.to_string());
            }
            if let Some(email) = profile.email() {
                user.email = Some(email.to_string());
            }
            return Ok(user.clone());
        }

        let user = User {
            id: tables.next_id(),
            telegram_id: external_id,
            name: profile.name().map(str::to_string),
            phone: profile.phone().map(str::to_string),
            email: profile.email().map(str::to_string),
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, external_id: ExternalId) -> RepositoryResult<Option<User>> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.telegram_id == external_id)
            .cloned())
    }

    async fn find_order(&self, order_number: &str) -> RepositoryResult<Option<Order>> {
        let normalized = normalize_order_number(order_number);
        Ok(self
            .tables()
            .orders
            .iter()
            .find(|o| o.order_number == normalized)
            .cloned())
    }

    async fn get_order_with_product(
        &self,
        order_number: &str,
    ) -> RepositoryResult<Option<OrderDetails>> {
        let Some(order) = self.find_order(order_number).await? else {
            return Ok(None);
        };
        let product = self.get_product(&order.product_sku).await?;
        Ok(product.map(|product| OrderDetails { order, product }))
    }

    async fn get_product(&self, sku: &str) -> RepositoryResult<Option<Product>> {
        Ok(self.tables().products.get(sku).cloned())
    }

    async fn get_alternatives(&self, sku: &str) -> RepositoryResult<Vec<Product>> {
        let tables = self.tables();
        let Some(product) = tables.products.get(sku) else {
            return Ok(Vec::new());
        };
        Ok(product
            .alternatives
            .iter()
            .filter_map(|alt| tables.products.get(alt).cloned())
            .collect())
    }

    async fn get_seasonal_products(&self, season: Season) -> RepositoryResult<Vec<Product>> {
        let mut products: Vec<Product> = self
            .tables()
            .products
            .values()
            .filter(|p| p.season_tag == season || p.season_tag == Season::AllYear)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(products)
    }

    async fn save_review(&self, review: NewReview) -> RepositoryResult<Review> {
        let mut tables = self.tables();
        let review = Review {
            id: tables.next_id(),
            user_id: review.user_id,
            order_id: review.order_id,
            rating: review.rating,
            text: review.text,
            created_at: Utc::now(),
        };
        tables.reviews.push(review.clone());
        Ok(review)
    }

    async fn create_support_request(
        &self,
        request: NewSupportRequest,
    ) -> RepositoryResult<SupportRequest> {
        let mut tables = self.tables();
        let request = SupportRequest {
            id: tables.next_id(),
            user_id: request.user_id,
            request_type: request.request_type,
            phone: request.phone,
            message: request.message,
            status: SupportStatus::Pending,
            created_at: Utc::now(),
        };
        tables.support_requests.push(request.clone());
        Ok(request)
    }

    async fn log_dialog(&self, entry: NewDialogEntry) -> RepositoryResult<()> {
        let mut tables = self.tables();
        let user_id = entry.external_id.and_then(|external_id| {
            tables
                .users
                .iter()
                .find(|u| u.telegram_id == external_id)
                .map(|u| u.id)
        });
        let id = tables.next_id();
        tables.dialogs.push(DialogEntry {
            id,
            user_id,
            order_id: entry.order_id,
            message: entry.message,
            direction: entry.direction,
            action: entry.action,
            metadata: entry.metadata,
            created_at: Utc::now(),
        });
        Ok(())
    }
}
