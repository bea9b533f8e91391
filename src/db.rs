//! Postgres persistence for users, catalog, reviews, support requests and
//! the dialog audit log.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use sqlx::postgres::PgPool;
use tracing::{debug, info};

use crate::models::{
    normalize_order_number, ExternalId, NewDialogEntry, NewReview, NewSupportRequest, Order,
    OrderDetails, Platform, Product, Review, Season, SupportRequest, User, UserProfile,
};
use crate::repository::{Repository, RepositoryResult};

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT NOT NULL UNIQUE,
            name TEXT,
            phone TEXT,
            email TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS products (
            sku TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            volume TEXT,
            concentration TEXT,
            description TEXT,
            instructions TEXT,
            price BIGINT,
            season_tag TEXT NOT NULL DEFAULT 'all-year',
            alternatives TEXT[] NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create products table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS orders (
            id BIGSERIAL PRIMARY KEY,
            order_number TEXT NOT NULL UNIQUE,
            platform TEXT NOT NULL,
            user_id BIGINT REFERENCES users(id),
            product_sku TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'delivered',
            raw_payload JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create orders table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS reviews (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT REFERENCES users(id),
            order_id BIGINT REFERENCES orders(id),
            rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
            text TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create reviews table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS support_requests (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT REFERENCES users(id),
            request_type TEXT NOT NULL CHECK (request_type IN ('call', 'chat', 'email')),
            phone TEXT,
            message TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'in_progress', 'resolved')),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create support_requests table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS dialogs (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT REFERENCES users(id),
            order_id BIGINT REFERENCES orders(id),
            message TEXT,
            direction TEXT NOT NULL CHECK (direction IN ('incoming', 'outgoing')),
            action TEXT NOT NULL,
            metadata JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create dialogs table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_dialogs_user_id ON dialogs(user_id)")
        .execute(pool)
        .await
        .context("Failed to create dialogs index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Insert the demo perfume catalog and orders used for local testing.
///
/// Existing rows are left alone, so this is safe to run on every startup.
pub async fn seed_demo_catalog(pool: &PgPool) -> Result<()> {
    info!("Seeding demo catalog");

    let products = [
        (
            "DATUM-EDP-50",
            "BILMIM - Eau de Parfum 50ml",
            "50ml",
            "EDP",
            "Woody floral scent. Lasts 8+ hours. Ideal for evenings.",
            "Apply to pulse points: wrists, neck, behind the ears.",
            150_000_i64,
            Season::AllYear,
            vec!["DATUM-EDT-30", "DATUM-INTENSE-50"],
        ),
        (
            "DATUM-EDT-30",
            "AZIM - Eau de Toilette 30ml",
            "30ml",
            "EDT",
            "Light floral scent. Lasts 4-5 hours. Suits daytime.",
            "Can be reapplied several times a day.",
            100_000,
            Season::Summer,
            vec!["DATUM-EDP-50", "DATUM-INTENSE-50"],
        ),
        (
            "DATUM-INTENSE-50",
            "RAVSHAN - Intense 50ml",
            "50ml",
            "Intense",
            "Rich woody spicy scent. Lasts 10+ hours.",
            "Economical: 2-3 sprays are enough.",
            180_000,
            Season::AutumnWinter,
            vec!["DATUM-EDP-50", "DATUM-EDT-30"],
        ),
    ];

    for (sku, title, volume, concentration, description, instructions, price, season, alts) in
        products
    {
        sqlx::query(
            "INSERT INTO products
                (sku, title, volume, concentration, description, instructions, price, season_tag, alternatives)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (sku) DO NOTHING",
        )
        .bind(sku)
        .bind(title)
        .bind(volume)
        .bind(concentration)
        .bind(description)
        .bind(instructions)
        .bind(price)
        .bind(season.as_str())
        .bind(alts)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to seed product {sku}"))?;
    }

    let orders = [
        ("ORD12345", Platform::Wolt, "DATUM-EDP-50"),
        ("ORD67890", Platform::Uzum, "DATUM-EDT-30"),
        ("#1234567", Platform::Yandex, "DATUM-INTENSE-50"),
    ];

    for (number, platform, sku) in orders {
        sqlx::query(
            "INSERT INTO orders (order_number, platform, product_sku, status, raw_payload)
             VALUES ($1, $2, $3, 'delivered', $4)
             ON CONFLICT (order_number) DO NOTHING",
        )
        .bind(normalize_order_number(number))
        .bind(platform.as_str())
        .bind(sku)
        .bind(json!({ "source": "demo" }))
        .execute(pool)
        .await
        .with_context(|| format!("Failed to seed order {number}"))?;
    }

    info!("Demo catalog seeded");
    Ok(())
}

/// Get or create a user, overwriting only the non-empty profile fields
pub async fn get_or_create_user(
    pool: &PgPool,
    telegram_id: ExternalId,
    profile: &UserProfile,
) -> Result<User, sqlx::Error> {
    debug!(telegram_id, "Upserting user");

    sqlx::query_as::<_, User>(
        "INSERT INTO users (telegram_id, name, phone, email)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (telegram_id) DO UPDATE SET
            name = COALESCE(EXCLUDED.name, users.name),
            phone = COALESCE(EXCLUDED.phone, users.phone),
            email = COALESCE(EXCLUDED.email, users.email)
         RETURNING id, telegram_id, name, phone, email, created_at",
    )
    .bind(telegram_id)
    .bind(profile.name())
    .bind(profile.phone())
    .bind(profile.email())
    .fetch_one(pool)
    .await
}

pub async fn get_user_by_telegram_id(
    pool: &PgPool,
    telegram_id: ExternalId,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT id, telegram_id, name, phone, email, created_at FROM users WHERE telegram_id = $1",
    )
    .bind(telegram_id)
    .fetch_optional(pool)
    .await
}

pub async fn find_order(pool: &PgPool, order_number: &str) -> Result<Option<Order>, sqlx::Error> {
    let normalized = normalize_order_number(order_number);
    debug!(order_number = %normalized, "Looking up order");

    sqlx::query_as::<_, Order>(
        "SELECT id, order_number, platform, user_id, product_sku, status, raw_payload, created_at
         FROM orders WHERE order_number = $1",
    )
    .bind(&normalized)
    .fetch_optional(pool)
    .await
}

pub async fn get_product(pool: &PgPool, sku: &str) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(
        "SELECT sku, title, volume, concentration, description, instructions, price,
                season_tag, alternatives
         FROM products WHERE sku = $1",
    )
    .bind(sku)
    .fetch_optional(pool)
    .await
}

/// Postgres-backed [`Repository`]
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn get_or_create_user(
        &self,
        external_id: ExternalId,
        profile: &UserProfile,
    ) -> RepositoryResult<User> {
        Ok(get_or_create_user(&self.pool, external_id, profile).await?)
    }

    async fn get_user(&self, external_id: ExternalId) -> RepositoryResult<Option<User>> {
        Ok(get_user_by_telegram_id(&self.pool, external_id).await?)
    }

    async fn find_order(&self, order_number: &str) -> RepositoryResult<Option<Order>> {
        Ok(find_order(&self.pool, order_number).await?)
    }

    async fn get_order_with_product(
        &self,
        order_number: &str,
    ) -> RepositoryResult<Option<OrderDetails>> {
        let Some(order) = find_order(&self.pool, order_number).await? else {
            return Ok(None);
        };

        match get_product(&self.pool, &order.product_sku).await? {
            Some(product) => Ok(Some(OrderDetails { order, product })),
            None => {
                debug!(product_sku = %order.product_sku, "Order references a missing product");
                Ok(None)
            }
        }
    }

    async fn get_product(&self, sku: &str) -> RepositoryResult<Option<Product>> {
        Ok(get_product(&self.pool, sku).await?)
    }

    async fn get_alternatives(&self, sku: &str) -> RepositoryResult<Vec<Product>> {
        let Some(product) = get_product(&self.pool, sku).await? else {
            return Ok(Vec::new());
        };
        if product.alternatives.is_empty() {
            return Ok(Vec::new());
        }

        Ok(sqlx::query_as::<_, Product>(
            "SELECT sku, title, volume, concentration, description, instructions, price,
                    season_tag, alternatives
             FROM products WHERE sku = ANY($1) ORDER BY sku",
        )
        .bind(product.alternatives.as_slice())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_seasonal_products(&self, season: Season) -> RepositoryResult<Vec<Product>> {
        Ok(sqlx::query_as::<_, Product>(
            "SELECT sku, title, volume, concentration, description, instructions, price,
                    season_tag, alternatives
             FROM products
             WHERE season_tag = $1 OR season_tag = 'all-year'
             ORDER BY sku",
        )
        .bind(season.as_str())
        .fetch_all(&self.pool)
        .await?)
    }

    async fn save_review(&self, review: NewReview) -> RepositoryResult<Review> {
        Ok(sqlx::query_as::<_, Review>(
            "INSERT INTO reviews (user_id, order_id, rating, text)
             VALUES ($1, $2, $3, $4)
             RETURNING id, user_id, order_id, rating, text, created_at",
        )
        .bind(review.user_id)
        .bind(review.order_id)
        .bind(i16::from(review.rating))
        .bind(review.text)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn create_support_request(
        &self,
        request: NewSupportRequest,
    ) -> RepositoryResult<SupportRequest> {
        Ok(sqlx::query_as::<_, SupportRequest>(
            "INSERT INTO support_requests (user_id, request_type, phone, message, status)
             VALUES ($1, $2, $3, $4, 'pending')
             RETURNING id, user_id, request_type, phone, message, status, created_at",
        )
        .bind(request.user_id)
        .bind(request.request_type.as_str())
        .bind(request.phone)
        .bind(request.message)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn log_dialog(&self, entry: NewDialogEntry) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO dialogs (user_id, order_id, message, direction, action, metadata)
             VALUES ((SELECT id FROM users WHERE telegram_id = $1), $2, $3, $4, $5, $6)",
        )
        .bind(entry.external_id)
        .bind(entry.order_id)
        .bind(entry.message)
        .bind(entry.direction.as_str())
        .bind(entry.action)
        .bind(entry.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
