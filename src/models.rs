//! # Domain Data Model
//!
//! Durable records the conversation engine reads and writes through the
//! [`Repository`](crate::repository::Repository) contract.
//!
//! ## Core Concepts
//!
//! - **User**: a chat identity, created on first contact and enriched later
//! - **Order** / **Product**: the purchase a user asks about, read-only here
//! - **Review** / **SupportRequest**: rows created by the conversation
//! - **DialogEntry**: append-only audit trail of every inbound/outbound event

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External chat identity (the Telegram user id)
pub type ExternalId = i64;

/// Error returned when a stored or user-supplied value does not map to an enum
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Marketplace the order was placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Wolt,
    Uzum,
    Yandex,
    Olx,
    Other,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Wolt,
        Platform::Uzum,
        Platform::Yandex,
        Platform::Olx,
        Platform::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Wolt => "WOLT",
            Platform::Uzum => "UZUM",
            Platform::Yandex => "YANDEX",
            Platform::Olx => "OLX",
            Platform::Other => "OTHER",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WOLT" => Ok(Platform::Wolt),
            "UZUM" => Ok(Platform::Uzum),
            "YANDEX" => Ok(Platform::Yandex),
            "OLX" => Ok(Platform::Olx),
            "OTHER" => Ok(Platform::Other),
            _ => Err(ParseEnumError::new("platform", s)),
        }
    }
}

impl TryFrom<String> for Platform {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Season tag attached to products for seasonal recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Season {
    Summer,
    AutumnWinter,
    AllYear,
}

impl Season {
    /// Season used for recommendations in the given calendar month (1-12).
    ///
    /// Spring is folded into summer and autumn into autumn-winter, so only
    /// two seasons are ever recommended.
    pub fn for_month(month: u32) -> Season {
        match month {
            3..=8 => Season::Summer,
            _ => Season::AutumnWinter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Summer => "summer",
            Season::AutumnWinter => "autumn-winter",
            Season::AllYear => "all-year",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "summer" => Ok(Season::Summer),
            "autumn-winter" => Ok(Season::AutumnWinter),
            "all-year" => Ok(Season::AllYear),
            _ => Err(ParseEnumError::new("season", s)),
        }
    }
}

impl TryFrom<String> for Season {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Review score, always within 1..=5
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Ratings of 2 or below trigger the operator escalation alert
    pub fn is_negative(&self) -> bool {
        self.0 <= 2
    }
}

impl TryFrom<i16> for Rating {
    type Error = ParseEnumError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Rating::new)
            .ok_or_else(|| ParseEnumError::new("rating", &value.to_string()))
    }
}

impl From<Rating> for i16 {
    fn from(rating: Rating) -> Self {
        i16::from(rating.0)
    }
}

impl FromStr for Rating {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i16>()
            .map_err(|_| ParseEnumError::new("rating", s))
            .and_then(Rating::try_from)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel a customer picked to reach a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Call,
    Chat,
    Email,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Call => "call",
            RequestType::Chat => "chat",
            RequestType::Email => "email",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "call" => Ok(RequestType::Call),
            "chat" => Ok(RequestType::Chat),
            "email" => Ok(RequestType::Email),
            _ => Err(ParseEnumError::new("request type", s)),
        }
    }
}

impl TryFrom<String> for RequestType {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Lifecycle of a support request. The bot only ever creates `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportStatus {
    #[default]
    Pending,
    InProgress,
    Resolved,
}

impl SupportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportStatus::Pending => "pending",
            SupportStatus::InProgress => "in_progress",
            SupportStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for SupportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SupportStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(SupportStatus::Pending),
            "in_progress" => Ok(SupportStatus::InProgress),
            "resolved" => Ok(SupportStatus::Resolved),
            _ => Err(ParseEnumError::new("support status", s)),
        }
    }
}

impl TryFrom<String> for SupportStatus {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Direction of an audited dialog event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "incoming" => Ok(Direction::Incoming),
            "outgoing" => Ok(Direction::Outgoing),
            _ => Err(ParseEnumError::new("direction", s)),
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Durable user record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub telegram_id: ExternalId,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Optional profile fields supplied alongside a contact-bearing event.
///
/// Empty strings are treated as absent so they never overwrite stored data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl UserProfile {
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        non_empty(self.name.as_deref())
    }

    pub fn phone(&self) -> Option<&str> {
        non_empty(self.phone.as_deref())
    }

    pub fn email(&self) -> Option<&str> {
        non_empty(self.email.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Perfume product; `alternatives` holds sku references one level deep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub sku: String,
    pub title: String,
    pub volume: Option<String>,
    pub concentration: Option<String>,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub price: Option<i64>,
    #[sqlx(try_from = "String")]
    pub season_tag: Season,
    pub alternatives: Vec<String>,
}

/// Marketplace order, keyed by its normalized order number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    #[sqlx(try_from = "String")]
    pub platform: Platform,
    pub user_id: Option<i64>,
    pub product_sku: String,
    pub status: String,
    pub raw_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// An order together with the product it references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub product: Product,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: i64,
    pub user_id: Option<i64>,
    pub order_id: Option<i64>,
    #[sqlx(try_from = "i16")]
    pub rating: Rating,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub user_id: Option<i64>,
    pub order_id: Option<i64>,
    pub rating: Rating,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SupportRequest {
    pub id: i64,
    pub user_id: Option<i64>,
    #[sqlx(try_from = "String")]
    pub request_type: RequestType,
    pub phone: Option<String>,
    pub message: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: SupportStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSupportRequest {
    pub user_id: Option<i64>,
    pub request_type: RequestType,
    pub phone: Option<String>,
    pub message: Option<String>,
}

/// Stored audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DialogEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub order_id: Option<i64>,
    pub message: Option<String>,
    #[sqlx(try_from = "String")]
    pub direction: Direction,
    pub action: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Audit record to append; the repository resolves `external_id` to a user id
#[derive(Debug, Clone, PartialEq)]
pub struct NewDialogEntry {
    pub external_id: Option<ExternalId>,
    pub order_id: Option<i64>,
    pub message: Option<String>,
    pub direction: Direction,
    pub action: String,
    pub metadata: Option<serde_json::Value>,
}

impl NewDialogEntry {
    pub fn incoming(external_id: ExternalId, action: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id),
            order_id: None,
            message: None,
            direction: Direction::Incoming,
            action: action.into(),
            metadata: None,
        }
    }

    pub fn outgoing(external_id: ExternalId, action: impl Into<String>) -> Self {
        Self {
            direction: Direction::Outgoing,
            ..Self::incoming(external_id, action)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_order(mut self, order_id: Option<i64>) -> Self {
        self.order_id = order_id;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Normalize a user-typed order reference for exact-match lookup.
///
/// Whitespace is trimmed; a leading `#` is kept and everything after it is
/// uppercased, otherwise the whole reference is uppercased.
pub fn normalize_order_number(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_prefix('#') {
        Some(rest) => format!("#{}", rest.trim().to_uppercase()),
        None => trimmed.to_uppercase(),
    }
}
