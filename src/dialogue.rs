//! Conversation states and input validation for the support dialogue.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::models::{OrderDetails, Platform, Rating};

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9()\-\s]*$").expect("phone pattern is valid"));

const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;
const MAX_FREE_TEXT_CHARS: usize = 2000;

/// Where a user currently is in the support conversation.
///
/// Every variant carries exactly the data the step needs, so the order found
/// earlier in the flow travels with the user through the menu sub-flows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ConversationState {
    #[default]
    Start,
    PlatformSelection,
    OrderInput {
        platform: Platform,
    },
    OrderFound {
        platform: Platform,
        details: OrderDetails,
    },
    MainMenu {
        details: Option<OrderDetails>,
    },
    ReviewRating {
        details: Option<OrderDetails>,
    },
    ReviewText {
        details: Option<OrderDetails>,
        rating: Rating,
    },
    SupportSelection {
        details: Option<OrderDetails>,
    },
    SupportCall {
        details: Option<OrderDetails>,
    },
    SupportEmail {
        details: Option<OrderDetails>,
    },
}

impl ConversationState {
    pub fn step(&self) -> Step {
        match self {
            ConversationState::Start => Step::Start,
            ConversationState::PlatformSelection => Step::PlatformSelection,
            ConversationState::OrderInput { .. } => Step::OrderInput,
            ConversationState::OrderFound { .. } => Step::OrderFound,
            ConversationState::MainMenu { .. } => Step::MainMenu,
            ConversationState::ReviewRating { .. } => Step::ReviewRating,
            ConversationState::ReviewText { .. } => Step::ReviewText,
            ConversationState::SupportSelection { .. } => Step::SupportSelection,
            ConversationState::SupportCall { .. } => Step::SupportCall,
            ConversationState::SupportEmail { .. } => Step::SupportEmail,
        }
    }

    /// The order matched earlier in the flow, if any
    pub fn order_details(&self) -> Option<&OrderDetails> {
        match self {
            ConversationState::OrderFound { details, .. } => Some(details),
            ConversationState::MainMenu { details }
            | ConversationState::ReviewRating { details }
            | ConversationState::ReviewText { details, .. }
            | ConversationState::SupportSelection { details }
            | ConversationState::SupportCall { details }
            | ConversationState::SupportEmail { details } => details.as_ref(),
            ConversationState::Start
            | ConversationState::PlatformSelection
            | ConversationState::OrderInput { .. } => None,
        }
    }

    pub fn main_menu(details: Option<OrderDetails>) -> Self {
        ConversationState::MainMenu { details }
    }
}

/// Flat name of a conversation state, used for logs and audit metadata
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Start,
    PlatformSelection,
    OrderInput,
    OrderFound,
    MainMenu,
    ReviewRating,
    ReviewText,
    SupportSelection,
    SupportCall,
    SupportEmail,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Start => "start",
            Step::PlatformSelection => "platform_selection",
            Step::OrderInput => "order_input",
            Step::OrderFound => "order_found",
            Step::MainMenu => "main_menu",
            Step::ReviewRating => "review_rating",
            Step::ReviewText => "review_text",
            Step::SupportSelection => "support_selection",
            Step::SupportCall => "support_call",
            Step::SupportEmail => "support_email",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a callback phone number typed by the user.
///
/// Returns the number as `+digits`, or a localization key describing the problem.
pub fn validate_phone_number(input: &str) -> Result<String, &'static str> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err("phone-empty");
    }

    if !PHONE_PATTERN.is_match(trimmed) {
        return Err("phone-invalid");
    }

    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        return Err("phone-invalid");
    }

    Ok(format!("+{digits}"))
}

/// Normalizes a phone number received from a shared contact
pub fn normalize_shared_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    if trimmed.starts_with('+') {
        trimmed.to_string()
    } else {
        format!("+{trimmed}")
    }
}

/// Optional review comment: blank input means "no comment"
pub fn review_comment(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(truncate_chars(trimmed, MAX_FREE_TEXT_CHARS))
    }
}

/// Validates the message body of an email support request
pub fn validate_support_message(input: &str) -> Result<String, &'static str> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err("support-message-empty");
    }

    if trimmed.chars().count() > MAX_FREE_TEXT_CHARS {
        return Err("support-message-too-long");
    }

    Ok(trimmed.to_string())
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
