//! Transport-neutral outbound messages and the button ids they carry.

use std::fmt;
use std::str::FromStr;

use crate::models::{ParseEnumError, Platform, Rating};

/// Action behind an inline button; its string form is the callback data
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonAction {
    Platform(Platform),
    UploadReceipt,
    RetryOrder,
    ShareContact,
    SkipContact,
    MainMenu,
    MenuInfo,
    MenuAlternatives,
    MenuSeasonal,
    MenuReview,
    MenuSupport,
    Rate(Rating),
    SkipReviewText,
    SupportCall,
    SupportChat,
    SupportEmail,
    Restart,
    StartAgain,
    Retry,
}

impl fmt::Display for ButtonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonAction::Platform(platform) => {
                write!(f, "platform_{}", platform.as_str().to_ascii_lowercase())
            }
            ButtonAction::Rate(rating) => write!(f, "review_{}", rating.value()),
            ButtonAction::UploadReceipt => f.write_str("upload_receipt"),
            ButtonAction::RetryOrder => f.write_str("retry_order"),
            ButtonAction::ShareContact => f.write_str("share_contact"),
            ButtonAction::SkipContact => f.write_str("skip_contact"),
            ButtonAction::MainMenu => f.write_str("main_menu"),
            ButtonAction::MenuInfo => f.write_str("menu_info"),
            ButtonAction::MenuAlternatives => f.write_str("menu_alternatives"),
            ButtonAction::MenuSeasonal => f.write_str("menu_seasonal"),
            ButtonAction::MenuReview => f.write_str("menu_review"),
            ButtonAction::MenuSupport => f.write_str("menu_support"),
            ButtonAction::SkipReviewText => f.write_str("review_skip_text"),
            ButtonAction::SupportCall => f.write_str("support_call"),
            ButtonAction::SupportChat => f.write_str("support_chat"),
            ButtonAction::SupportEmail => f.write_str("support_email"),
            ButtonAction::Restart => f.write_str("restart"),
            ButtonAction::StartAgain => f.write_str("start_again"),
            ButtonAction::Retry => f.write_str("retry"),
        }
    }
}

impl FromStr for ButtonAction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseEnumError {
            kind: "button",
            value: s.to_string(),
        };

        if let Some(platform) = s.strip_prefix("platform_") {
            return platform.parse().map(ButtonAction::Platform).map_err(|_| invalid());
        }
        if let Some(rating) = s.strip_prefix("review_").and_then(|r| r.parse::<Rating>().ok()) {
            return Ok(ButtonAction::Rate(rating));
        }

        match s {
            "upload_receipt" => Ok(ButtonAction::UploadReceipt),
            "retry_order" => Ok(ButtonAction::RetryOrder),
            "share_contact" => Ok(ButtonAction::ShareContact),
            "skip_contact" => Ok(ButtonAction::SkipContact),
            "main_menu" => Ok(ButtonAction::MainMenu),
            "menu_info" => Ok(ButtonAction::MenuInfo),
            "menu_alternatives" => Ok(ButtonAction::MenuAlternatives),
            "menu_seasonal" => Ok(ButtonAction::MenuSeasonal),
            "menu_review" => Ok(ButtonAction::MenuReview),
            "menu_support" => Ok(ButtonAction::MenuSupport),
            "review_skip_text" => Ok(ButtonAction::SkipReviewText),
            "support_call" => Ok(ButtonAction::SupportCall),
            "support_chat" => Ok(ButtonAction::SupportChat),
            "support_email" => Ok(ButtonAction::SupportEmail),
            "restart" => Ok(ButtonAction::Restart),
            "start_again" => Ok(ButtonAction::StartAgain),
            "retry" => Ok(ButtonAction::Retry),
            _ => Err(invalid()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, action: ButtonAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Keyboard {
    #[default]
    None,
    Inline(Vec<Vec<InlineButton>>),
    /// One-time reply keyboard with a single "share my phone number" button
    RequestContact { label: String },
    /// Hide a previously shown reply keyboard
    Remove,
}

/// One message the engine wants delivered to the user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Keyboard,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Keyboard::None,
        }
    }

    pub fn with_inline(mut self, rows: Vec<Vec<InlineButton>>) -> Self {
        self.keyboard = Keyboard::Inline(rows);
        self
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }

    /// Every button action offered by this reply
    pub fn actions(&self) -> Vec<ButtonAction> {
        match &self.keyboard {
            Keyboard::Inline(rows) => rows.iter().flatten().map(|b| b.action).collect(),
            _ => Vec::new(),
        }
    }
}
