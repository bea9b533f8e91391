//! Localized prompts and keyboards for every conversation step.

use crate::dialogue::ConversationState;
use crate::localization::{t_args_lang, t_lang};
use crate::models::{OrderDetails, Platform, Product, Rating, Season};

use super::reply::{ButtonAction, InlineButton, Keyboard, Reply};

fn tr_args(key: &str, args: &[(&str, String)], lang: Option<&str>) -> String {
    let borrowed: Vec<(&str, &str)> = args.iter().map(|(k, v)| (*k, v.as_str())).collect();
    t_args_lang(key, &borrowed, lang)
}

fn button(key: &str, action: ButtonAction, lang: Option<&str>) -> InlineButton {
    InlineButton::new(t_lang(key, lang), action)
}

fn platform_key(platform: Platform) -> &'static str {
    match platform {
        Platform::Wolt => "platform-wolt",
        Platform::Uzum => "platform-uzum",
        Platform::Yandex => "platform-yandex",
        Platform::Olx => "platform-olx",
        Platform::Other => "platform-other",
    }
}

pub fn platform_name(platform: Platform, lang: Option<&str>) -> String {
    t_lang(platform_key(platform), lang)
}

fn platform_rows(lang: Option<&str>) -> Vec<Vec<InlineButton>> {
    Platform::ALL
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|p| button(platform_key(*p), ButtonAction::Platform(*p), lang))
                .collect()
        })
        .collect()
}

pub fn welcome(lang: Option<&str>) -> Reply {
    Reply::text(t_lang("welcome", lang)).with_inline(platform_rows(lang))
}

pub fn platform_prompt(lang: Option<&str>) -> Reply {
    Reply::text(t_lang("platform-prompt", lang)).with_inline(platform_rows(lang))
}

pub fn start_button(lang: Option<&str>) -> Reply {
    Reply::text(t_lang("not-understood", lang))
        .with_inline(vec![vec![button("button-start", ButtonAction::StartAgain, lang)]])
}

pub fn order_input(platform: Platform, lang: Option<&str>) -> Reply {
    let text = format!(
        "{}\n\n{}",
        tr_args(
            "platform-selected",
            &[("platform", platform_name(platform, lang))],
            lang
        ),
        t_lang("order-input-prompt", lang)
    );
    Reply::text(text).with_inline(vec![vec![button(
        "button-upload-receipt",
        ButtonAction::UploadReceipt,
        lang,
    )]])
}

pub fn upload_receipt(lang: Option<&str>) -> Reply {
    Reply::text(t_lang("upload-receipt-prompt", lang)).with_inline(vec![vec![button(
        "button-cancel",
        ButtonAction::RetryOrder,
        lang,
    )]])
}

pub fn order_not_found(order_number: &str, lang: Option<&str>) -> Reply {
    Reply::text(tr_args(
        "order-not-found",
        &[("order_number", order_number.to_string())],
        lang,
    ))
    .with_inline(vec![vec![button(
        "button-upload-receipt",
        ButtonAction::UploadReceipt,
        lang,
    )]])
}

pub fn order_found(details: &OrderDetails, lang: Option<&str>) -> Reply {
    let product = &details.product;
    let text = format!(
        "{}\n\n{}",
        tr_args(
            "order-found",
            &[
                ("order_number", details.order.order_number.clone()),
                ("product", product.title.clone()),
                ("volume", product.volume.clone().unwrap_or_else(|| "-".to_string())),
                (
                    "concentration",
                    product.concentration.clone().unwrap_or_else(|| "-".to_string()),
                ),
            ],
            lang
        ),
        t_lang("share-contact-prompt", lang)
    );
    Reply::text(text).with_inline(contact_rows(lang))
}

fn contact_rows(lang: Option<&str>) -> Vec<Vec<InlineButton>> {
    vec![
        vec![
            button("button-share-contact", ButtonAction::ShareContact, lang),
            button("button-skip", ButtonAction::SkipContact, lang),
        ],
        vec![button("button-retry-order", ButtonAction::RetryOrder, lang)],
    ]
}

pub fn share_contact(lang: Option<&str>) -> Reply {
    Reply::text(t_lang("share-contact-prompt", lang)).with_inline(contact_rows(lang))
}

/// Reply keyboard that asks Telegram for the user's phone number
pub fn request_contact(text_key: &str, lang: Option<&str>) -> Reply {
    Reply::text(t_lang(text_key, lang)).with_keyboard(Keyboard::RequestContact {
        label: t_lang("button-send-contact", lang),
    })
}

pub fn main_menu_rows(lang: Option<&str>) -> Vec<Vec<InlineButton>> {
    vec![
        vec![
            button("menu-info", ButtonAction::MenuInfo, lang),
            button("menu-alternatives", ButtonAction::MenuAlternatives, lang),
        ],
        vec![
            button("menu-seasonal", ButtonAction::MenuSeasonal, lang),
            button("menu-review", ButtonAction::MenuReview, lang),
        ],
        vec![
            button("menu-support", ButtonAction::MenuSupport, lang),
            button("button-restart", ButtonAction::Restart, lang),
        ],
    ]
}

pub fn main_menu(lang: Option<&str>) -> Reply {
    Reply::text(t_lang("main-menu-prompt", lang)).with_inline(main_menu_rows(lang))
}

/// Body text followed by the main menu keyboard
pub fn with_menu(text: String, lang: Option<&str>) -> Reply {
    Reply::text(text).with_inline(main_menu_rows(lang))
}

pub fn order_unknown(lang: Option<&str>) -> Reply {
    Reply::text(t_lang("order-unknown", lang)).with_inline(vec![vec![
        button("button-restart", ButtonAction::Restart, lang),
        button("button-main-menu", ButtonAction::MainMenu, lang),
    ]])
}

pub fn product_info(product: &Product, lang: Option<&str>) -> String {
    let mut text = tr_args(
        "product-info",
        &[
            ("title", product.title.clone()),
            ("volume", product.volume.clone().unwrap_or_else(|| "-".to_string())),
            (
                "concentration",
                product.concentration.clone().unwrap_or_else(|| "-".to_string()),
            ),
            (
                "description",
                product
                    .description
                    .clone()
                    .unwrap_or_else(|| t_lang("no-description", lang)),
            ),
            (
                "instructions",
                product
                    .instructions
                    .clone()
                    .unwrap_or_else(|| t_lang("no-instructions", lang)),
            ),
        ],
        lang,
    );
    if let Some(price) = product.price {
        text.push('\n');
        text.push_str(&tr_args("product-price", &[("price", price.to_string())], lang));
    }
    text
}

fn product_line(product: &Product) -> String {
    match (&product.volume, &product.concentration) {
        (Some(volume), Some(concentration)) => {
            format!("• {} ({volume}, {concentration})", product.title)
        }
        (Some(detail), None) | (None, Some(detail)) => format!("• {} ({detail})", product.title),
        (None, None) => format!("• {}", product.title),
    }
}

pub fn alternatives(product: &Product, alternatives: &[Product], lang: Option<&str>) -> String {
    if alternatives.is_empty() {
        return t_lang("alternatives-empty", lang);
    }
    let mut text = tr_args("alternatives-title", &[("title", product.title.clone())], lang);
    for alternative in alternatives {
        text.push('\n');
        text.push_str(&product_line(alternative));
    }
    text
}

fn season_key(season: Season) -> &'static str {
    match season {
        Season::Summer => "season-summer",
        Season::AutumnWinter => "season-autumn-winter",
        Season::AllYear => "season-all-year",
    }
}

pub fn seasonal(season: Season, products: &[Product], lang: Option<&str>) -> String {
    if products.is_empty() {
        return t_lang("seasonal-empty", lang);
    }
    let mut text = tr_args(
        "seasonal-title",
        &[("season", t_lang(season_key(season), lang))],
        lang,
    );
    for product in products {
        text.push('\n');
        text.push_str(&product_line(product));
    }
    text
}

pub fn review_rating(lang: Option<&str>) -> Reply {
    let stars = (Rating::MIN..=Rating::MAX)
        .filter_map(Rating::new)
        .map(|rating| {
            InlineButton::new(
                format!("{} ⭐", rating.value()),
                ButtonAction::Rate(rating),
            )
        })
        .collect();
    Reply::text(t_lang("review-rating-prompt", lang)).with_inline(vec![
        stars,
        vec![button("button-back", ButtonAction::MainMenu, lang)],
    ])
}

pub fn review_text(rating: Rating, lang: Option<&str>) -> Reply {
    Reply::text(tr_args(
        "review-text-prompt",
        &[("rating", rating.to_string())],
        lang,
    ))
    .with_inline(vec![vec![button(
        "button-skip-comment",
        ButtonAction::SkipReviewText,
        lang,
    )]])
}

pub fn review_thanks(promo_code: &str, lang: Option<&str>) -> Reply {
    Reply::text(format!(
        "{}\n\n{}",
        t_lang("review-thanks", lang),
        tr_args("review-promo", &[("code", promo_code.to_string())], lang)
    ))
}

pub fn support_selection(lang: Option<&str>) -> Reply {
    Reply::text(t_lang("support-prompt", lang)).with_inline(vec![
        vec![button("support-call", ButtonAction::SupportCall, lang)],
        vec![button("support-chat", ButtonAction::SupportChat, lang)],
        vec![button("support-email", ButtonAction::SupportEmail, lang)],
        vec![button("button-back", ButtonAction::MainMenu, lang)],
    ])
}

pub fn support_call(lang: Option<&str>) -> Reply {
    request_contact("support-call-prompt", lang)
}

pub fn support_email(lang: Option<&str>) -> Reply {
    Reply::text(t_lang("support-email-prompt", lang))
        .with_inline(vec![vec![button("button-back", ButtonAction::MainMenu, lang)]])
}

pub fn support_call_confirmed(phone: &str, lang: Option<&str>) -> Reply {
    Reply::text(tr_args(
        "support-call-confirmed",
        &[("phone", phone.to_string())],
        lang,
    ))
    .with_keyboard(Keyboard::Remove)
}

pub fn failure(lang: Option<&str>) -> Reply {
    Reply::text(t_lang("error-generic", lang)).with_inline(vec![vec![
        button("button-retry", ButtonAction::Retry, lang),
        button("button-restart", ButtonAction::Restart, lang),
    ]])
}

/// The prompt that asks for the input the given state waits for
pub fn for_state(state: &ConversationState, lang: Option<&str>) -> Reply {
    match state {
        ConversationState::Start => start_button(lang),
        ConversationState::PlatformSelection => platform_prompt(lang),
        ConversationState::OrderInput { platform } => order_input(*platform, lang),
        ConversationState::OrderFound { .. } => share_contact(lang),
        ConversationState::MainMenu { .. } => main_menu(lang),
        ConversationState::ReviewRating { .. } => review_rating(lang),
        ConversationState::ReviewText { rating, .. } => review_text(*rating, lang),
        ConversationState::SupportSelection { .. } => support_selection(lang),
        ConversationState::SupportCall { .. } => support_call(lang),
        ConversationState::SupportEmail { .. } => support_email(lang),
    }
}
