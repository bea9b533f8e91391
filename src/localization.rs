use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{error, warn};
use unic_langid::LanguageIdentifier;

const DEFAULT_LANGUAGE: &str = "en";

/// Fluent resources compiled into the binary, keyed by primary language
const RESOURCES: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en/main.ftl")),
    ("ru", include_str!("../locales/ru/main.ftl")),
];

/// Localization manager for the support bot
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a new localization manager with every embedded language
    pub fn new() -> Self {
        let mut bundles = HashMap::new();

        for (language, source) in RESOURCES {
            match Self::create_bundle(language, source) {
                Some(bundle) => {
                    bundles.insert(language.to_string(), bundle);
                }
                None => error!(language, "Failed to load localization bundle"),
            }
        }

        Self { bundles }
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(language: &str, source: &str) -> Option<FluentBundle<FluentResource>> {
        let locale: LanguageIdentifier = language.parse().ok()?;
        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        bundle.set_use_isolating(false);

        let resource = match FluentResource::try_new(source.to_string()) {
            Ok(resource) => resource,
            Err((resource, errors)) => {
                warn!(language, errors = ?errors, "Localization resource has parse errors");
                resource
            }
        };

        if let Err(errors) = bundle.add_resource(resource) {
            warn!(language, errors = ?errors, "Localization resource has conflicting keys");
        }

        Some(bundle)
    }

    /// Primary language subtag we have a bundle for, falling back to English
    pub fn resolve_language<'a>(&self, language_code: Option<&'a str>) -> &'a str {
        language_code
            .and_then(|code| code.split(['-', '_']).next())
            .filter(|primary| self.bundles.contains_key(&primary.to_ascii_lowercase()))
            .unwrap_or(DEFAULT_LANGUAGE)
    }

    pub fn supports(&self, language: &str) -> bool {
        self.bundles.contains_key(language)
    }

    /// Get a localized message
    pub fn get_message(
        &self,
        key: &str,
        args: Option<&FluentArgs>,
        language_code: Option<&str>,
    ) -> String {
        let language = self.resolve_language(language_code).to_ascii_lowercase();

        let message = [language.as_str(), DEFAULT_LANGUAGE]
            .iter()
            .filter_map(|lang| self.bundles.get(*lang))
            .find_map(|bundle| bundle.get_message(key).map(|msg| (bundle, msg)));

        let Some((bundle, msg)) = message else {
            return format!("Missing translation: {key}");
        };

        let Some(pattern) = msg.value() else {
            return format!("Missing value for key: {key}");
        };

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, args, &mut errors);
        if !errors.is_empty() {
            warn!(key, errors = ?errors, "Localization formatting errors");
        }
        value.into_owned()
    }

    /// Get a localized message with simple string arguments
    pub fn get_message_with_args(
        &self,
        key: &str,
        args: &[(&str, &str)],
        language_code: Option<&str>,
    ) -> String {
        let mut fluent_args = FluentArgs::new();
        for (name, value) in args {
            fluent_args.set(*name, FluentValue::from(*value));
        }
        self.get_message(key, Some(&fluent_args), language_code)
    }
}

impl Default for LocalizationManager {
    fn default() -> Self {
        Self::new()
    }
}

static LOCALIZATION_MANAGER: LazyLock<LocalizationManager> = LazyLock::new(LocalizationManager::new);

/// Load the embedded bundles eagerly so parse warnings show up at startup
pub fn init_localization() {
    LazyLock::force(&LOCALIZATION_MANAGER);
}

/// Get the global localization manager
pub fn get_localization_manager() -> &'static LocalizationManager {
    &LOCALIZATION_MANAGER
}

/// Convenience function to get a localized message in English
pub fn t(key: &str) -> String {
    t_lang(key, None)
}

/// Localized message in the user's language
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    get_localization_manager().get_message(key, None, language_code)
}

/// Localized message with arguments in the user's language
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    get_localization_manager().get_message_with_args(key, args, language_code)
}
