//! Language registry: the fixed set of languages the relay can translate into.
//!
//! The table is immutable and initialized once with `OnceLock`; any code
//! outside it is treated as "no translation" by the adapter.

use std::sync::OnceLock;

/// Metadata for one supported language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Code as stored on user profiles (e.g., "en", "zh-cn")
    pub code: &'static str,

    /// English name of the language, used in translation prompts
    pub name: &'static str,

    /// Native name of the language (e.g., "Español", "日本語")
    pub native_name: &'static str,

    /// Code expected by Google's translate endpoint (e.g., "zh-CN")
    pub google_code: &'static str,

    /// Whether this is the profile default for new users (only one should be true)
    pub is_default: bool,
}

pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
}

static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: supported_languages(),
        })
    }

    /// Look up a language by profile code. Matching ignores ASCII case and
    /// surrounding whitespace, so "zh-CN" resolves to "zh-cn".
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        let code = code.trim();
        self.languages
            .iter()
            .find(|lang| lang.code.eq_ignore_ascii_case(code))
    }

    pub fn list_all(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().collect()
    }

    /// The language assigned to profiles that never chose one.
    ///
    /// # Panics
    /// Panics if the table does not contain exactly one default entry.
    pub fn default_language(&self) -> &LanguageConfig {
        let defaults: Vec<_> = self.languages.iter().filter(|l| l.is_default).collect();

        match defaults.len() {
            0 => panic!("No default language found in registry"),
            1 => defaults[0],
            _ => panic!("Multiple default languages found in registry"),
        }
    }

    pub fn is_supported(&self, code: &str) -> bool {
        self.get_by_code(code).is_some()
    }
}

fn supported_languages() -> Vec<LanguageConfig> {
    vec![
        LanguageConfig {
            code: "en",
            name: "English",
            native_name: "English",
            google_code: "en",
            is_default: true,
        },
        LanguageConfig {
            code: "es",
            name: "Spanish",
            native_name: "Español",
            google_code: "es",
            is_default: false,
        },
        LanguageConfig {
            code: "fr",
            name: "French",
            native_name: "Français",
            google_code: "fr",
            is_default: false,
        },
        LanguageConfig {
            code: "de",
            name: "German",
            native_name: "Deutsch",
            google_code: "de",
            is_default: false,
        },
        LanguageConfig {
            code: "ja",
            name: "Japanese",
            native_name: "日本語",
            google_code: "ja",
            is_default: false,
        },
        LanguageConfig {
            code: "zh-cn",
            name: "Simplified Chinese",
            native_name: "简体中文",
            google_code: "zh-CN",
            is_default: false,
        },
        LanguageConfig {
            code: "zh-tw",
            name: "Traditional Chinese",
            native_name: "繁體中文",
            google_code: "zh-TW",
            is_default: false,
        },
        LanguageConfig {
            code: "it",
            name: "Italian",
            native_name: "Italiano",
            google_code: "it",
            is_default: false,
        },
        LanguageConfig {
            code: "pt",
            name: "Portuguese",
            native_name: "Português",
            google_code: "pt",
            is_default: false,
        },
    ]
}
