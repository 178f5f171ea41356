//! LLM provider registry.
//!
//! Every supported provider speaks the same OpenAI-compatible wire shape and
//! differs only in credentials, endpoint and default model.

mod openai;

pub use openai::{DEFAULT_LLM_TIMEOUT, OpenAiCompatClient, OpenAiCompatConfig};

use crate::error::ConfigError;
use std::str::FromStr;

/// Setting that selects the active provider.
pub const PROVIDER_SETTING: &str = "LLM_PROVIDER";

/// Models offered when no provider can be resolved.
pub const FALLBACK_MODELS: &[&str] = &["gpt-4o-mini", "gpt-4o", "gpt-3.5-turbo"];

/// A supported LLM provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Provider {
    #[default]
    OpenAi,
    DeepSeek,
    Kimi,
}

/// Static connection profile of a provider.
#[derive(Debug)]
pub struct ProviderProfile {
    /// Identifier used in `LLM_PROVIDER`.
    pub id: &'static str,
    /// Setting holding the API key.
    pub api_key_setting: &'static str,
    /// Setting holding the base URL.
    pub base_url_setting: &'static str,
    /// Setting overriding the default model.
    pub model_setting: &'static str,
    /// Base URL used when the setting is absent; `None` makes it required.
    pub default_base_url: Option<&'static str>,
    pub default_model: &'static str,
    /// Curated list of models known to work with this provider.
    pub models: &'static [&'static str],
}

static OPENAI: ProviderProfile = ProviderProfile {
    id: "openai",
    api_key_setting: "OPENAI_API_KEY",
    base_url_setting: "OPENAI_BASE_URL",
    model_setting: "OPENAI_MODEL",
    default_base_url: Some("https://api.openai.com/v1"),
    default_model: "gpt-4o-mini",
    models: &["gpt-4o", "gpt-4o-mini", "gpt-3.5-turbo"],
};

static DEEPSEEK: ProviderProfile = ProviderProfile {
    id: "deepseek",
    api_key_setting: "DEEPSEEK_API_KEY",
    base_url_setting: "DEEPSEEK_BASE_URL",
    model_setting: "DEEPSEEK_MODEL",
    default_base_url: None,
    default_model: "deepseek-chat",
    models: &["deepseek-chat", "deepseek-coder"],
};

static KIMI: ProviderProfile = ProviderProfile {
    id: "kimi",
    api_key_setting: "KIMI_API_KEY",
    base_url_setting: "KIMI_BASE_URL",
    model_setting: "KIMI_MODEL",
    default_base_url: None,
    default_model: "kimi-chat",
    models: &["moonshot-v1-8k", "moonshot-v1-32k"],
};

impl Provider {
    pub const ALL: [Provider; 3] = [Self::OpenAi, Self::DeepSeek, Self::Kimi];

    pub fn profile(self) -> &'static ProviderProfile {
        match self {
            Self::OpenAi => &OPENAI,
            Self::DeepSeek => &DEEPSEEK,
            Self::Kimi => &KIMI,
        }
    }

    pub fn id(self) -> &'static str {
        self.profile().id
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            "kimi" => Ok(Self::Kimi),
            _ => Err(ConfigError::UnsupportedProvider(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_folded() {
        assert_eq!("OpenAI".parse::<Provider>(), Ok(Provider::OpenAi));
        assert_eq!(" DeepSeek ".parse::<Provider>(), Ok(Provider::DeepSeek));
        assert_eq!("KIMI".parse::<Provider>(), Ok(Provider::Kimi));
    }

    #[test]
    fn unknown_provider_names_the_value() {
        let err = "anthropic".parse::<Provider>().unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedProvider("anthropic".into()));
        assert!(err.to_string().contains("anthropic"));
    }

    #[test]
    fn only_openai_has_a_default_base_url() {
        for provider in Provider::ALL {
            let profile = provider.profile();
            assert_eq!(
                profile.default_base_url.is_some(),
                provider == Provider::OpenAi
            );
            assert!(profile.api_key_setting.starts_with(&profile.id.to_uppercase()));
        }
    }

    #[test]
    fn ids_round_trip() {
        for provider in Provider::ALL {
            assert_eq!(provider.id().parse::<Provider>(), Ok(provider));
        }
    }
}
