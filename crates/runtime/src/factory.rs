//! LLM client construction from resolved settings.

use crate::credentials::{CredentialResolver, EnvSource, ProcessEnv};
use crate::error::ConfigError;
use crate::llm::Backend;
use crate::providers::{
    DEFAULT_LLM_TIMEOUT, OpenAiCompatClient, OpenAiCompatConfig, PROVIDER_SETTING, Provider,
};
use std::time::Duration;
use tracing::debug;

/// Produces a chat client for the active provider.
pub trait ClientFactory: Send + Sync {
    type Client: Backend;

    /// The provider selected by configuration.
    fn provider(&self) -> Result<Provider, ConfigError>;

    /// Build a client and its default model. No network traffic.
    fn build(&self, provider: Provider) -> Result<(Self::Client, String), ConfigError>;
}

/// Provider, client and effective model for one request.
#[derive(Debug)]
pub struct ResolvedInvocation<C> {
    pub provider: Provider,
    pub client: C,
    pub model: String,
}

/// Resolve the active provider and build its client.
///
/// A non-empty `model_override` replaces the provider default as given,
/// without checking it against the provider's model list.
pub fn resolve_invocation<F: ClientFactory>(
    factory: &F,
    model_override: Option<&str>,
) -> Result<ResolvedInvocation<F::Client>, ConfigError> {
    let provider = factory.provider()?;
    let (client, default_model) = factory.build(provider)?;
    let model = match model_override.filter(|m| !m.trim().is_empty()) {
        Some(model) => model.to_string(),
        None => default_model,
    };
    Ok(ResolvedInvocation {
        provider,
        client,
        model,
    })
}

/// Factory backed by environment-style settings and the local key file.
pub struct EnvClientFactory<E = ProcessEnv> {
    resolver: CredentialResolver<E>,
    http: reqwest::Client,
    timeout: Duration,
}

impl EnvClientFactory<ProcessEnv> {
    /// Factory over the process environment.
    pub fn from_process_env() -> Self {
        Self::new(CredentialResolver::from_env(ProcessEnv))
    }
}

impl<E: EnvSource> EnvClientFactory<E> {
    pub fn new(resolver: CredentialResolver<E>) -> Self {
        Self {
            resolver,
            http: reqwest::Client::new(),
            timeout: DEFAULT_LLM_TIMEOUT,
        }
    }

    /// Client-side timeout for each completion call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn setting(&self, name: &str) -> Option<String> {
        self.resolver
            .resolve(name)
            .filter(|value| !value.trim().is_empty())
    }
}

impl<E: EnvSource> ClientFactory for EnvClientFactory<E> {
    type Client = OpenAiCompatClient;

    fn provider(&self) -> Result<Provider, ConfigError> {
        match self.resolver.env().var(PROVIDER_SETTING) {
            Some(value) => value.parse(),
            None => Ok(Provider::default()),
        }
    }

    fn build(&self, provider: Provider) -> Result<(Self::Client, String), ConfigError> {
        let profile = provider.profile();

        let api_key = self.setting(profile.api_key_setting);
        let base_url = self
            .setting(profile.base_url_setting)
            .or_else(|| profile.default_base_url.map(str::to_string));

        let (api_key, base_url) = match (api_key, base_url) {
            (Some(api_key), Some(base_url)) => (api_key, base_url),
            (api_key, base_url) => {
                let mut keys = Vec::new();
                if api_key.is_none() {
                    keys.push(profile.api_key_setting);
                }
                if base_url.is_none() {
                    keys.push(profile.base_url_setting);
                }
                return Err(ConfigError::MissingCredentials {
                    provider: profile.id,
                    keys,
                });
            }
        };

        let model = self
            .setting(profile.model_setting)
            .unwrap_or_else(|| profile.default_model.to_string());

        debug!(provider = profile.id, %base_url, %model, "built llm client");
        let client = OpenAiCompatClient::with_http(
            self.http.clone(),
            OpenAiCompatConfig {
                api_key,
                base_url,
                timeout: self.timeout,
            },
        );
        Ok((client, model))
    }
}

impl<E> std::fmt::Debug for EnvClientFactory<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvClientFactory")
            .field("resolver", &self.resolver)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{KeyStore, MapEnv};

    fn factory(env: MapEnv) -> EnvClientFactory<MapEnv> {
        let dir = std::env::temp_dir().join("club-gateway-no-such-dir");
        EnvClientFactory::new(CredentialResolver::new(
            env,
            KeyStore::new(dir.join("keys.json")),
        ))
    }

    #[test]
    fn defaults_to_openai() {
        let factory = factory(MapEnv::new().with("OPENAI_API_KEY", "sk-test"));
        let resolved = resolve_invocation(&factory, None).unwrap();
        assert_eq!(resolved.provider, Provider::OpenAi);
        assert_eq!(resolved.model, "gpt-4o-mini");
        assert_eq!(resolved.client.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn provider_setting_is_case_folded() {
        let factory = factory(
            MapEnv::new()
                .with("LLM_PROVIDER", "DeepSeek")
                .with("DEEPSEEK_API_KEY", "sk-ds")
                .with("DEEPSEEK_BASE_URL", "https://api.deepseek.com"),
        );
        let resolved = resolve_invocation(&factory, None).unwrap();
        assert_eq!(resolved.provider, Provider::DeepSeek);
        assert_eq!(resolved.model, "deepseek-chat");
        assert_eq!(resolved.client.base_url(), "https://api.deepseek.com");
    }

    #[test]
    fn unsupported_provider_is_named() {
        let factory = factory(MapEnv::new().with("LLM_PROVIDER", "bogus"));
        let err = resolve_invocation(&factory, None).unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedProvider("bogus".into()));
    }

    #[test]
    fn missing_credentials_name_every_key() {
        let factory = factory(MapEnv::new().with("LLM_PROVIDER", "kimi"));
        let err = resolve_invocation(&factory, None).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingCredentials {
                provider: "kimi",
                keys: vec!["KIMI_API_KEY", "KIMI_BASE_URL"],
            }
        );
    }

    #[test]
    fn empty_values_count_as_missing() {
        let factory = factory(
            MapEnv::new()
                .with("LLM_PROVIDER", "deepseek")
                .with("DEEPSEEK_API_KEY", "sk-ds")
                .with("DEEPSEEK_BASE_URL", ""),
        );
        let err = resolve_invocation(&factory, None).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingCredentials {
                provider: "deepseek",
                keys: vec!["DEEPSEEK_BASE_URL"],
            }
        );
    }

    #[test]
    fn errors_never_contain_secret_values() {
        let factory = factory(
            MapEnv::new()
                .with("LLM_PROVIDER", "deepseek")
                .with("DEEPSEEK_API_KEY", "sk-very-secret"),
        );
        let err = resolve_invocation(&factory, None).unwrap_err();
        assert!(!err.to_string().contains("sk-very-secret"));
    }

    #[test]
    fn model_setting_and_override() {
        let factory = factory(
            MapEnv::new()
                .with("OPENAI_API_KEY", "sk-test")
                .with("OPENAI_MODEL", "gpt-4o"),
        );
        assert_eq!(resolve_invocation(&factory, None).unwrap().model, "gpt-4o");
        assert_eq!(
            resolve_invocation(&factory, Some("my-finetune:v2"))
                .unwrap()
                .model,
            "my-finetune:v2"
        );
        assert_eq!(resolve_invocation(&factory, Some("")).unwrap().model, "gpt-4o");
    }
}
