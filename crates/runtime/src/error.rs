use crate::llm::ModelError;
use thiserror::Error;

/// Operator misconfiguration. Never carries credential values, only the
/// names of the settings involved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported LLM_PROVIDER: {0}")]
    UnsupportedProvider(String),

    #[error("{provider} provider is not configured: missing {}", .keys.join(", "))]
    MissingCredentials {
        provider: &'static str,
        keys: Vec<&'static str>,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("tool host error: {0}")]
    ToolHost(#[from] mcp::Error),
}

impl Error {
    /// Whether the caller sent something we reject outright.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_names_every_key() {
        let err = ConfigError::MissingCredentials {
            provider: "deepseek",
            keys: vec!["DEEPSEEK_API_KEY", "DEEPSEEK_BASE_URL"],
        };
        assert_eq!(
            err.to_string(),
            "deepseek provider is not configured: missing DEEPSEEK_API_KEY, DEEPSEEK_BASE_URL"
        );
    }

    #[test]
    fn only_invalid_requests_are_client_errors() {
        assert!(Error::InvalidRequest("empty message".into()).is_client_error());
        assert!(!Error::from(ConfigError::UnsupportedProvider("x".into())).is_client_error());
        assert!(!Error::from(mcp::Error::Disconnected).is_client_error());
    }
}
