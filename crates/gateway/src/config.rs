//! Configuration loading from gateway.toml.

use mcp::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use runtime::providers::DEFAULT_LLM_TIMEOUT;
use runtime::{EnvSource, OrchestratorSettings};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when none is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = "gateway.toml";

/// Setting that overrides `tool_host.url`.
pub const TOOL_HOST_URL_SETTING: &str = "MCP_SERVER_URL";

pub const DEFAULT_TOOL_HOST_URL: &str = "http://127.0.0.1:3333/sse";

/// Top-level configuration. Every section is optional.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub tool_host: ToolHostConfig,
    pub llm: LlmConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP API listens on.
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ToolHostConfig {
    /// SSE endpoint of the tool host.
    pub url: String,
    /// Bound on connect plus handshake.
    pub connect_timeout_secs: u64,
    /// Bound on each request once connected.
    pub request_timeout_secs: u64,
}

impl Default for ToolHostConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_TOOL_HOST_URL.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Client-side timeout for each completion call.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_LLM_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Model calls per chat turn; 1 returns tool results to the caller.
    pub max_tool_rounds: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { max_tool_rounds: 1 }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides.
    pub fn apply_env(mut self, env: &impl EnvSource) -> Self {
        if let Some(url) = env
            .var(TOOL_HOST_URL_SETTING)
            .filter(|url| !url.trim().is_empty())
        {
            self.tool_host.url = url;
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tool_host.url.trim().is_empty() {
            return Err(ConfigError::Invalid("tool_host.url must not be empty".into()));
        }
        if self.tool_host.connect_timeout_secs == 0 || self.tool_host.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "tool_host timeouts must be at least 1 second".into(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "llm.timeout_secs must be at least 1 second".into(),
            ));
        }
        if self.chat.max_tool_rounds == 0 {
            return Err(ConfigError::Invalid(
                "chat.max_tool_rounds must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_host.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_host.request_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            connect_timeout: self.connect_timeout(),
            max_tool_rounds: self.chat.max_tool_rounds,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::MapEnv;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.bind.to_string(), "127.0.0.1:8000");
        assert_eq!(config.tool_host.url, "http://127.0.0.1:3333/sse");
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.llm_timeout(), Duration::from_secs(60));
        assert_eq!(config.orchestrator_settings().max_tool_rounds, 1);
    }

    #[test]
    fn parse_full_config() {
        let config = Config::parse(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [tool_host]
            url = "http://tools.internal:3333/sse"
            connect_timeout_secs = 3
            request_timeout_secs = 15

            [llm]
            timeout_secs = 120

            [chat]
            max_tool_rounds = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind.port(), 9000);
        assert_eq!(config.tool_host.url, "http://tools.internal:3333/sse");
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.llm_timeout(), Duration::from_secs(120));
        assert_eq!(
            config.orchestrator_settings(),
            OrchestratorSettings {
                connect_timeout: Duration::from_secs(3),
                max_tool_rounds: 4,
            }
        );
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse("[tool_host]\nconnect_timeout_secs = 2\n").unwrap();
        assert_eq!(config.tool_host.url, DEFAULT_TOOL_HOST_URL);
        assert_eq!(config.tool_host.request_timeout_secs, 30);
    }

    #[test]
    fn rejects_zero_rounds_and_timeouts() {
        assert!(matches!(
            Config::parse("[chat]\nmax_tool_rounds = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[llm]\ntimeout_secs = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_bad_bind_address() {
        assert!(matches!(
            Config::parse("[server]\nbind = \"not an address\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_tool_host_url() {
        let env = MapEnv::new().with(TOOL_HOST_URL_SETTING, "http://10.0.0.5:3333/sse");
        let config = Config::default().apply_env(&env);
        assert_eq!(config.tool_host.url, "http://10.0.0.5:3333/sse");

        let config = Config::default().apply_env(&MapEnv::new().with(TOOL_HOST_URL_SETTING, ""));
        assert_eq!(config.tool_host.url, DEFAULT_TOOL_HOST_URL);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("gateway.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(matches!(
            Config::load(dir.path().join("gateway.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[chat]\nmax_tool_rounds = 2").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.chat.max_tool_rounds, 2);
    }
}
