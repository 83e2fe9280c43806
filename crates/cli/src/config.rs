//! Configuration loading from conduit.toml.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use runtime::providers::defaults;
use runtime::{AnthropicAuth, AnthropicBackend, OllamaBackend, Provider, SessionConfig};
use serde::Deserialize;

/// Looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE: &str = "conduit.toml";

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub session: SessionSection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    Anthropic,
}

/// Model backend configuration.
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    /// Model name; the provider's default when unset.
    pub model: Option<String>,

    /// Endpoint root, e.g. `http://localhost:11434`.
    pub base_url: Option<String>,

    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    /// Standard Anthropic API key (sk-ant-api01-...).
    /// Mutually exclusive with oauth_token.
    pub api_key: Option<String>,

    /// Anthropic OAuth token (sk-ant-oat-...).
    /// Mutually exclusive with api_key.
    pub oauth_token: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            base_url: None,
            timeout_secs: default_model_timeout(),
            api_key: None,
            oauth_token: None,
        }
    }
}

/// The capability server, spawned as a child process.
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_server_name")]
    pub name: String,

    #[serde(default = "default_server_command")]
    pub command: String,

    #[serde(default = "default_server_args")]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "default_server_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            command: default_server_command(),
            args: default_server_args(),
            env: HashMap::new(),
            timeout_secs: default_server_timeout(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionSection {
    /// System prompt placed at the start of every conversation.
    pub system: Option<String>,

    /// Scheme for resources whose listing carries no URI.
    pub resource_scheme: Option<String>,
}

fn default_model_timeout() -> u64 {
    runtime::providers::DEFAULT_TIMEOUT.as_secs()
}

fn default_server_name() -> String {
    "capabilities".to_string()
}

fn default_server_command() -> String {
    "node".to_string()
}

fn default_server_args() -> Vec<String> {
    vec!["../server/dist/server.js".to_string()]
}

fn default_server_timeout() -> u64 {
    mcp::DEFAULT_TIMEOUT.as_secs()
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

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// An explicit path must exist; otherwise `conduit.toml` is used if
    /// present, and defaults if not.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Apply environment overrides.
    ///
    /// `OLLAMA_API_URL` and `OLLAMA_MODEL` apply to the ollama provider,
    /// `ANTHROPIC_API_KEY` to anthropic when no credential is configured,
    /// and `CONDUIT_MODEL` to either, taking precedence.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let backend = &mut self.backend;
        match backend.provider {
            ProviderKind::Ollama => {
                if let Some(url) = var("OLLAMA_API_URL") {
                    backend.base_url = Some(url);
                }
                if let Some(model) = var("OLLAMA_MODEL") {
                    backend.model = Some(model);
                }
            }
            ProviderKind::Anthropic => {
                if backend.api_key.is_none() && backend.oauth_token.is_none() {
                    backend.api_key = var("ANTHROPIC_API_KEY");
                }
            }
        }
        if let Some(model) = var("CONDUIT_MODEL") {
            backend.model = Some(model);
        }
    }

    pub fn model(&self) -> &str {
        match (&self.backend.model, self.backend.provider) {
            (Some(model), _) => model,
            (None, ProviderKind::Ollama) => defaults::OLLAMA_MODEL,
            (None, ProviderKind::Anthropic) => DEFAULT_ANTHROPIC_MODEL,
        }
    }

    /// Build the authentication from config.
    ///
    /// Requires exactly one of api_key or oauth_token to be set.
    pub fn auth(&self) -> Result<AnthropicAuth, ConfigError> {
        match (&self.backend.api_key, &self.backend.oauth_token) {
            (Some(key), None) => Ok(AnthropicAuth::ApiKey(key.clone())),
            (None, Some(token)) => Ok(AnthropicAuth::ClaudeCodeOauth(token.clone())),
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousAuth),
            (None, None) => Err(ConfigError::MissingAuth),
        }
    }

    pub fn backend(&self) -> Result<Provider, ConfigError> {
        let timeout = Duration::from_secs(self.backend.timeout_secs);
        let provider: Provider = match self.backend.provider {
            ProviderKind::Ollama => {
                let base_url = self
                    .backend
                    .base_url
                    .as_deref()
                    .unwrap_or(defaults::OLLAMA_BASE_URL);
                OllamaBackend::builder(base_url, self.model())
                    .timeout(timeout)
                    .build()
                    .into()
            }
            ProviderKind::Anthropic => {
                let mut builder = AnthropicBackend::builder(self.auth()?, self.model()).timeout(timeout);
                if let Some(base_url) = &self.backend.base_url {
                    builder = builder.base_url(base_url);
                }
                builder.build().into()
            }
        };
        Ok(provider)
    }

    pub fn server(&self) -> mcp::ServerConfig {
        let section = &self.server;
        let mut config = mcp::ServerConfig::new(&section.name, &section.command)
            .args(section.args.iter().cloned());
        config.env = section.env.clone();
        config.timeout = Duration::from_secs(section.timeout_secs);
        config
    }

    pub fn session(&self) -> SessionConfig {
        let mut config = SessionConfig {
            system: self.session.system.clone(),
            ..SessionConfig::default()
        };
        if let Some(scheme) = &self.session.resource_scheme {
            config.resource_scheme = scheme.clone();
        }
        config
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("authentication not configured: set backend.api_key or backend.oauth_token")]
    MissingAuth,

    #[error(
        "ambiguous authentication: set either backend.api_key OR backend.oauth_token, not both"
    )]
    AmbiguousAuth,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let pairs: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| pairs.get(key).cloned()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.backend.provider, ProviderKind::Ollama);
        assert_eq!(config.model(), "llama3.1");
        assert_eq!(config.backend.timeout_secs, 120);
        assert_eq!(config.server.command, "node");
        assert_eq!(config.server.timeout_secs, 15);
        assert_eq!(config.session().resource_scheme, "knowledge://");
    }

    #[test]
    fn parses_full_file() {
        let config = Config::parse(
            r#"
            [backend]
            provider = "anthropic"
            model = "claude-test"
            api_key = "sk-ant-api01-x"
            timeout_secs = 30

            [server]
            command = "python"
            args = ["server.py", "--stdio"]
            timeout_secs = 5

            [server.env]
            KNOWLEDGE_URL = "http://localhost:8080"

            [session]
            system = "Be brief."
            resource_scheme = "notes://"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.provider, ProviderKind::Anthropic);
        assert_eq!(config.model(), "claude-test");
        assert!(matches!(config.auth(), Ok(AnthropicAuth::ApiKey(_))));

        let server = config.server();
        assert_eq!(server.command, "python");
        assert_eq!(server.args, ["server.py", "--stdio"]);
        assert_eq!(server.timeout, Duration::from_secs(5));
        assert_eq!(server.env["KNOWLEDGE_URL"], "http://localhost:8080");

        let session = config.session();
        assert_eq!(session.system.as_deref(), Some("Be brief."));
        assert_eq!(session.resource_scheme, "notes://");
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(matches!(
            Config::parse("[backend]\nprovider = \"gpt\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn ollama_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("OLLAMA_API_URL", "http://gpu-box:11434"),
            ("OLLAMA_MODEL", "qwen2.5"),
            ("ANTHROPIC_API_KEY", "ignored"),
        ]));
        assert_eq!(config.backend.base_url.as_deref(), Some("http://gpu-box:11434"));
        assert_eq!(config.model(), "qwen2.5");
        assert!(config.backend.api_key.is_none());

        config.apply_env(env(&[("CONDUIT_MODEL", "mistral")]));
        assert_eq!(config.model(), "mistral");
    }

    #[test]
    fn anthropic_key_from_env_only_when_unset() {
        let mut config = Config::parse("[backend]\nprovider = \"anthropic\"").unwrap();
        config.apply_env(env(&[("ANTHROPIC_API_KEY", "from-env")]));
        assert!(matches!(config.auth(), Ok(AnthropicAuth::ApiKey(k)) if k == "from-env"));

        let mut config =
            Config::parse("[backend]\nprovider = \"anthropic\"\noauth_token = \"tok\"").unwrap();
        config.apply_env(env(&[("ANTHROPIC_API_KEY", "from-env")]));
        assert!(matches!(config.auth(), Ok(AnthropicAuth::ClaudeCodeOauth(_))));
    }

    #[test]
    fn auth_must_be_unambiguous() {
        let mut config = Config::default();
        assert!(matches!(config.auth(), Err(ConfigError::MissingAuth)));
        config.backend.api_key = Some("a".into());
        config.backend.oauth_token = Some("b".into());
        assert!(matches!(config.auth(), Err(ConfigError::AmbiguousAuth)));
    }

    #[test]
    fn anthropic_backend_needs_credentials() {
        let config = Config::parse("[backend]\nprovider = \"anthropic\"").unwrap();
        assert!(matches!(config.backend(), Err(ConfigError::MissingAuth)));
        assert!(matches!(Config::default().backend(), Ok(Provider::Ollama(_))));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Config::discover(Some(Path::new("/nonexistent/conduit.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/conduit.toml"));
    }
}
