//! Configuration management for the Flowrun engine
//!
//! Handles server configuration, engine limits, OAuth client settings and
//! integration endpoints. `Config::from_env()` is called once at process start;
//! everything downstream receives the resulting value by reference.

use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

/// Default OAuth token endpoint used for refresh exchanges
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Scheduler limits
    pub engine: EngineConfig,
    /// OAuth client settings used by the credential resolver
    pub credentials: CredentialsConfig,
    /// Endpoints and defaults for the built-in integration handlers
    pub integrations: IntegrationsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Limits applied to every workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on node dispatches running at the same time within one run
    pub max_concurrent_nodes: usize,
    /// Deadline for a single node (credential resolution + handler), if any
    pub node_timeout_secs: Option<u64>,
}

impl EngineConfig {
    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_secs.map(Duration::from_secs)
    }
}

/// When the resolver attempts a refresh exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Refresh before every dispatch that carries a refresh token
    #[default]
    Always,
    /// Refresh only when the stored access token is expired or has no expiry
    WhenExpired,
}

impl FromStr for RefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "when_expired" | "when-expired" => Ok(Self::WhenExpired),
            other => Err(format!("unknown refresh policy: {}", other)),
        }
    }
}

/// OAuth client registration used for token refresh
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Token endpoint accepting `grant_type=refresh_token`
    pub token_endpoint: String,
    /// Client id used when a credential does not carry its own
    pub client_id: Option<String>,
    /// Registered client secret; refresh is skipped without it
    pub client_secret: Option<String>,
    pub refresh_policy: RefreshPolicy,
    /// Deadline for one refresh exchange; an expired deadline counts as a failed refresh
    pub refresh_timeout_ms: u64,
}

impl CredentialsConfig {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_policy", &self.refresh_policy)
            .field("refresh_timeout_ms", &self.refresh_timeout_ms)
            .finish()
    }
}

/// Built-in integration handler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    /// Gmail REST base URL, used when a credential does not name one
    pub gmail_base_url: String,
    /// Maximum number of message details fetched per gmail node
    pub gmail_max_messages: usize,
    /// OpenAI-compatible API base URL
    pub openai_base_url: String,
    pub llm_default_model: String,
    pub llm_temperature: f64,
    /// Request timeout of the HTTP client shared by all handlers
    pub http_timeout_secs: u64,
}

impl IntegrationsConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3004,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_nodes: 16,
            node_timeout_secs: None,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
            client_id: None,
            client_secret: None,
            refresh_policy: RefreshPolicy::Always,
            refresh_timeout_ms: 10_000,
        }
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            gmail_base_url: "https://gmail.googleapis.com/gmail/v1".to_string(),
            gmail_max_messages: 10,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            llm_default_model: "gpt-4o".to_string(),
            llm_temperature: 0.3,
            http_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Build configuration from ENV_VARs for k8s/container deployment
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("FLOWRUN_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env_parse("FLOWRUN_PORT") {
            config.server.port = port;
        }

        if let Some(max) = env_parse::<usize>("FLOWRUN_MAX_CONCURRENT_NODES") {
            config.engine.max_concurrent_nodes = max.max(1);
        }
        config.engine.node_timeout_secs = env_parse("FLOWRUN_NODE_TIMEOUT_SECS");

        if let Ok(endpoint) = std::env::var("FLOWRUN_TOKEN_ENDPOINT") {
            config.credentials.token_endpoint = endpoint;
        }
        config.credentials.client_id = std::env::var("GOOGLE_CLIENT_ID").ok();
        config.credentials.client_secret = std::env::var("GOOGLE_CLIENT_SECRET").ok();
        if let Some(policy) = env_parse("FLOWRUN_REFRESH_POLICY") {
            config.credentials.refresh_policy = policy;
        }
        if let Some(ms) = env_parse("FLOWRUN_REFRESH_TIMEOUT_MS") {
            config.credentials.refresh_timeout_ms = ms;
        }

        if let Ok(url) = std::env::var("FLOWRUN_GMAIL_BASE_URL") {
            config.integrations.gmail_base_url = url;
        }
        if let Ok(url) = std::env::var("FLOWRUN_OPENAI_BASE_URL") {
            config.integrations.openai_base_url = url;
        }
        if let Some(secs) = env_parse("FLOWRUN_HTTP_TIMEOUT_SECS") {
            config.integrations.http_timeout_secs = secs;
        }

        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_do_not_require_environment() {
        let config = Config::default();
        assert_eq!(config.server.port, 3004);
        assert_eq!(config.engine.max_concurrent_nodes, 16);
        assert!(config.engine.node_timeout().is_none());
        assert_eq!(config.credentials.token_endpoint, GOOGLE_TOKEN_ENDPOINT);
        assert_eq!(config.credentials.refresh_policy, RefreshPolicy::Always);
        assert_eq!(config.credentials.refresh_timeout(), Duration::from_secs(10));
        assert_eq!(config.integrations.http_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn refresh_policy_parses_both_spellings() {
        assert_eq!("always".parse::<RefreshPolicy>(), Ok(RefreshPolicy::Always));
        assert_eq!("WHEN_EXPIRED".parse::<RefreshPolicy>(), Ok(RefreshPolicy::WhenExpired));
        assert_eq!("when-expired".parse::<RefreshPolicy>(), Ok(RefreshPolicy::WhenExpired));
        assert!("sometimes".parse::<RefreshPolicy>().is_err());
    }

    #[test]
    fn client_secret_is_redacted_in_debug_output() {
        let credentials = CredentialsConfig {
            client_secret: Some("s3cret".to_string()),
            ..CredentialsConfig::default()
        };
        let rendered = format!("{:?}", credentials);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("REDACTED"));
    }
}
