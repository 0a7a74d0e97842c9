//! Credential type definitions
//!
//! `CredentialSpec` is what a node declares in the raw workflow definition.
//! `Credential` is what a handler receives after resolution: it always carries
//! an authorization header.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provider token set as supplied by the caller
///
/// Known OAuth fields are typed; anything else the provider stores is kept in
/// `extra` so handlers can still reach it.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// OAuth client id the token was issued to
    #[serde(default)]
    pub client_id: Option<String>,
    /// Access token expiry as epoch milliseconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl std::fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("OAuthTokens")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("token_type", &self.token_type)
            .field("client_id", &self.client_id)
            .field("expires_at", &self.expires_at)
            .field("extra_keys", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Where and as whom a handler talks to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContextRef {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Authorization header supplied by the caller, used as refresh fallback
    #[serde(default)]
    pub auth_header: Option<String>,
}

impl Default for ExecutionContextRef {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            base_url: None,
            auth_header: None,
        }
    }
}

fn default_user_id() -> String {
    "me".to_string()
}

/// Credential requirement declared on a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialSpec {
    #[serde(default)]
    pub credentials: Option<OAuthTokens>,
    #[serde(default)]
    pub execution_context: Option<ExecutionContextRef>,
}

/// How the effective authorization header was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// A refresh exchange succeeded for this dispatch
    Refreshed,
    /// The caller-supplied header is used as-is
    Fallback,
}

/// Live credential handed to a node handler for one dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    /// Token set, with the refreshed access token when a refresh succeeded
    pub raw: OAuthTokens,
    pub user_id: String,
    pub base_url: Option<String>,
    /// Effective `Authorization` header value
    pub auth_header: String,
    pub source: CredentialSource,
}

impl Credential {
    pub fn auth_header(&self) -> &str {
        &self.auth_header
    }

    pub fn is_refreshed(&self) -> bool {
        self.source == CredentialSource::Refreshed
    }
}

/// Successful body of a refresh exchange
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Result of a refresh attempt; only `Refreshed` changes the header
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Refreshed(TokenResponse),
    /// Refresh was not attempted (no refresh token, no secret, token still valid)
    Skipped(String),
    /// Endpoint unreachable, non-2xx status or unusable body
    Failed(String),
}
