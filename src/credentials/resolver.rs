//! Credential resolution with refresh-and-fallback
//!
//! Each call computes its own live copy of the credential. Nothing is cached
//! between dispatches, so concurrent nodes (of the same or different runs)
//! never observe each other's refreshed tokens.

use crate::{
    config::{CredentialsConfig, RefreshPolicy},
    credentials::types::{
        Credential, CredentialSource, CredentialSpec, ExecutionContextRef, OAuthTokens,
        RefreshOutcome, TokenResponse,
    },
    error::CredentialError,
};
use serde_json::Value;

/// Longest slice of a failed token response body kept in logs
const MAX_ERROR_BODY_LOG_LENGTH: usize = 200;

/// Turns a node's declared `CredentialSpec` into a usable `Credential`
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    http: reqwest::Client,
    settings: CredentialsConfig,
}

impl CredentialResolver {
    pub fn new(http: reqwest::Client, settings: &CredentialsConfig) -> Self {
        Self {
            http,
            settings: settings.clone(),
        }
    }

    /// Resolve a credential for one dispatch
    ///
    /// A refresh failure never fails resolution on its own: the supplied
    /// authorization header is used instead. Only when that header is also
    /// missing does resolution fail.
    pub async fn resolve(&self, spec: &CredentialSpec) -> Result<Credential, CredentialError> {
        let mut raw = spec.credentials.clone().unwrap_or_default();
        let context = spec.execution_context.clone().unwrap_or_default();

        match self.refresh(&raw).await {
            RefreshOutcome::Refreshed(token) => {
                let token_type = token
                    .token_type
                    .clone()
                    .or_else(|| raw.token_type.clone())
                    .unwrap_or_else(|| "Bearer".to_string());
                let auth_header = format!("{} {}", token_type, token.access_token);

                raw.access_token = Some(token.access_token);
                raw.token_type = Some(token_type);
                if let Some(expires_in) = token.expires_in {
                    raw.expires_at = Some(now_millis() + (expires_in as i64) * 1000);
                }
                if token.refresh_token.is_some() {
                    raw.refresh_token = token.refresh_token;
                }
                if let Some(scope) = token.scope {
                    raw.extra.insert("scope".to_string(), Value::String(scope));
                }

                tracing::debug!("🔑 Using refreshed authorization header");
                return Ok(build_credential(raw, context, auth_header, CredentialSource::Refreshed));
            }
            RefreshOutcome::Skipped(reason) => {
                tracing::debug!("🔑 Token refresh skipped: {}", reason);
            }
            RefreshOutcome::Failed(reason) => {
                tracing::warn!(
                    "⚠️ Token refresh failed, falling back to supplied authorization header: {}",
                    reason
                );
            }
        }

        let fallback = context
            .auth_header
            .clone()
            .filter(|header| !header.trim().is_empty())
            .ok_or(CredentialError::NoUsableCredential)?;

        Ok(build_credential(raw, context, fallback, CredentialSource::Fallback))
    }

    /// Attempt a refresh exchange against the configured token endpoint
    pub async fn refresh(&self, tokens: &OAuthTokens) -> RefreshOutcome {
        let Some(refresh_token) = tokens.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            return RefreshOutcome::Skipped("no refresh token".to_string());
        };

        if self.settings.refresh_policy == RefreshPolicy::WhenExpired {
            if let Some(expires_at) = tokens.expires_at {
                if expires_at > now_millis() {
                    return RefreshOutcome::Skipped("access token still valid".to_string());
                }
            }
        }

        let Some(client_id) = tokens
            .client_id
            .as_deref()
            .or(self.settings.client_id.as_deref())
        else {
            return RefreshOutcome::Skipped("no client id".to_string());
        };
        let Some(client_secret) = self.settings.client_secret.as_deref() else {
            return RefreshOutcome::Skipped("no client secret configured".to_string());
        };

        let form = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        tracing::debug!("🔄 Refreshing access token at {}", self.settings.token_endpoint);

        let exchange = async {
            let response = self
                .http
                .post(&self.settings.token_endpoint)
                .form(&form)
                .send()
                .await
                .map_err(|e| format!("token endpoint unreachable: {}", e))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| format!("failed to read token response: {}", e))?;
            Ok::<_, String>((status, body))
        };

        let (status, body) = match tokio::time::timeout(self.settings.refresh_timeout(), exchange).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(reason)) => return RefreshOutcome::Failed(reason),
            Err(_) => {
                return RefreshOutcome::Failed(format!(
                    "token endpoint timed out after {:?}",
                    self.settings.refresh_timeout()
                ))
            }
        };

        if !status.is_success() {
            return RefreshOutcome::Failed(format!(
                "token endpoint returned HTTP {}: {}",
                status,
                truncate(&body)
            ));
        }

        match serde_json::from_str::<TokenResponse>(&body) {
            Ok(token) if !token.access_token.is_empty() => RefreshOutcome::Refreshed(token),
            Ok(_) => RefreshOutcome::Failed("token response carried an empty access token".to_string()),
            Err(e) => RefreshOutcome::Failed(format!("unparsable token response: {}", e)),
        }
    }
}

fn build_credential(
    raw: OAuthTokens,
    context: ExecutionContextRef,
    auth_header: String,
    source: CredentialSource,
) -> Credential {
    Credential {
        raw,
        user_id: context.user_id,
        base_url: context.base_url,
        auth_header,
        source,
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LOG_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LOG_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated, {} total bytes]", &body[..end], body.len())
}
