//! Gmail integration handler
//!
//! Lists messages matching a search query and fetches the snippet of each,
//! authenticating with the node's resolved credential.

use crate::credentials::Credential;
use crate::runtime::executor::NodeHandler;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Search used when the node does not configure one
pub const DEFAULT_QUERY: &str = "is:unread newer_than:1d";

/// Fetches recent messages from the authenticated mailbox
#[derive(Debug, Clone)]
pub struct GmailHandler {
    http: reqwest::Client,
    default_base_url: String,
    max_messages: usize,
}

impl GmailHandler {
    pub fn new(http: reqwest::Client, default_base_url: String, max_messages: usize) -> Self {
        Self {
            http,
            default_base_url,
            max_messages,
        }
    }

    async fn get_json(&self, url: &str, auth_header: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .header("Authorization", auth_header)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await
            .with_context(|| format!("Gmail request failed: GET {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Gmail API returned HTTP {} for GET {}", status, url);
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("Gmail API returned malformed JSON for GET {}", url))
    }
}

#[async_trait]
impl NodeHandler for GmailHandler {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        credential: Option<&Credential>,
        _inputs: &[Value],
    ) -> Result<Value> {
        let credential = credential.context("gmail node requires a resolved credential")?;

        let base_url = credential
            .base_url
            .as_deref()
            .unwrap_or(self.default_base_url.as_str())
            .trim_end_matches('/');
        let user_id = credential.user_id.as_str();
        let query = config
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_QUERY);
        let limit = config
            .get("maxResults")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(self.max_messages);

        tracing::debug!("📬 Listing Gmail messages for '{}' (query: {})", user_id, query);

        let list_url = format!("{}/users/{}/messages", base_url, user_id);
        let listing = self
            .get_json(&list_url, credential.auth_header(), &[("q", query)])
            .await?;

        let message_ids: Vec<String> = listing
            .get("messages")
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|m| m.get("id").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let mut emails = Vec::new();
        for message_id in message_ids.iter().take(limit) {
            let message_url = format!("{}/{}", list_url, message_id);
            let message = self
                .get_json(&message_url, credential.auth_header(), &[])
                .await?;
            let snippet = message.get("snippet").and_then(Value::as_str).unwrap_or("");
            emails.push(json!({ "id": message_id, "snippet": snippet }));
        }

        tracing::info!("📨 Fetched {} Gmail message(s)", emails.len());

        Ok(json!({
            "emails": emails,
            "fetched_at": chrono::Utc::now().to_rfc3339(),
        }))
    }
}
