//! Generic HTTP request handler
//!
//! Calls an arbitrary endpoint. The first upstream output becomes the request
//! body for methods that carry one.

use crate::credentials::Credential;
use crate::runtime::executor::NodeHandler;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct HttpRequestHandler {
    http: reqwest::Client,
}

impl HttpRequestHandler {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

fn parse_method(raw: &str) -> Result<Method> {
    match raw.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "PATCH" => Ok(Method::PATCH),
        _ => Err(anyhow::anyhow!("Unsupported HTTP method: {}", raw)),
    }
}

#[async_trait]
impl NodeHandler for HttpRequestHandler {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        credential: Option<&Credential>,
        inputs: &[Value],
    ) -> Result<Value> {
        let url = config
            .get("url")
            .and_then(Value::as_str)
            .context("http_request node missing 'url'")?;
        let method_name = config.get("method").and_then(Value::as_str).unwrap_or("GET");
        let method = parse_method(method_name)?;

        tracing::debug!("🌍 HTTP Request: {} {}", method, url);

        let mut request = self.http.request(method.clone(), url);

        // Credential first so explicit config headers can override it
        if let Some(credential) = credential {
            request = request.header("Authorization", credential.auth_header());
        }
        if let Some(headers) = config.get("headers").and_then(Value::as_object) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key.as_str(), value);
                }
            }
        }

        let carries_body = matches!(method, Method::POST | Method::PUT | Method::PATCH);
        if let (true, Some(body)) = (carries_body, inputs.first()) {
            request = match body {
                Value::String(text) => request
                    .header("Content-Type", "text/plain")
                    .body(text.clone()),
                other => request.json(other),
            };
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("HTTP request failed: {} {}", method, url))?;

        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        tracing::debug!("📡 Response status: {}", status);

        if !status.is_success() {
            anyhow::bail!("{} {} returned HTTP {}", method, url, status);
        }

        // JSON when it parses, raw text otherwise
        let data = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        Ok(json!({
            "status": status.as_u16(),
            "headers": headers,
            "data": data,
            "success": true
        }))
    }
}
