//! Language-model integration handler
//!
//! Sends upstream outputs to an OpenAI-compatible chat completion endpoint and
//! returns the first choice's text.

use crate::credentials::Credential;
use crate::runtime::executor::NodeHandler;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone)]
pub struct LlmHandler {
    http: reqwest::Client,
    openai_base_url: String,
    default_model: String,
    temperature: f64,
}

impl LlmHandler {
    pub fn new(http: reqwest::Client, openai_base_url: String, default_model: String, temperature: f64) -> Self {
        Self {
            http,
            openai_base_url,
            default_model,
            temperature,
        }
    }
}

/// Join upstream outputs into one prompt, one per line, in input order
///
/// Strings are used verbatim; any other value is rendered as compact JSON.
pub fn merge_inputs(inputs: &[Value]) -> String {
    inputs
        .iter()
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl NodeHandler for LlmHandler {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        credential: Option<&Credential>,
        inputs: &[Value],
    ) -> Result<Value> {
        let provider = config
            .get("modelProvider")
            .and_then(Value::as_str)
            .context("llm node missing 'modelProvider'")?;
        if !provider.eq_ignore_ascii_case("openai") {
            anyhow::bail!("Unsupported LLM provider: {}", provider);
        }

        // apiKey from config wins; otherwise use the node's resolved credential
        let authorization = match config.get("apiKey").and_then(Value::as_str) {
            Some(key) if !key.is_empty() => format!("Bearer {}", key),
            _ => credential
                .map(|c| c.auth_header().to_string())
                .context("llm node needs 'apiKey' or credentials")?,
        };

        let model = config
            .get("modelName")
            .and_then(Value::as_str)
            .unwrap_or(self.default_model.as_str());
        let system_prompt = config
            .get("systemPrompt")
            .and_then(Value::as_str)
            .unwrap_or("");
        let temperature = config
            .get("temperature")
            .and_then(Value::as_f64)
            .unwrap_or(self.temperature);

        let payload = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": merge_inputs(inputs) }
            ],
            "temperature": temperature
        });

        let url = format!("{}/chat/completions", self.openai_base_url.trim_end_matches('/'));
        tracing::debug!("🤖 Calling {} with {} merged input(s)", model, inputs.len());

        let response = self
            .http
            .post(&url)
            .header("Authorization", authorization)
            .json(&payload)
            .send()
            .await
            .context("LLM request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("LLM API returned HTTP {}", status);
        }

        let result: Value = response
            .json()
            .await
            .context("LLM API returned malformed JSON")?;

        let content = result
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .context("LLM response has no choices[0].message.content")?;

        Ok(Value::String(content.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_keeps_order_and_renders_json() {
        let merged = merge_inputs(&[json!("first"), json!({ "items": ["x", "y"] }), json!(3)]);
        assert_eq!(merged, "first\n{\"items\":[\"x\",\"y\"]}\n3");
        assert_eq!(merge_inputs(&[]), "");
    }

    #[tokio::test]
    async fn posts_chat_completion_and_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o",
                "temperature": 0.3,
                "messages": [
                    { "role": "system", "content": "Summarize" },
                    { "role": "user", "content": "one\ntwo" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [ { "message": { "role": "assistant", "content": "summary" } } ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let handler = LlmHandler::new(reqwest::Client::new(), server.uri(), "gpt-4o".to_string(), 0.3);
        let output = handler
            .execute(
                &config(json!({
                    "modelProvider": "OpenAI",
                    "apiKey": "sk-test",
                    "systemPrompt": "Summarize"
                })),
                None,
                &[json!("one"), json!("two")],
            )
            .await
            .unwrap();

        assert_eq!(output, json!("summary"));
    }

    #[tokio::test]
    async fn unsupported_provider_fails() {
        let handler = LlmHandler::new(reqwest::Client::new(), "http://unused".to_string(), "gpt-4o".to_string(), 0.3);
        let err = handler
            .execute(&config(json!({ "modelProvider": "Gemini", "apiKey": "k" })), None, &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported LLM provider"));
    }

    #[tokio::test]
    async fn malformed_response_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let handler = LlmHandler::new(reqwest::Client::new(), server.uri(), "gpt-4o".to_string(), 0.3);
        let err = handler
            .execute(&config(json!({ "modelProvider": "OpenAI", "apiKey": "k" })), None, &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("choices"));
    }

    #[tokio::test]
    async fn missing_key_and_credential_fails() {
        let handler = LlmHandler::new(reqwest::Client::new(), "http://unused".to_string(), "gpt-4o".to_string(), 0.3);
        let err = handler
            .execute(&config(json!({ "modelProvider": "OpenAI" })), None, &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("apiKey"));
    }
}
