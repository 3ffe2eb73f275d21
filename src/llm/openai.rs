use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{AutoblogError, Result};
use crate::llm::context::{GenerateContext, Turn};
use crate::retry::is_retryable_status;

/// Generation backend on the OpenAI Responses API.
///
/// Conversations are created through `POST /conversations`; every turn is a
/// `POST /responses` naming that conversation, so the server accumulates the
/// history and each call only carries the new turns.
///
/// Configuration priority (highest → lowest):
///   1. Environment variables (`OPENAI_API_KEY`, `OPENAI_MODEL`)
///   2. `[llm]` section of `config.toml`
///   3. Built-in defaults
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    web_search: bool,
}

// -- Request/response types ---

#[derive(Serialize)]
struct ResponseRequest<'a> {
    model: &'a str,
    conversation: &'a str,
    input: &'a [Turn],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ToolSpec {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ConversationResponse {
    id: String,
}

#[derive(Deserialize)]
struct ResponseBody {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl ResponseBody {
    fn text(self) -> String {
        if let Some(text) = self.output_text.filter(|t| !t.is_empty()) {
            return text;
        }
        self.output
            .into_iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content)
            .filter(|c| c.kind == "output_text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("")
    }
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AutoblogError::Config(
                "OpenAI API key required: set OPENAI_API_KEY env var or llm.api_key in config"
                    .into(),
            ));
        }

        let timeout_secs = config.timeout_secs;
        let client = Client::builder()
            .timeout(if timeout_secs > 0 {
                Duration::from_secs(timeout_secs)
            } else {
                Duration::from_secs(300)
            })
            .build()
            .map_err(|e| AutoblogError::Config(format!("failed to create HTTP client: {e}")))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();

        info!(
            model = %config.model,
            base_url = %base_url,
            temperature = config.temperature,
            web_search = config.web_search,
            timeout_secs,
            "OpenAI backend initialized"
        );

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            web_search: config.web_search,
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}/{path}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    AutoblogError::Transport(format!("OpenAI request failed: {e}"))
                } else {
                    AutoblogError::Llm(format!("OpenAI request failed: {e}"))
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let error_text = resp.text().await.unwrap_or_default();
        let error_msg = serde_json::from_str::<ErrorResponse>(&error_text)
            .ok()
            .and_then(|r| r.error)
            .map(|e| e.message)
            .unwrap_or(error_text);

        warn!(status = %status, error = %error_msg, path, "OpenAI API error");

        let message = format!("OpenAI API returned {status}: {error_msg}");
        if is_retryable_status(status) {
            Err(AutoblogError::Transport(message))
        } else {
            Err(AutoblogError::Llm(message))
        }
    }
}

#[async_trait::async_trait]
impl super::LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "OpenAI Responses API"
    }

    async fn create_conversation(&self) -> Result<String> {
        let resp = self.post("conversations", &serde_json::json!({})).await?;
        let conv: ConversationResponse = resp.json().await.map_err(|e| {
            AutoblogError::Llm(format!("failed to parse conversation response: {e}"))
        })?;
        info!(conversation_id = %conv.id, "conversation created");
        Ok(conv.id)
    }

    async fn generate(&self, ctx: &GenerateContext<'_>) -> Result<String> {
        let body = ResponseRequest {
            model: &self.model,
            conversation: ctx.conversation_id,
            input: ctx.turns,
            tools: if self.web_search {
                vec![ToolSpec {
                    kind: "web_search_preview",
                }]
            } else {
                Vec::new()
            },
            temperature: Some(self.temperature),
        };

        let prompt_len: usize = ctx.turns.iter().map(|t| t.content.len()).sum();
        debug!(
            model = %self.model,
            conversation_id = ctx.conversation_id,
            turns = ctx.turns.len(),
            prompt_len,
            "invoking OpenAI Responses API"
        );

        let resp = self.post("responses", &body).await?;
        let parsed: ResponseBody = resp.json().await.map_err(|e| {
            AutoblogError::Llm(format!("failed to parse OpenAI response: {e}"))
        })?;

        if let Some(ref usage) = parsed.usage {
            debug!(
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                total_tokens = usage.total_tokens,
                "OpenAI usage"
            );
        }

        let response = parsed.text().trim().to_string();
        info!(response_len = response.len(), model = %self.model, "OpenAI response received");

        if response.is_empty() {
            return Err(AutoblogError::Llm("OpenAI returned empty response".into()));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_text_shortcut_wins() {
        let body: ResponseBody =
            serde_json::from_str(r#"{"output_text": "hello", "output": []}"#).unwrap();
        assert_eq!(body.text(), "hello");
    }

    #[test]
    fn message_items_are_concatenated() {
        let body: ResponseBody = serde_json::from_str(
            r#"{"output": [
                {"type": "web_search_call", "content": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "<div>"},
                    {"type": "output_text", "text": "</div>"}
                ]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(body.text(), "<div></div>");
    }

    #[test]
    fn request_carries_conversation_and_turns() {
        let turns = [Turn::developer("rules"), Turn::user("keyword")];
        let req = ResponseRequest {
            model: "m",
            conversation: "conv_1",
            input: &turns,
            tools: vec![ToolSpec {
                kind: "web_search_preview",
            }],
            temperature: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["conversation"], "conv_1");
        assert_eq!(v["input"][0]["role"], "developer");
        assert_eq!(v["input"][1]["content"], "keyword");
        assert_eq!(v["tools"][0]["type"], "web_search_preview");
        assert!(v.get("temperature").is_none());
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = LlmConfig::default();
        assert!(matches!(OpenAiBackend::new(&config), Err(AutoblogError::Config(_))));
    }
}
