use std::time::Duration;

use data_encoding::BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ImagesConfig, LlmConfig};
use crate::error::{AutoblogError, Result};
use crate::retry::{RetryPolicy, is_retryable_status};

use super::{GeneratedImage, ImageGenerator};

/// Image generation on the OpenAI Images API.  Shares the key and base URL
/// of the `[llm]` section.
pub struct OpenAiImages {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    size: String,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: String,
    size: &'a str,
    n: u32,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiImages {
    pub fn new(llm: &LlmConfig, images: &ImagesConfig) -> Result<Self> {
        if llm.api_key.is_empty() {
            return Err(AutoblogError::Config(
                "OpenAI API key required for image generation".into(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs.max(1)))
            .build()
            .map_err(|e| AutoblogError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: llm.api_key.clone(),
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            model: images.model.clone(),
            size: images.size.clone(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request(&self, body: &ImageRequest<'_>) -> Result<ImageResponse> {
        let resp = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .ok()
                .and_then(|r| r.error)
                .map(|e| e.message)
                .unwrap_or(text);
            warn!(status = %status, error = %message, "image generation failed");
            let message = format!("OpenAI Images API returned {status}: {message}");
            return Err(if is_retryable_status(status) {
                AutoblogError::Transport(message)
            } else {
                AutoblogError::Llm(message)
            });
        }

        resp.json()
            .await
            .map_err(|e| AutoblogError::Llm(format!("failed to parse image response: {e}")))
    }
}

fn image_prompt(query: &str) -> String {
    format!(
        "Generate a realistic editorial photo that best illustrates the following. \
         No text, letters or watermarks in the image.\n\n{query}"
    )
}

fn decode(response: ImageResponse) -> Result<Vec<u8>> {
    let encoded = response
        .data
        .into_iter()
        .find_map(|d| d.b64_json)
        .ok_or_else(|| AutoblogError::Llm("image response carried no b64_json data".into()))?;
    BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| AutoblogError::Llm(format!("invalid base64 image data: {e}")))
}

#[async_trait::async_trait]
impl ImageGenerator for OpenAiImages {
    async fn generate(&self, query: &str) -> Result<GeneratedImage> {
        let body = ImageRequest {
            model: &self.model,
            prompt: image_prompt(query),
            size: &self.size,
            n: 1,
            response_format: "b64_json",
        };
        debug!(model = %self.model, query, "requesting image");

        let body = &body;
        let parsed = self.retry.run("image generation", move || self.request(body)).await?;
        Ok(GeneratedImage {
            bytes: decode(parsed)?,
            extension: "png",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubServer, fast_retry};

    fn images(base_url: &str) -> OpenAiImages {
        let llm = LlmConfig {
            api_key: "sk-test".into(),
            base_url: base_url.into(),
            ..Default::default()
        };
        OpenAiImages::new(&llm, &ImagesConfig::default())
            .unwrap()
            .with_retry(fast_retry(3))
    }

    #[tokio::test]
    async fn overloaded_api_is_retried() {
        let server = StubServer::start(&[
            (429, r#"{"error": {"message": "Rate limit reached"}}"#),
            (200, r#"{"data": [{"b64_json": "iVBORw0KGgo="}]}"#),
        ])
        .await;
        let image = images(&server.url).generate("سرما خوردگی").await.unwrap();
        assert_eq!(image.bytes, b"\x89PNG\r\n\x1a\n");
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn rejected_prompt_is_not_retried() {
        let server = StubServer::start(&[(
            400,
            r#"{"error": {"message": "Your request was rejected by the safety system"}}"#,
        )])
        .await;
        let err = images(&server.url).generate("x").await.unwrap_err();
        assert!(matches!(err, AutoblogError::Llm(_)), "{err:?}");
        assert_eq!(server.hits(), 1);
    }

    #[test]
    fn b64_payload_is_decoded() {
        let parsed: ImageResponse =
            serde_json::from_str(r#"{"created": 1, "data": [{"b64_json": "iVBORw0KGgo="}]}"#).unwrap();
        assert_eq!(decode(parsed).unwrap(), b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn missing_data_is_an_error() {
        let parsed: ImageResponse = serde_json::from_str(r#"{"data": [{"url": "https://x"}]}"#).unwrap();
        assert!(decode(parsed).is_err());
    }

    #[test]
    fn prompt_carries_query() {
        assert!(image_prompt("سرما خوردگی").ends_with("سرما خوردگی"));
    }
}
