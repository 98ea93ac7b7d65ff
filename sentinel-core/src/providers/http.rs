//! OpenAI-compatible HTTP provider

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ProviderConfig;
use crate::{Error, Result};

use super::{CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Chat-completions client for any OpenAI-compatible endpoint (Ollama's
/// `/v1`, LiteLLM, or the hosted API itself).
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
}

impl OpenAiCompatProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let mut messages: Vec<WireMessage> = Vec::new();
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        for message in &request.messages {
            messages.push(WireMessage {
                role: Self::role_str(message.role),
                content: &message.content,
            });
        }

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature.unwrap_or(0.1),
            "max_tokens": request.max_tokens.unwrap_or(512),
        });

        let mut http_request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| Error::LlmUnavailable(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::LlmUnavailable(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| Error::LlmUnavailable(format!("malformed response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::LlmUnavailable("response carried no content".to_string()))?;

        Ok(CompletionResponse { content })
    }

    async fn is_available(&self) -> bool {
        let mut request = self.client.get(format!("{}/models", self.base_url));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        matches!(request.send().await, Ok(resp) if resp.status().is_success())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_construction() {
        let config = ProviderConfig::default();
        let provider = OpenAiCompatProvider::new(&config);
        assert_eq!(provider.name(), "openai-compat");
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ProviderConfig {
            base_url: "http://llm.internal/v1/".to_string(),
            ..Default::default()
        };
        let provider = OpenAiCompatProvider::new(&config);
        assert_eq!(provider.base_url, "http://llm.internal/v1");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_llm_unavailable() {
        let config = ProviderConfig {
            // Reserved port with nothing listening
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let provider = OpenAiCompatProvider::new(&config);
        let err = provider
            .complete(CompletionRequest::new(vec![super::super::Message::user(
                "hi",
            )]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LlmUnavailable(_)));
    }
}
