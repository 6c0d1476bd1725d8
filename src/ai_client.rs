// Chat completion client for OpenAI-compatible endpoints (OpenAI, LM Studio,
// Ollama's /v1 bridge) and Ollama's native generate API.

use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::error::ChatError;
use crate::modules::chat_context::ChatMessage;
use crate::settings::AiSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Anything that turns a message list into a single completion.
pub trait ChatProvider {
    fn name(&self) -> &str;

    fn complete(
        &self,
        messages: &[ChatMessage],
    ) -> impl Future<Output = Result<String, ChatError>> + Send;
}

/// Ollama's own API (not its OpenAI-compatible `/v1` bridge).
pub fn is_ollama_native(endpoint: &str) -> bool {
    (endpoint.contains("ollama") || endpoint.contains("11434"))
        && !endpoint.contains("/v1")
        && !endpoint.contains("chat/completions")
}

/// Well-known model names for the endpoint, for the settings picker.
pub fn suggested_models(endpoint: &str) -> Vec<&'static str> {
    let endpoint = endpoint.to_lowercase();
    if endpoint.contains("openai.com") {
        vec!["gpt-4", "gpt-4-turbo-preview", "gpt-3.5-turbo", "gpt-3.5-turbo-16k"]
    } else if endpoint.contains("localhost:11434") || endpoint.contains("ollama") {
        vec!["llama2", "mistral", "codellama", "llama2:13b", "mistral:7b"]
    } else if endpoint.contains("localhost:1234") {
        vec![
            "TheBloke/Mistral-7B-Instruct-v0.2-GGUF",
            "TheBloke/Llama-2-7B-Chat-GGUF",
            "TheBloke/CodeLlama-7B-Instruct-GGUF",
        ]
    } else {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    settings: AiSettings,
    http: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(settings: AiSettings) -> Result<Self, ChatError> {
        Url::parse(&settings.endpoint)
            .map_err(|e| ChatError::InvalidEndpoint(format!("{}: {}", settings.endpoint, e)))?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { settings, http })
    }

    pub fn settings(&self) -> &AiSettings {
        &self.settings
    }

    pub fn request_url(&self) -> String {
        let base = self.settings.endpoint.trim_end_matches('/');
        if is_ollama_native(base) {
            format!("{}/api/generate", base)
        } else if base.ends_with("chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    pub fn request_body(&self, messages: &[ChatMessage]) -> Value {
        if is_ollama_native(&self.settings.endpoint) {
            // The generate API takes a single prompt: the outgoing message.
            let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            json!({
                "model": self.settings.model,
                "prompt": prompt,
                "stream": false
            })
        } else {
            json!({
                "model": self.settings.model,
                "messages": messages,
                "temperature": self.settings.temperature,
                "max_tokens": self.settings.max_tokens,
                "stream": false
            })
        }
    }
}

/// Pulls the completion text out of an OpenAI or Ollama response body.
pub fn parse_completion(body: &Value) -> Result<String, ChatError> {
    if let Some(content) = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
    {
        return Ok(content.to_string());
    }
    if let Some(content) = body.get("response").and_then(|r| r.as_str()) {
        return Ok(content.to_string());
    }
    Err(ChatError::NoContent)
}

impl ChatProvider for OpenAiCompatClient {
    fn name(&self) -> &str {
        self.settings.provider_name()
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        if messages.is_empty() {
            return Err(ChatError::EmptyConversation);
        }

        let url = self.request_url();
        let body = self.request_body(messages);
        log::info!(
            "[Chat] Sending {} messages to {} ({})",
            messages.len(),
            url,
            self.settings.model
        );

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = self.settings.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[Chat] API error {} from {}", status, url);
            return Err(ChatError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let json: Value =
            serde_json::from_str(&text).map_err(|e| ChatError::InvalidResponse(e.to_string()))?;
        parse_completion(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AiPreset;
    use rstest::rstest;

    fn client(endpoint: &str) -> OpenAiCompatClient {
        OpenAiCompatClient::new(AiSettings {
            endpoint: endpoint.to_string(),
            ..AiSettings::default()
        })
        .unwrap()
    }

    #[rstest]
    #[case("http://localhost:11434", true)]
    #[case("http://my-ollama.lan:8080", true)]
    #[case("http://localhost:11434/v1", false)]
    #[case("http://localhost:11434/api/chat/completions", false)]
    #[case("https://api.openai.com/v1", false)]
    fn test_is_ollama_native(#[case] endpoint: &str, #[case] expected: bool) {
        assert_eq!(is_ollama_native(endpoint), expected);
    }

    #[rstest]
    #[case("https://api.openai.com/v1/", "https://api.openai.com/v1/chat/completions")]
    #[case("http://localhost:1234/v1", "http://localhost:1234/v1/chat/completions")]
    #[case("http://localhost:11434", "http://localhost:11434/api/generate")]
    #[case("https://proxy.example/v1/chat/completions", "https://proxy.example/v1/chat/completions")]
    fn test_request_url(#[case] endpoint: &str, #[case] expected: &str) {
        assert_eq!(client(endpoint).request_url(), expected);
    }

    #[test]
    fn test_openai_body_carries_full_conversation() {
        let c = OpenAiCompatClient::new(AiSettings::from_preset(AiPreset::OpenAi)).unwrap();
        let body = c.request_body(&[ChatMessage::system("frame"), ChatMessage::user("hi")]);

        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 2000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_ollama_native_body_sends_last_message_as_prompt() {
        let c = client("http://localhost:11434");
        let body = c.request_body(&[ChatMessage::system("frame"), ChatMessage::user("hi")]);

        assert_eq!(body["prompt"], "hi");
        assert!(body.get("messages").is_none());
    }

    #[test]
    fn test_parse_completion_formats() {
        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]});
        let ollama = json!({"model": "llama2", "response": "hey"});

        assert_eq!(parse_completion(&openai).unwrap(), "hello");
        assert_eq!(parse_completion(&ollama).unwrap(), "hey");
        assert!(matches!(parse_completion(&json!({"choices": []})), Err(ChatError::NoContent)));
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let result = OpenAiCompatClient::new(AiSettings {
            endpoint: "not a url".to_string(),
            ..AiSettings::default()
        });
        assert!(matches!(result, Err(ChatError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_empty_conversation_rejected_before_network() {
        let c = client("http://127.0.0.1:9");
        assert!(matches!(c.complete(&[]).await, Err(ChatError::EmptyConversation)));
    }

    #[test]
    fn test_suggested_models() {
        assert!(suggested_models("https://api.openai.com/v1").contains(&"gpt-4"));
        assert!(suggested_models("http://localhost:11434/v1").contains(&"mistral"));
        assert!(suggested_models("https://elsewhere.example").is_empty());
    }
}
