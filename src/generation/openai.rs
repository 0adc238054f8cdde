use super::{GenerationClient, GenerationClientError, GenerationRequest, http_client};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

const DEFAULT_CHAT_URL: &str = "https://api.groq.com/openai/v1";

/// Chat-completions client for OpenAI-compatible APIs such as Groq.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    /// Build a client for `model`, defaulting to the Groq OpenAI-compatible endpoint.
    pub fn new(
        base_url: Option<String>,
        api_key: String,
        model: String,
    ) -> Result<Self, GenerationClientError> {
        Ok(Self {
            http: http_client("proposal-analyzer/answer")?,
            base_url: base_url.unwrap_or_else(|| DEFAULT_CHAT_URL.to_string()),
            api_key,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationClient for OpenAiChatClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "temperature": 0,
            "stream": false,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::Unavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GenerationClientError::Authentication(format!(
                "chat completions returned {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "chat completions returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode chat completion: {error}"
            ))
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(GenerationClientError::InvalidResponse(
                "chat completion contained no text".into(),
            ));
        }
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client_for(server: &MockServer) -> OpenAiChatClient {
        OpenAiChatClient::new(
            Some(server.base_url()),
            "gsk-test".into(),
            "llama-3.1-8b-instant".into(),
        )
        .expect("client")
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "Question: What is the budget?".into(),
        }
    }

    #[tokio::test]
    async fn returns_first_choice_with_zero_temperature() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer gsk-test")
                    .json_body_partial(r#"{"model":"llama-3.1-8b-instant","temperature":0}"#);
                then.status(200).json_body(json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "  $500,000  " } }
                    ]
                }));
            })
            .await;

        let answer = client_for(&server).generate(request()).await.expect("answer");

        mock.assert_async().await;
        assert_eq!(answer, "$500,000");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(401).body("invalid api key");
            })
            .await;

        let error = client_for(&server)
            .generate(request())
            .await
            .expect_err("unauthorized");
        assert!(matches!(error, GenerationClientError::Authentication(_)));
    }

    #[tokio::test]
    async fn server_error_maps_to_generation_failed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(503).body("overloaded");
            })
            .await;

        let error = client_for(&server)
            .generate(request())
            .await
            .expect_err("server error");
        assert!(
            matches!(error, GenerationClientError::GenerationFailed(ref message) if message.contains("503"))
        );
    }

    #[tokio::test]
    async fn empty_choices_are_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client_for(&server)
            .generate(request())
            .await
            .expect_err("no choices");
        assert!(matches!(error, GenerationClientError::InvalidResponse(_)));
    }
}
