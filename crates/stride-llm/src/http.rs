use std::fmt;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{ChatResponse, LlmProvider, Message, ToolDefinition, ToolUse};
use crate::retry::send_with_retry;

const MAX_RETRIES: u32 = 2;

/// OpenAI-compatible chat-completions and embeddings client.
///
/// Serves as both the LLM oracle and the embedding oracle; text and image
/// inputs go through the same embedding model so cross-modal similarity is
/// meaningful.
pub struct HttpProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: Option<String>,
    deadline: Duration,
}

impl fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Clone for HttpProvider {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            embedding_model: self.embedding_model.clone(),
            deadline: self.deadline,
        }
    }
}

impl HttpProvider {
    #[must_use]
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        embedding_model: Option<String>,
        deadline: Duration,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
            embedding_model,
            deadline,
        }
    }

    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, LlmError>>,
    ) -> Result<T, LlmError> {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::DeadlineExceeded {
                ms: u64::try_from(self.deadline.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn send_chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ApiChoice, LlmError> {
        let api_tools: Option<Vec<ApiTool>> = tools.map(|defs| {
            defs.iter()
                .map(|def| ApiTool {
                    kind: "function",
                    function: ApiFunction {
                        name: def.name,
                        description: def.description,
                        parameters: def.input_schema.clone(),
                    },
                })
                .collect()
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            tools: api_tools,
        };

        let response = send_with_retry(&self.model, MAX_RETRIES, || {
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "chat request failed: {text}");
            return Err(LlmError::Other(format!(
                "chat request failed (status {status})"
            )));
        }

        let parsed: ApiChatResponse = serde_json::from_str(&text)?;
        parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::EmptyResponse {
                provider: self.model.clone(),
            })
    }

    async fn send_embed(&self, input: &str) -> Result<Vec<f32>, LlmError> {
        let Some(model) = self.embedding_model.as_deref() else {
            return Err(LlmError::EmbedUnsupported {
                provider: self.model.clone(),
            });
        };

        let body = EmbedRequest { model, input };

        let response = send_with_retry(model, MAX_RETRIES, || {
            self.client
                .post(format!("{}/embeddings", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "embedding request failed: {text}");
            return Err(LlmError::Other(format!(
                "embedding request failed (status {status})"
            )));
        }

        let parsed: EmbedResponse = serde_json::from_str(&text)?;
        let mut vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::EmptyResponse {
                provider: model.to_string(),
            })?;

        normalize(&mut vector);
        Ok(vector)
    }
}

/// Scale a vector to unit length. Zero vectors are left untouched.
fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

impl LlmProvider for HttpProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        let choice = self.with_deadline(self.send_chat(messages, None)).await?;
        choice
            .message
            .content
            .filter(|c| !c.is_empty())
            .ok_or_else(|| LlmError::EmptyResponse {
                provider: self.model.clone(),
            })
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LlmError> {
        let choice = self
            .with_deadline(self.send_chat(messages, Some(tools)))
            .await?;

        // One invocation per round; extra parallel calls are ignored.
        if let Some(call) = choice.message.tool_calls.into_iter().next() {
            let arguments = serde_json::from_str(&call.function.arguments)?;
            return Ok(ChatResponse::ToolUse(ToolUse {
                id: call.id,
                name: call.function.name,
                arguments,
            }));
        }

        choice
            .message
            .content
            .filter(|c| !c.is_empty())
            .map(ChatResponse::Final)
            .ok_or_else(|| LlmError::EmptyResponse {
                provider: self.model.clone(),
            })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.with_deadline(self.send_embed(text)).await
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, LlmError> {
        // Multimodal embedding endpoints take image input as a data URI.
        let data_uri = format!("data:image/jpeg;base64,{}", BASE64.encode(bytes));
        self.with_deadline(self.send_embed(&data_uri)).await
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some()
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool<'a>>>,
}

#[derive(Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: serde_json::Value,
}

#[derive(Deserialize)]
struct ApiChatResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiCalledFunction,
}

#[derive(Deserialize)]
struct ApiCalledFunction {
    name: String,
    /// JSON-encoded argument object, per the chat-completions wire format.
    arguments: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}
