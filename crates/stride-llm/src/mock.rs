//! Test-only mock oracles.

use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{ChatResponse, LlmProvider, Message, ToolDefinition, ToolUse};

/// Scriptable stand-in for both oracles.
///
/// Chat responses and tool calls are consumed front-to-back; when the script
/// runs out, `default_response` is returned. Embeddings are either a fixed
/// vector or a deterministic hash of the input text.
#[derive(Debug, Clone)]
pub struct MockProvider {
    pub responses: Arc<Mutex<Vec<ChatResponse>>>,
    pub default_response: String,
    pub embedding: Option<Vec<f32>>,
    pub embedding_dim: usize,
    pub fail_chat: bool,
    pub fail_embed: bool,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            embedding: None,
            embedding_dim: 1024,
            fail_chat: false,
            fail_embed: false,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// Script a sequence of tool calls followed by a final answer.
    #[must_use]
    pub fn with_tool_script(calls: Vec<(&str, serde_json::Value)>, final_text: &str) -> Self {
        let mut responses: Vec<ChatResponse> = calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, arguments))| {
                ChatResponse::ToolUse(ToolUse {
                    id: format!("call_{i}"),
                    name: name.to_string(),
                    arguments,
                })
            })
            .collect();
        responses.push(ChatResponse::Final(final_text.to_string()));
        Self::with_responses(responses)
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            fail_embed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_embeddings() -> Self {
        Self {
            fail_embed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding_dim = embedding.len();
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    async fn maybe_delay(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
    }

    fn next_response(&self) -> ChatResponse {
        let mut responses = self
            .responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if responses.is_empty() {
            ChatResponse::Final(self.default_response.clone())
        } else {
            responses.remove(0)
        }
    }

    /// Deterministic pseudo-embedding: seeded by the bytes of the input, then
    /// unit-normalized. Equal inputs embed equally.
    fn hash_embedding(&self, bytes: &[u8]) -> Vec<f32> {
        let mut state = 0x9e37_79b9_u32;
        for &b in bytes {
            state = state.wrapping_mul(31).wrapping_add(u32::from(b));
        }
        let mut vector = Vec::with_capacity(self.embedding_dim);
        for i in 0..self.embedding_dim {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state = state.wrapping_add(u32::try_from(i).unwrap_or(0));
            #[allow(clippy::cast_precision_loss)]
            vector.push((state % 1000) as f32 / 1000.0 - 0.5);
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
        self.maybe_delay().await;
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        match self.next_response() {
            ChatResponse::Final(text) => Ok(text),
            ChatResponse::ToolUse(_) => Ok(self.default_response.clone()),
        }
    }

    async fn chat_with_tools(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LlmError> {
        self.maybe_delay().await;
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        Ok(self.next_response())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.maybe_delay().await;
        if self.fail_embed {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        Ok(self
            .embedding
            .clone()
            .unwrap_or_else(|| self.hash_embedding(text.as_bytes())))
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, LlmError> {
        self.maybe_delay().await;
        if self.fail_embed {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        Ok(self
            .embedding
            .clone()
            .unwrap_or_else(|| self.hash_embedding(bytes)))
    }

    fn supports_embeddings(&self) -> bool {
        !self.fail_embed
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Role;

    #[tokio::test]
    async fn scripted_responses_consume_in_order() {
        let provider = MockProvider::with_tool_script(
            vec![("delegate_search", serde_json::json!({"query": "shoes"}))],
            "done",
        );
        let msgs = vec![Message::new(Role::User, "hi")];

        match provider.chat_with_tools(&msgs, &[]).await.unwrap() {
            ChatResponse::ToolUse(call) => assert_eq!(call.name, "delegate_search"),
            ChatResponse::Final(_) => panic!("expected tool call first"),
        }
        match provider.chat_with_tools(&msgs, &[]).await.unwrap() {
            ChatResponse::Final(text) => assert_eq!(text, "done"),
            ChatResponse::ToolUse(_) => panic!("expected final answer"),
        }
        // Script exhausted: falls back to the default.
        match provider.chat_with_tools(&msgs, &[]).await.unwrap() {
            ChatResponse::Final(text) => assert_eq!(text, "mock response"),
            ChatResponse::ToolUse(_) => panic!("expected default final"),
        }
    }

    #[tokio::test]
    async fn hash_embedding_is_deterministic_and_unit_length() {
        let provider = MockProvider::default();
        let a = provider.embed("running shoes").await.unwrap();
        let b = provider.embed("running shoes").await.unwrap();
        let c = provider.embed("yoga mat").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 1024);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn failing_embeddings_still_chat() {
        let provider = MockProvider::failing_embeddings();
        assert!(provider.embed("q").await.is_err());
        assert!(!provider.supports_embeddings());
        let msgs = vec![Message::new(Role::User, "hi")];
        assert!(provider.chat(&msgs).await.is_ok());
    }

    #[tokio::test]
    async fn fixed_embedding_overrides_hash() {
        let provider = MockProvider::default().with_embedding(vec![1.0, 0.0, 0.0]);
        let v = provider.embed("anything").await.unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0]);
    }
}
