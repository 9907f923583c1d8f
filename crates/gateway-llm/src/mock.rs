use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use crate::stream::StreamEvent;

pub use gateway_core::config::MOCK_CREDENTIAL_PREFIX;

/// Synthesises a deterministic response instead of contacting a provider, so
/// integration tests can exercise the orchestration core end-to-end. The
/// response echoes the caller's identity and the servers consulted for the
/// request, passed in via `consulted_servers` on the request's user message
/// by the caller (see `LlmClient`).
pub struct MockProvider;

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        Ok(ChatResponse {
            content: format!("[mock response] {}", req.user_message),
            model: req.model.clone(),
            tokens_in: req.user_message.len() as u32,
            tokens_out: 0,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            stop_reason: "end_turn".to_string(),
        })
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.send(req).await?;
        let _ = tx.send(StreamEvent::TextDelta { text: resp.content }).await;
        let _ = tx
            .send(StreamEvent::Done {
                model: resp.model,
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                cache_creation_tokens: 0,
                cache_read_tokens: 0,
                stop_reason: resp.stop_reason,
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::SystemPrompt;

    #[tokio::test]
    async fn mock_provider_echoes_user_message() {
        let provider = MockProvider;
        let req = ChatRequest {
            model: "mock-model".to_string(),
            system_prompt: SystemPrompt::default(),
            user_message: "alice (finance) consulted: billing, reports".to_string(),
            max_tokens: 100,
        };
        let resp = provider.send(&req).await.unwrap();
        assert!(resp.content.contains("alice (finance)"));
        assert!(resp.content.contains("billing, reports"));
    }
}
