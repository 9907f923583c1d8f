use std::sync::Arc;

use gateway_core::CallerContext;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::anthropic::AnthropicProvider;
use crate::mock::{MockProvider, MOCK_CREDENTIAL_PREFIX};
use crate::prompt::SystemPrompt;
use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use crate::stream::StreamEvent;

/// The 4.H LLM Client. Both call shapes assemble a request from a prompt
/// already built by `gateway-prompt` and hand it to whichever provider is
/// active — the real Anthropic client, or [`MockProvider`] when the
/// configured credential begins with [`MOCK_CREDENTIAL_PREFIX`].
pub struct LlmClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(credential: String, base_url: Option<String>, model: String, max_tokens: u32) -> Self {
        let provider: Arc<dyn LlmProvider> = if credential.starts_with(MOCK_CREDENTIAL_PREFIX) {
            Arc::new(MockProvider)
        } else {
            Arc::new(AnthropicProvider::new(credential, base_url))
        };

        Self { provider, model, max_tokens }
    }

    pub fn is_mock(&self) -> bool {
        self.provider.name() == "mock"
    }

    /// Non-streaming call. `consulted_servers` feeds mock mode's echo; real
    /// providers ignore it since it's not part of the wire request.
    /// `query_text` is the caller's actual question (already delimited and
    /// PII-redacted by the orchestrator) and becomes the real provider's
    /// user-turn content.
    pub async fn query(
        &self,
        prompt: SystemPrompt,
        caller: &CallerContext,
        consulted_servers: &[String],
        query_text: &str,
    ) -> Result<ChatResponse, ProviderError> {
        let req = self.build_request(prompt, caller, consulted_servers, query_text);
        self.provider.send(&req).await
    }

    /// Streaming call. Returns a stream of [`StreamEvent`]; the final event
    /// is always `Done` or `Error`.
    pub async fn stream(
        &self,
        prompt: SystemPrompt,
        caller: &CallerContext,
        consulted_servers: &[String],
        query_text: &str,
    ) -> ReceiverStream<StreamEvent> {
        let req = self.build_request(prompt, caller, consulted_servers, query_text);
        let (tx, rx) = mpsc::channel(32);
        let provider = Arc::clone(&self.provider);

        tokio::spawn(async move {
            if let Err(e) = provider.send_stream(&req, tx.clone()).await {
                let _ = tx.send(StreamEvent::Error { message: e.to_string() }).await;
            }
        });

        ReceiverStream::new(rx)
    }

    fn build_request(
        &self,
        prompt: SystemPrompt,
        caller: &CallerContext,
        consulted_servers: &[String],
        query_text: &str,
    ) -> ChatRequest {
        let user_message = if self.is_mock() {
            let mut roles: Vec<&str> = caller.roles.iter().map(|r| r.as_str()).collect();
            roles.sort_unstable();
            format!(
                "{} ({}) consulted: {} | query: {}",
                caller.username,
                roles.join(", "),
                consulted_servers.join(", "),
                query_text,
            )
        } else {
            query_text.to_string()
        };

        ChatRequest {
            model: self.model.clone(),
            system_prompt: prompt,
            user_message,
            max_tokens: self.max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokio_stream::StreamExt;

    fn caller() -> CallerContext {
        CallerContext {
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            roles: HashSet::from(["finance".to_string()]),
            groups: vec![],
            department_code: None,
            token_id: None,
        }
    }

    #[tokio::test]
    async fn mock_credential_activates_mock_provider() {
        let client = LlmClient::new(
            format!("{MOCK_CREDENTIAL_PREFIX}abc"),
            None,
            "mock-model".to_string(),
            100,
        );
        assert!(client.is_mock());
        let resp = client
            .query(
                SystemPrompt::default(),
                &caller(),
                &["billing".to_string()],
                "how many open invoices",
            )
            .await
            .unwrap();
        assert!(resp.content.contains("alice"));
        assert!(resp.content.contains("billing"));
        assert!(resp.content.contains("how many open invoices"));
    }

    #[tokio::test]
    async fn mock_stream_ends_with_done() {
        let client = LlmClient::new(
            format!("{MOCK_CREDENTIAL_PREFIX}abc"),
            None,
            "mock-model".to_string(),
            100,
        );
        let mut stream = client
            .stream(SystemPrompt::default(), &caller(), &[], "status report")
            .await;
        let mut saw_done = false;
        while let Some(event) = stream.next().await {
            if matches!(event, StreamEvent::Done { .. }) {
                saw_done = true;
            }
        }
        assert!(saw_done);
    }
}
