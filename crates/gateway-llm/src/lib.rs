pub mod anthropic;
pub mod anthropic_stream;
pub mod client;
pub mod mock;
pub mod prompt;
pub mod provider;
pub mod stream;

pub use client::LlmClient;
pub use mock::MOCK_CREDENTIAL_PREFIX;
pub use prompt::SystemPrompt;
pub use provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
pub use stream::StreamEvent;
