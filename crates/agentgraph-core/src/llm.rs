//! LLM adapter trait: the minimal `prompt → string` boundary `llm_call`
//! and `generate_subgraph` nodes dispatch through.
//!
//! As with the tool registry, this crate is an orchestration engine and not
//! an LLM client library: callers implement [`LlmAdapter`] for whichever
//! provider they use and hand `Arc<dyn LlmAdapter>` to the engine.

use async_trait::async_trait;

/// Provider-agnostic chat completion boundary.
///
/// Implementations must be `Send + Sync` so a single adapter can be shared
/// across concurrent fork branches.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Completes `prompt`, returning the raw response text. Errors are
    /// surfaced to the caller as `LlmError`.
    async fn complete(&self, prompt: &str) -> Result<String, String>;
}

/// Canned adapters for exercising `llm_call`/`generate_subgraph` without a
/// real provider. Available to this crate's own tests and, via the
/// `test-util` feature, to downstream integration tests and the CLI's test
/// suite.
#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    use super::LlmAdapter;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// A canned-response adapter for tests.
    pub struct StaticAdapter {
        response: String,
    }

    impl StaticAdapter {
        pub fn new(response: impl Into<String>) -> Self {
            StaticAdapter {
                response: response.into(),
            }
        }
    }

    #[async_trait]
    impl LlmAdapter for StaticAdapter {
        async fn complete(&self, _prompt: &str) -> Result<String, String> {
            Ok(self.response.clone())
        }
    }

    /// An adapter that hands back successive responses from a queue, for
    /// scenarios that call the LLM more than once.
    pub struct QueueAdapter {
        responses: Mutex<Vec<String>>,
    }

    impl QueueAdapter {
        pub fn new(responses: Vec<String>) -> Self {
            let mut responses = responses;
            responses.reverse();
            QueueAdapter {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl LlmAdapter for QueueAdapter {
        async fn complete(&self, _prompt: &str) -> Result<String, String> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| "no more queued responses".to_string())
        }
    }
}
