// LLM collaborator boundary
// The dispatcher treats the model provider as an opaque, possibly slow,
// possibly failing text generator. Nothing downstream assumes anything about
// the output beyond "query-shaped text" that must pass the validation gate.

//! # LLM Collaborator
//!
//! [`LlmClient`] is the untrusted-boundary trait for free-form generation.
//! The production implementation ([`openai::OpenAiCompatibleClient`]) talks
//! to any OpenAI-compatible chat-completions endpoint; tests use
//! deterministic fakes so the validation gate can be exercised without a
//! live service.

pub mod openai;

pub use openai::{OpenAiCompatibleClient, OpenAiCompatibleConfig};

use async_trait::async_trait;

use crate::Result;

/// Output of one generation call.
#[derive(Debug, Clone)]
pub struct Generation {
    /// The raw generated text. Untrusted until validated.
    pub text: String,
    /// Total token usage when the provider reports it.
    pub tokens_used: Option<u32>,
}

/// Opaque text-generation collaborator.
///
/// Implementations must honor their own timeout and map every transport or
/// provider failure into [`crate::DispatchError::UpstreamUnavailable`]; the
/// router never inspects provider-specific errors.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate text for a prompt.
    async fn generate(&self, prompt: &str) -> Result<Generation>;

    /// Short provider label for logging.
    fn provider_name(&self) -> &str;
}
