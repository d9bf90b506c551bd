//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities: clone them freely.
//! The same enum serves chat completion and embeddings; startup builds one
//! instance from `[llm]` and another from `[embeddings]`.

pub mod providers;

use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

// ── Response types ────────────────────────────────────────────────────────────

/// Token accounting reported by the provider, when available.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One completion: the reply text plus optional usage.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Option<LlmUsage>,
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects around async methods.
/// Adding a backend = new module + new variant + new match arms.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
    /// Canned replies for tests (`scripted` feature).
    #[cfg(any(test, feature = "scripted"))]
    Scripted(providers::scripted::ScriptedProvider),
}

impl LlmProvider {
    /// Send `content` as the user turn, with an optional system prompt.
    pub async fn complete(&self, content: &str, system: Option<&str>) -> Result<LlmResponse, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(content, system).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(content, system).await,
            #[cfg(any(test, feature = "scripted"))]
            LlmProvider::Scripted(p) => p.complete(content, system).await,
        }
    }

    /// Embed every input, returning vectors in input order.
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            LlmProvider::Dummy(p) => p.embed(inputs).await,
            LlmProvider::OpenAiCompatible(p) => p.embed(inputs).await,
            #[cfg(any(test, feature = "scripted"))]
            LlmProvider::Scripted(p) => p.embed(inputs).await,
        }
    }

    /// Short backend name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::OpenAiCompatible(_) => "openai",
            #[cfg(any(test, feature = "scripted"))]
            LlmProvider::Scripted(_) => "scripted",
        }
    }
}
