//! LLM provider implementations.
//!
//! `build` and `build_embedder` are the factories called at startup.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod openai_compatible;
#[cfg(any(test, feature = "scripted"))]
pub mod scripted;

use crate::config::{EmbeddingsConfig, LlmConfig, OpenAiConfig};
use crate::llm::{LlmProvider, ProviderError};

/// Construct the chat provider from `[llm]` and an optional API key.
///
/// `api_key` is sourced from `LLM_API_KEY` env (never TOML) and is `None`
/// for keyless local models.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    from_parts(&config.provider, &config.openai, api_key)
}

/// Construct the embeddings provider from `[embeddings]`.
pub fn build_embedder(config: &EmbeddingsConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    from_parts(&config.provider, &config.openai, api_key)
}

fn from_parts(provider: &str, oai: &OpenAiConfig, api_key: Option<String>) -> Result<LlmProvider, ProviderError> {
    match provider {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider)),
        "openai" | "openai-compatible" | "ollama" => {
            let p = openai_compatible::OpenAiCompatibleProvider::new(
                oai.api_base_url.clone(),
                oai.model.clone(),
                oai.temperature,
                oai.timeout_seconds,
                api_key,
            )?;
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm_config(provider: &str) -> LlmConfig {
        LlmConfig {
            provider: provider.into(),
            openai: OpenAiConfig {
                api_base_url: "http://localhost:0/v1/chat/completions".into(),
                model: "m".into(),
                temperature: 0.0,
                timeout_seconds: 1,
            },
        }
    }

    #[test]
    fn builds_known_providers() {
        assert_eq!(build(&llm_config("dummy"), None).unwrap().name(), "dummy");
        assert_eq!(build(&llm_config("openai"), None).unwrap().name(), "openai");
        assert_eq!(build(&llm_config("ollama"), Some("k".into())).unwrap().name(), "openai");
    }

    #[test]
    fn unknown_provider_errors() {
        let err = build(&llm_config("qwen"), None).unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(ref p) if p == "qwen"));
    }
}
