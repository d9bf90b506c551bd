//! Scripted provider: replays a fixed queue of replies and records every
//! prompt it receives.
//!
//! Drives the chain, agent and workflow end to end in tests without a model
//! server. Clones share the same queue and prompt log.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::llm::providers::dummy::hashed_embedding;
use crate::llm::{LlmResponse, ProviderError};

/// One recorded call: the user content and the system prompt, if any.
#[derive(Debug, Clone)]
pub struct RecordedPrompt {
    pub content: String,
    pub system: Option<String>,
}

#[derive(Debug, Default)]
struct Script {
    replies: VecDeque<Result<String, String>>,
    prompts: Vec<RecordedPrompt>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedProvider {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let p = Self::default();
        for r in replies {
            p.push_reply(r);
        }
        p
    }

    /// Queue a successful reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.with_script(|s| s.replies.push_back(Ok(reply.into())));
    }

    /// Queue a failed request.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.with_script(|s| s.replies.push_back(Err(message.into())));
    }

    /// Every prompt received so far, oldest first.
    pub fn prompts(&self) -> Vec<RecordedPrompt> {
        self.with_script(|s| s.prompts.clone())
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.with_script(|s| s.replies.len())
    }

    pub async fn complete(&self, content: &str, system: Option<&str>) -> Result<LlmResponse, ProviderError> {
        let next = self.with_script(|s| {
            s.prompts.push(RecordedPrompt {
                content: content.to_string(),
                system: system.map(str::to_string),
            });
            s.replies.pop_front()
        });
        match next {
            Some(Ok(text)) => Ok(LlmResponse { text, usage: None }),
            Some(Err(message)) => Err(ProviderError::Request(message)),
            None => Err(ProviderError::Request("scripted provider has no replies left".into())),
        }
    }

    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(inputs.iter().map(|s| hashed_embedding(s)).collect())
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        // Poisoning only follows a panicking test; the queue is still intact.
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_errors() {
        let p = ScriptedProvider::new(["one", "two"]);
        assert_eq!(p.complete("a", None).await.unwrap().text, "one");
        assert_eq!(p.complete("b", Some("sys")).await.unwrap().text, "two");
        assert!(p.complete("c", None).await.is_err());

        let prompts = p.prompts();
        assert_eq!(prompts.len(), 3);
        assert_eq!(prompts[1].content, "b");
        assert_eq!(prompts[1].system.as_deref(), Some("sys"));
    }

    #[tokio::test]
    async fn queued_failure_is_returned() {
        let p = ScriptedProvider::default();
        p.push_failure("connection refused");
        let err = p.complete("x", None).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn clones_share_the_queue() {
        let p = ScriptedProvider::new(["only"]);
        let q = p.clone();
        assert_eq!(q.complete("x", None).await.unwrap().text, "only");
        assert_eq!(p.remaining(), 0);
        assert_eq!(p.prompts().len(), 1);
    }
}
