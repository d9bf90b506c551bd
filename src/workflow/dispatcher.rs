//! Query dispatcher: route a question, call the collaborator, normalize its
//! output into a new [`SessionState`].
//!
//! Collaborator failures never escape `dispatch`; they become an
//! `Error occurred: ...` answer with empty `query` and `result`.

use tracing::{info, warn};

use crate::agents::{AgentMessage, ChainOutput, ReactAgent, SqlChain};
use crate::error::AppError;
use crate::workflow::state::{Resolution, Route, SessionState};

/// Marker stored as `query` for general-path answers.
pub const AGENT_QUERY_PLACEHOLDER: &str = "Generated by agent";
/// Marker stored as `result` for general-path answers.
pub const AGENT_RESULT_PLACEHOLDER: &str = "Agent response";

/// Counting-path collaborator.
#[allow(async_fn_in_trait)]
pub trait CountingPath {
    async fn invoke(&self, question: &str) -> Result<ChainOutput, AppError>;
}

/// General-path collaborator. Streams every turn to `on_turn` and returns the
/// last one.
#[allow(async_fn_in_trait)]
pub trait GeneralPath {
    async fn stream(
        &self,
        question: &str,
        on_turn: &mut dyn FnMut(&AgentMessage),
    ) -> Result<Option<AgentMessage>, AppError>;
}

impl CountingPath for SqlChain {
    async fn invoke(&self, question: &str) -> Result<ChainOutput, AppError> {
        SqlChain::invoke(self, question).await
    }
}

impl GeneralPath for ReactAgent {
    async fn stream(
        &self,
        question: &str,
        on_turn: &mut dyn FnMut(&AgentMessage),
    ) -> Result<Option<AgentMessage>, AppError> {
        let mut run = self.start(question);
        let mut last = None;
        while let Some(msg) = run.next().await {
            let msg = msg?;
            on_turn(&msg);
            last = Some(msg);
        }
        Ok(last)
    }
}

type TurnObserver = Box<dyn Fn(&AgentMessage) + Send + Sync>;

struct Outcome {
    answer: String,
    query: String,
    result: String,
}

pub struct Dispatcher<C, G> {
    counting: C,
    general: G,
    observer: Option<TurnObserver>,
}

impl<C: CountingPath, G: GeneralPath> Dispatcher<C, G> {
    pub fn new(counting: C, general: G) -> Self {
        Self { counting, general, observer: None }
    }

    /// Call `f` with every streamed general-path turn.
    pub fn with_turn_observer(mut self, f: impl Fn(&AgentMessage) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(f));
        self
    }

    pub fn counting(&self) -> &C {
        &self.counting
    }

    pub fn general(&self) -> &G {
        &self.general
    }

    /// Answer `state.question`. The returned state has `feedback` cleared.
    pub async fn dispatch(&self, state: &SessionState) -> SessionState {
        let route = Route::classify(&state.question);
        info!(?route, question = %state.question, "dispatching question");

        let outcome = match route {
            Route::Counting => self.run_counting(&state.question).await,
            Route::General => self.run_general(&state.question).await,
        };

        let mut next = state.clone();
        next.feedback = None;
        match outcome {
            Ok(o) => {
                next.answer = o.answer;
                next.query = Some(o.query);
                next.result = Some(o.result);
            }
            Err(e) => {
                warn!(?route, error = %e, "collaborator failed");
                next.answer = format!("Error occurred: {e}");
                next.query = Some(String::new());
                next.result = Some(String::new());
            }
        }
        next
    }

    async fn run_counting(&self, question: &str) -> Result<Outcome, AppError> {
        let output = self.counting.invoke(question).await?;
        let result = output
            .sql_result()
            .map(str::to_string)
            .unwrap_or_else(|| output.to_string());
        Ok(match Resolution::from(&output) {
            Resolution::StructuredAnswer { text, query } => Outcome { answer: text, query, result },
            Resolution::Answer(text) => Outcome { answer: text, query: String::new(), result },
        })
    }

    async fn run_general(&self, question: &str) -> Result<Outcome, AppError> {
        let mut on_turn = |msg: &AgentMessage| {
            if let Some(observer) = &self.observer {
                observer(msg);
            }
        };
        let last = self
            .general
            .stream(question, &mut on_turn)
            .await?
            .ok_or_else(|| AppError::Agent("agent produced no messages".into()))?;
        Ok(Outcome {
            answer: last.content,
            query: AGENT_QUERY_PLACEHOLDER.to_string(),
            result: AGENT_RESULT_PLACEHOLDER.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::ChainStep;
    use crate::workflow::state::Feedback;
    use std::cell::Cell;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeChain {
        calls: Cell<usize>,
        answer: Option<&'static str>,
        fail: bool,
    }

    impl CountingPath for FakeChain {
        async fn invoke(&self, question: &str) -> Result<ChainOutput, AppError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(AppError::Database("no such table: Albums".into()));
            }
            Ok(ChainOutput {
                question: question.to_string(),
                answer: self.answer.map(str::to_string),
                intermediate_steps: vec![ChainStep {
                    sql_cmd: "SELECT COUNT(*) FROM Album".into(),
                    sql_result: Some("[(1,)]".into()),
                }],
            })
        }
    }

    #[derive(Default)]
    struct FakeAgent {
        calls: Cell<usize>,
        fail: bool,
    }

    impl GeneralPath for FakeAgent {
        async fn stream(
            &self,
            question: &str,
            on_turn: &mut dyn FnMut(&AgentMessage),
        ) -> Result<Option<AgentMessage>, AppError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(AppError::Agent("model unavailable".into()));
            }
            let turns = [AgentMessage::user(question), AgentMessage::assistant("It maps playlists to tracks.")];
            for t in &turns {
                on_turn(t);
            }
            Ok(turns.last().cloned())
        }
    }

    fn chain(answer: Option<&'static str>) -> FakeChain {
        FakeChain { answer, ..FakeChain::default() }
    }

    #[tokio::test]
    async fn counting_question_uses_chain_only() {
        let d = Dispatcher::new(chain(Some("One album.")), FakeAgent::default());
        let out = d.dispatch(&SessionState::new("How many albums does Alice In Chains have?")).await;
        assert_eq!(out.answer, "One album.");
        assert_eq!(out.query.as_deref(), Some("SELECT COUNT(*) FROM Album"));
        assert_eq!(out.result.as_deref(), Some("[(1,)]"));
        assert_eq!(d.counting().calls.get(), 1);
        assert_eq!(d.general().calls.get(), 0);
    }

    #[tokio::test]
    async fn general_question_uses_agent_with_placeholders() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let d = Dispatcher::new(chain(Some("x")), FakeAgent::default()).with_turn_observer(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let out = d.dispatch(&SessionState::new("Describe the PlaylistTrack table")).await;
        assert_eq!(out.answer, "It maps playlists to tracks.");
        assert_eq!(out.query.as_deref(), Some(AGENT_QUERY_PLACEHOLDER));
        assert_eq!(out.result.as_deref(), Some(AGENT_RESULT_PLACEHOLDER));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(d.counting().calls.get(), 0);
    }

    #[tokio::test]
    async fn missing_chain_answer_falls_back_to_output_text() {
        let d = Dispatcher::new(chain(None), FakeAgent::default());
        let out = d.dispatch(&SessionState::new("how many tracks")).await;
        assert!(out.answer.contains("intermediate_steps"));
        assert_eq!(out.query.as_deref(), Some(""));
        assert_eq!(out.result.as_deref(), Some("[(1,)]"));
    }

    #[tokio::test]
    async fn failures_become_error_answers() {
        let d = Dispatcher::new(
            FakeChain { fail: true, ..FakeChain::default() },
            FakeAgent { fail: true, ..FakeAgent::default() },
        );
        for q in ["How many albums?", "List the artists"] {
            let out = d.dispatch(&SessionState::new(q)).await;
            assert!(out.answer.starts_with("Error occurred: "), "{}", out.answer);
            assert_eq!(out.query.as_deref(), Some(""));
            assert_eq!(out.result.as_deref(), Some(""));
        }
    }

    #[tokio::test]
    async fn dispatch_clears_feedback_and_keeps_question() {
        let d = Dispatcher::new(chain(Some("One.")), FakeAgent::default());
        let mut state = SessionState::new("How many albums?");
        state.feedback = Some(Feedback::Revision("be brief".into()));
        let out = d.dispatch(&state).await;
        assert_eq!(out.feedback, None);
        assert_eq!(out.question, "How many albums?");
    }
}
