//! Workflow controller: the DISPATCH → REVIEW → (DONE | DISPATCH) cycle.
//!
//! The controller never blocks on the reviewer itself. `review` is a
//! suspension point: an outer driver ([`drive`] or the console) fetches input
//! and resumes the workflow with it.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::error::AppError;
use crate::workflow::dispatcher::{CountingPath, Dispatcher, GeneralPath};
use crate::workflow::feedback::{self, Reviewer};
use crate::workflow::state::{Feedback, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Dispatch,
    Review,
    Done,
}

/// One question's run through the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    thread_id: String,
    phase: Phase,
    state: SessionState,
    /// Completed dispatch cycles.
    dispatches: u32,
    /// Revision texts in the order they were given. Not fed back to dispatch.
    revisions: Vec<String>,
}

impl Workflow {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            thread_id: Uuid::now_v7().to_string(),
            phase: Phase::Dispatch,
            state: SessionState::new(question),
            dispatches: 0,
            revisions: Vec::new(),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn dispatches(&self) -> u32 {
        self.dispatches
    }

    pub fn revisions(&self) -> &[String] {
        &self.revisions
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// DISPATCH → REVIEW.
    pub async fn dispatch<C, G>(&mut self, dispatcher: &Dispatcher<C, G>) -> Result<(), AppError>
    where
        C: CountingPath,
        G: GeneralPath,
    {
        self.expect_phase(Phase::Dispatch, "dispatch")?;
        self.state = dispatcher.dispatch(&self.state).await;
        self.dispatches += 1;
        self.phase = Phase::Review;
        info!(thread_id = %self.thread_id, cycle = self.dispatches, "answer ready for review");
        Ok(())
    }

    /// REVIEW → DONE on approval, REVIEW → DISPATCH otherwise.
    pub fn review(&mut self, input: &str) -> Result<Phase, AppError> {
        self.expect_phase(Phase::Review, "review")?;
        let verdict = feedback::parse_feedback(input);
        match &verdict {
            Feedback::Approved => {
                self.phase = Phase::Done;
                info!(thread_id = %self.thread_id, cycles = self.dispatches, "answer approved");
            }
            Feedback::Revision(text) => {
                self.revisions.push(text.clone());
                self.phase = Phase::Dispatch;
                info!(thread_id = %self.thread_id, revision = %text, "revision requested, re-dispatching");
            }
        }
        self.state.feedback = Some(verdict);
        Ok(self.phase)
    }

    fn expect_phase(&self, want: Phase, op: &str) -> Result<(), AppError> {
        if self.phase != want {
            return Err(AppError::Workflow(format!(
                "cannot {op} in phase {:?}",
                self.phase
            )));
        }
        Ok(())
    }
}

/// Run `workflow` to DONE, asking `reviewer` at every review point and
/// saving a checkpoint after each transition when a store is given.
pub async fn drive<C, G, R>(
    workflow: &mut Workflow,
    dispatcher: &Dispatcher<C, G>,
    reviewer: &mut R,
    checkpoints: Option<&CheckpointStore>,
) -> Result<(), AppError>
where
    C: CountingPath,
    G: GeneralPath,
    R: Reviewer,
{
    loop {
        match workflow.phase() {
            Phase::Dispatch => workflow.dispatch(dispatcher).await?,
            Phase::Review => {
                let input = reviewer.review(workflow.state()).await?;
                workflow.review(&input)?;
            }
            Phase::Done => return Ok(()),
        }
        if let Some(store) = checkpoints {
            store.save(workflow)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentMessage, ChainOutput, ChainStep};
    use crate::workflow::feedback::ScriptedReviewer;
    use tempfile::TempDir;

    struct Chain;

    impl CountingPath for Chain {
        async fn invoke(&self, question: &str) -> Result<ChainOutput, AppError> {
            Ok(ChainOutput {
                question: question.into(),
                answer: Some("Three.".into()),
                intermediate_steps: vec![ChainStep { sql_cmd: "SELECT COUNT(*) FROM Album".into(), sql_result: Some("[(3,)]".into()) }],
            })
        }
    }

    struct Agent;

    impl GeneralPath for Agent {
        async fn stream(
            &self,
            _question: &str,
            _on_turn: &mut dyn FnMut(&AgentMessage),
        ) -> Result<Option<AgentMessage>, AppError> {
            Ok(Some(AgentMessage::assistant("described")))
        }
    }

    fn dispatcher() -> Dispatcher<Chain, Agent> {
        Dispatcher::new(Chain, Agent)
    }

    #[tokio::test]
    async fn approve_on_first_answer() {
        let mut wf = Workflow::new("How many albums?");
        wf.dispatch(&dispatcher()).await.unwrap();
        assert_eq!(wf.phase(), Phase::Review);
        assert_eq!(wf.review("yes").unwrap(), Phase::Done);
        assert!(wf.is_done());
        assert_eq!(wf.state().feedback, Some(Feedback::Approved));
        assert_eq!(wf.dispatches(), 1);
    }

    #[tokio::test]
    async fn revision_loops_back_with_same_question() {
        let d = dispatcher();
        let mut wf = Workflow::new("How many albums?");
        wf.dispatch(&d).await.unwrap();
        assert_eq!(wf.review("count only rock albums").unwrap(), Phase::Dispatch);
        assert_eq!(wf.state().question, "How many albums?");
        assert_eq!(wf.revisions(), ["count only rock albums".to_string()]);
        assert_eq!(wf.state().feedback, Some(Feedback::Revision("count only rock albums".into())));

        wf.dispatch(&d).await.unwrap();
        assert_eq!(wf.state().feedback, None);
        assert_eq!(wf.state().question, "How many albums?");
        assert_eq!(wf.dispatches(), 2);
    }

    #[tokio::test]
    async fn review_only_records_feedback() {
        let mut wf = Workflow::new("How many albums?");
        wf.dispatch(&dispatcher()).await.unwrap();
        let before = wf.state().clone();
        wf.review("Yes").unwrap();
        assert!(wf.state().is_approved());
        assert_eq!(SessionState { feedback: None, ..wf.state().clone() }, before);
    }

    #[tokio::test]
    async fn wrong_phase_is_an_error() {
        let mut wf = Workflow::new("q");
        assert!(matches!(wf.review("yes"), Err(AppError::Workflow(_))));
        wf.dispatch(&dispatcher()).await.unwrap();
        assert!(wf.dispatch(&dispatcher()).await.is_err());
        wf.review("YES").unwrap();
        assert!(wf.review("yes").is_err());
        assert!(wf.dispatch(&dispatcher()).await.is_err());
    }

    #[tokio::test]
    async fn drive_runs_until_approved_and_checkpoints() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let mut reviewer = ScriptedReviewer::new(["no", "", "Yes"]);
        let mut wf = Workflow::new("Describe the Album table");

        drive(&mut wf, &dispatcher(), &mut reviewer, Some(&store)).await.unwrap();

        assert!(wf.is_done());
        assert_eq!(wf.dispatches(), 3);
        assert_eq!(wf.revisions(), ["no".to_string(), String::new()]);
        assert_eq!(reviewer.reviewed().len(), 3);
        assert!(reviewer.reviewed().iter().all(|s| s.answer == "described"));

        let saved = store.load(wf.thread_id()).unwrap();
        assert_eq!(saved.workflow.phase(), Phase::Done);
        assert!(saved.workflow.state().is_approved());
    }

    #[tokio::test]
    async fn drive_propagates_closed_reviewer() {
        let mut reviewer = ScriptedReviewer::default();
        let mut wf = Workflow::new("q");
        let err = drive(&mut wf, &dispatcher(), &mut reviewer, None).await.unwrap_err();
        assert!(err.to_string().contains("reviewer input closed"));
        assert_eq!(wf.phase(), Phase::Review);
    }
}
