//! Feedback gate: turn reviewer input into a [`Feedback`] verdict.

use std::collections::VecDeque;

use crate::error::AppError;
use crate::workflow::state::{Feedback, SessionState};

/// `"yes"` in any letter case approves; anything else is a revision, verbatim.
pub fn parse_feedback(input: &str) -> Feedback {
    if input.eq_ignore_ascii_case("yes") {
        Feedback::Approved
    } else {
        Feedback::Revision(input.to_string())
    }
}

/// Source of reviewer input; the workflow suspends on it.
#[allow(async_fn_in_trait)]
pub trait Reviewer {
    /// Show `state.answer` and return the reviewer's reply.
    async fn review(&mut self, state: &SessionState) -> Result<String, AppError>;
}

/// Reviewer that replays canned replies and remembers what it was shown.
#[derive(Debug, Default)]
pub struct ScriptedReviewer {
    replies: VecDeque<String>,
    reviewed: Vec<SessionState>,
}

impl ScriptedReviewer {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { replies: replies.into_iter().map(Into::into).collect(), reviewed: Vec::new() }
    }

    /// States presented for review, in order.
    pub fn reviewed(&self) -> &[SessionState] {
        &self.reviewed
    }
}

impl Reviewer for ScriptedReviewer {
    async fn review(&mut self, state: &SessionState) -> Result<String, AppError> {
        self.reviewed.push(state.clone());
        self.replies
            .pop_front()
            .ok_or_else(|| AppError::Workflow("reviewer input closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_in_any_case_approves() {
        for s in ["yes", "YES", "Yes", "yEs"] {
            assert_eq!(parse_feedback(s), Feedback::Approved);
        }
    }

    #[test]
    fn other_text_is_kept_verbatim() {
        assert_eq!(parse_feedback("no"), Feedback::Revision("no".into()));
        assert_eq!(parse_feedback("yes please"), Feedback::Revision("yes please".into()));
        assert_eq!(parse_feedback(" Use LIMIT 3 "), Feedback::Revision(" Use LIMIT 3 ".into()));
        assert_eq!(parse_feedback(""), Feedback::Revision(String::new()));
    }

    #[tokio::test]
    async fn scripted_reviewer_runs_dry() {
        let mut r = ScriptedReviewer::new(["no"]);
        let s = SessionState::new("q");
        assert_eq!(r.review(&s).await.unwrap(), "no");
        assert!(r.review(&s).await.is_err());
        assert_eq!(r.reviewed().len(), 2);
    }
}
