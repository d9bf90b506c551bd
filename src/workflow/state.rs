//! Session state threaded through the workflow, plus routing and the
//! normalized collaborator result.

use serde::{Deserialize, Serialize};

use crate::agents::ChainOutput;

/// Reviewer verdict on an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Approved,
    Revision(String),
}

/// Per-question state. Created fresh for each question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub question: String,
    pub query: Option<String>,
    pub result: Option<String>,
    pub answer: String,
    pub feedback: Option<Feedback>,
}

impl SessionState {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), ..Self::default() }
    }

    pub fn is_approved(&self) -> bool {
        self.feedback == Some(Feedback::Approved)
    }
}

/// Which collaborator answers a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// SQL chain; questions starting with "how many".
    Counting,
    /// Tool-using agent; everything else.
    General,
}

impl Route {
    pub fn classify(question: &str) -> Self {
        if question.trim().to_lowercase().starts_with("how many") {
            Route::Counting
        } else {
            Route::General
        }
    }
}

/// Collaborator output normalized at the dispatcher boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Answer(String),
    StructuredAnswer { text: String, query: String },
}

impl From<&ChainOutput> for Resolution {
    fn from(out: &ChainOutput) -> Self {
        match &out.answer {
            Some(text) => Resolution::StructuredAnswer {
                text: text.clone(),
                query: out.generated_query().unwrap_or_default().to_string(),
            },
            None => Resolution::Answer(out.to_string()),
        }
    }
}
