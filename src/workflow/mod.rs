//! Question-answering workflow with a human approval loop.
//!
//! ```text
//!   DISPATCH ──► REVIEW ──(approved)──► DONE
//!       ▲           │
//!       └─(revise)──┘
//! ```

pub mod controller;
pub mod dispatcher;
pub mod feedback;
pub mod state;

pub use controller::{Phase, Workflow, drive};
pub use dispatcher::{
    AGENT_QUERY_PLACEHOLDER, AGENT_RESULT_PLACEHOLDER, CountingPath, Dispatcher, GeneralPath,
};
pub use feedback::{Reviewer, ScriptedReviewer};
pub use state::{Feedback, Resolution, Route, SessionState};
