//! Three-step query pipeline: write a query, execute it, phrase the answer.
//!
//! Unlike the workflow there is no routing and no review loop; the console
//! asks once whether the written query may run.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::agents::chain::extract_sql_query;
use crate::agents::prompt::{self, PromptBuilder};
use crate::db::Database;
use crate::error::AppError;
use crate::llm::LlmProvider;

#[derive(Debug, Deserialize)]
struct QueryOutput {
    query: String,
}

#[derive(Debug, Clone)]
pub struct QueryPipeline {
    llm: LlmProvider,
    db: Arc<Database>,
    top_k: usize,
    prompts_dir: PathBuf,
}

impl QueryPipeline {
    pub fn new(llm: LlmProvider, db: Arc<Database>, top_k: usize, prompts_dir: impl Into<PathBuf>) -> Self {
        Self { llm, db, top_k, prompts_dir: prompts_dir.into() }
    }

    /// Ask the model for a query answering `question`.
    pub async fn write_query(&self, question: &str) -> Result<String, AppError> {
        let system = PromptBuilder::new(&self.prompts_dir)
            .template(prompt::WRITE_QUERY)
            .var("dialect", self.db.dialect_label())
            .var("top_k", self.top_k.to_string())
            .var("table_info", self.db.table_info(None)?)
            .build();
        let reply = self.llm.complete(&format!("Question: {question}"), Some(&system)).await?;
        let query = parse_query_reply(&reply.text);
        if query.is_empty() {
            return Err(AppError::Agent("model returned no SQL query".into()));
        }
        info!(%query, "pipeline wrote query");
        Ok(query)
    }

    /// Run `query`; a failure is returned as `Error: ...` text.
    pub fn execute_query(&self, query: &str) -> String {
        match self.db.run(query) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "pipeline query failed");
                format!("Error: {e}")
            }
        }
    }

    pub async fn generate_answer(&self, question: &str, query: &str, result: &str) -> Result<String, AppError> {
        let prompt = PromptBuilder::new(&self.prompts_dir)
            .template(prompt::GENERATE_ANSWER)
            .var("question", question)
            .var("query", query)
            .var("result", result)
            .build();
        let reply = self.llm.complete(&prompt, None).await?;
        Ok(reply.text.trim().to_string())
    }
}

/// `{"query": "..."}` when the reply is JSON, possibly fenced; plain SQL otherwise.
fn parse_query_reply(text: &str) -> String {
    let trimmed = text.trim();
    let candidate = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.trim().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    match serde_json::from_str::<QueryOutput>(candidate) {
        Ok(out) => out.query.trim().to_string(),
        Err(e) => {
            debug!(error = %e, "query reply is not JSON, extracting SQL");
            extract_sql_query(trimmed)
        }
    }
}
