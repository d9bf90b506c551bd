//! SQL database chain: write one query, run it, phrase the answer.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::agents::prompt::{self, PromptBuilder};
use crate::db::Database;
use crate::error::AppError;
use crate::llm::LlmProvider;

/// One executed statement and what it returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainStep {
    pub sql_cmd: String,
    pub sql_result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainOutput {
    pub question: String,
    pub answer: Option<String>,
    pub intermediate_steps: Vec<ChainStep>,
}

impl ChainOutput {
    /// SQL of the last executed step.
    pub fn generated_query(&self) -> Option<&str> {
        self.intermediate_steps.last().map(|s| s.sql_cmd.as_str())
    }

    /// Raw result of the last executed step.
    pub fn sql_result(&self) -> Option<&str> {
        self.intermediate_steps.last().and_then(|s| s.sql_result.as_deref())
    }
}

impl fmt::Display for ChainOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlChain {
    llm: LlmProvider,
    db: Arc<Database>,
    top_k: usize,
    prompts_dir: PathBuf,
}

impl SqlChain {
    pub fn new(llm: LlmProvider, db: Arc<Database>, top_k: usize, prompts_dir: impl Into<PathBuf>) -> Self {
        Self { llm, db, top_k, prompts_dir: prompts_dir.into() }
    }

    pub async fn invoke(&self, question: &str) -> Result<ChainOutput, AppError> {
        let table_info = self.db.table_info(None)?;
        let prompt = PromptBuilder::new(&self.prompts_dir)
            .template(prompt::SQL_CHAIN)
            .var("dialect", self.db.dialect_label())
            .var("top_k", self.top_k.to_string())
            .var("table_info", table_info)
            .var("input", format!("{question}\nSQLQuery: "))
            .build();

        let reply = self.llm.complete(&prompt, None).await?;
        let sql_cmd = extract_sql_query(&reply.text);
        if sql_cmd.is_empty() {
            return Err(AppError::Agent("model returned no SQL query".into()));
        }
        info!(%sql_cmd, "chain generated query");

        let sql_result = self.db.run(&sql_cmd)?;
        debug!(result = %sql_result, "chain query result");

        let answer_prompt = format!("{prompt}{sql_cmd}\nSQLResult: {sql_result}\nAnswer:");
        let reply = self.llm.complete(&answer_prompt, None).await?;
        let answer = extract_answer(&reply.text);

        Ok(ChainOutput {
            question: question.to_string(),
            answer: (!answer.is_empty()).then_some(answer),
            intermediate_steps: vec![ChainStep { sql_cmd, sql_result: Some(sql_result) }],
        })
    }
}

/// Pull the SQL statement out of a model reply.
///
/// Takes the text after `SQLQuery:` (or the whole reply) up to `SQLResult:`
/// or `Answer:`, then unwraps a Markdown code fence if present.
pub fn extract_sql_query(response: &str) -> String {
    let response = response.trim();
    let body = match response.find("SQLQuery:") {
        Some(start) => &response[start + "SQLQuery:".len()..],
        None => response,
    };
    let end = body
        .find("SQLResult:")
        .or_else(|| body.find("Answer:"))
        .unwrap_or(body.len());
    strip_code_fence(body[..end].trim())
}

/// Unwrap a Markdown code fence, dropping an info string such as `sql`.
pub(crate) fn strip_code_fence(text: &str) -> String {
    let Some(rest) = text.strip_prefix("```") else {
        return text.to_string();
    };
    let rest = match rest.find('\n') {
        Some(nl) if !rest[..nl].trim().contains(' ') => &rest[nl + 1..],
        _ => rest,
    };
    let inner = match rest.rfind("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    inner.trim().to_string()
}

/// The answer text from the second completion, without a repeated marker or
/// any follow-up question the model invents.
fn extract_answer(text: &str) -> String {
    let text = text.trim();
    let text = match text.rfind("Answer:") {
        Some(i) => &text[i + "Answer:".len()..],
        None => text,
    };
    let text = match text.find("\nQuestion:") {
        Some(i) => &text[..i],
        None => text,
    };
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_fixture;
    use crate::llm::providers::scripted::ScriptedProvider;
    use tempfile::TempDir;

    fn chain(dir: &TempDir, llm: &ScriptedProvider) -> SqlChain {
        let uri = create_fixture(dir.path());
        let db = Arc::new(Database::open_uri(&uri, true, 3).unwrap());
        SqlChain::new(LlmProvider::Scripted(llm.clone()), db, 5, dir.path().join("prompts"))
    }

    #[test]
    fn extract_with_marker() {
        let sql = extract_sql_query("SQLQuery: SELECT * FROM users LIMIT 5\nSQLResult: ...");
        assert_eq!(sql, "SELECT * FROM users LIMIT 5");
    }

    #[test]
    fn extract_without_marker() {
        assert_eq!(extract_sql_query("SELECT 1"), "SELECT 1");
        assert_eq!(
            extract_sql_query("SELECT COUNT(*) FROM users\nAnswer: There are 100 users"),
            "SELECT COUNT(*) FROM users"
        );
    }

    #[test]
    fn extract_strips_fences() {
        assert_eq!(extract_sql_query("```sql\nSELECT 1;\n```"), "SELECT 1;");
        assert_eq!(extract_sql_query("SQLQuery: ```SELECT 2```"), "SELECT 2");
    }

    #[test]
    fn answer_drops_marker_and_trailing_question() {
        assert_eq!(extract_answer("Answer: Three.\nQuestion: next?"), "Three.");
        assert_eq!(extract_answer("  Plain text.  "), "Plain text.");
    }

    #[tokio::test]
    async fn counts_albums() {
        let dir = TempDir::new().unwrap();
        let llm = ScriptedProvider::new([
            "SELECT COUNT(*) FROM \"Album\" WHERE \"ArtistId\" = 5",
            "Alice In Chains has 1 album.",
        ]);
        let out = chain(&dir, &llm)
            .invoke("How many Albums does Alice in Chains have?")
            .await
            .unwrap();

        assert_eq!(out.answer.as_deref(), Some("Alice In Chains has 1 album."));
        assert_eq!(out.generated_query(), Some("SELECT COUNT(*) FROM \"Album\" WHERE \"ArtistId\" = 5"));
        assert_eq!(out.sql_result(), Some("[(1,)]"));

        let prompts = llm.prompts();
        assert!(prompts[0].content.contains("CREATE TABLE Album"));
        assert!(prompts[0].content.ends_with("Question: How many Albums does Alice in Chains have?\nSQLQuery: "));
        assert!(prompts[1].content.ends_with("SQLResult: [(1,)]\nAnswer:"));
    }

    #[tokio::test]
    async fn empty_answer_becomes_none() {
        let dir = TempDir::new().unwrap();
        let llm = ScriptedProvider::new(["SELECT COUNT(*) FROM Artist", "   "]);
        let out = chain(&dir, &llm).invoke("How many artists?").await.unwrap();
        assert_eq!(out.answer, None);
        assert_eq!(out.intermediate_steps.len(), 1);
    }

    #[tokio::test]
    async fn bad_sql_propagates() {
        let dir = TempDir::new().unwrap();
        let llm = ScriptedProvider::new(["SELECT COUNT(*) FROM Albums"]);
        let err = chain(&dir, &llm).invoke("How many albums?").await.unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn display_is_json() {
        let out = ChainOutput {
            question: "q".into(),
            answer: None,
            intermediate_steps: vec![ChainStep { sql_cmd: "SELECT 1".into(), sql_result: Some("[(1,)]".into()) }],
        };
        let v: serde_json::Value = serde_json::from_str(&out.to_string()).unwrap();
        assert_eq!(v["intermediate_steps"][0]["sql_cmd"], "SELECT 1");
        assert!(v["answer"].is_null());
    }
}
