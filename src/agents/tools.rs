//! SQL toolkit: the tools the ReAct agent may call.
//!
//! Tool failures never abort the agent run: they come back as an
//! `Error: ...` observation so the model can rewrite its input and retry.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::agents::chain::{extract_sql_query, strip_code_fence};
use crate::agents::prompt::{self, PromptBuilder};
use crate::db::Database;
use crate::error::AppError;
use crate::llm::LlmProvider;
use crate::lookup::ProperNounIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlTool {
    ListTables,
    Schema,
    Query,
    QueryChecker,
    SearchProperNouns,
}

impl SqlTool {
    pub const ALL: [SqlTool; 5] = [
        SqlTool::Query,
        SqlTool::Schema,
        SqlTool::ListTables,
        SqlTool::QueryChecker,
        SqlTool::SearchProperNouns,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SqlTool::ListTables => "sql_db_list_tables",
            SqlTool::Schema => "sql_db_schema",
            SqlTool::Query => "sql_db_query",
            SqlTool::QueryChecker => "sql_db_query_checker",
            SqlTool::SearchProperNouns => "search_proper_nouns",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SqlTool::ListTables => {
                "Input is an empty string, output is a comma-separated list of tables in the database."
            }
            SqlTool::Schema => {
                "Input to this tool is a comma-separated list of tables, output is the schema and sample rows for those tables. Be sure that the tables actually exist by calling sql_db_list_tables first! Example Input: table1, table2, table3"
            }
            SqlTool::Query => {
                "Input to this tool is a detailed and correct SQL query, output is a result from the database. If the query is not correct, an error message will be returned. If an error is returned, rewrite the query, check the query, and try again. If you encounter an issue with an unknown column, use sql_db_schema to query the correct table fields."
            }
            SqlTool::QueryChecker => {
                "Use this tool to double check if your query is correct before executing it. Always use this tool before executing a query with sql_db_query!"
            }
            SqlTool::SearchProperNouns => {
                "Use to look up values to filter on. Input is an approximate spelling of the proper noun, output is valid proper nouns. Use the noun most similar to the search."
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name.trim())
    }
}

/// Shared handles the tools run against.
#[derive(Debug, Clone)]
pub struct Toolkit {
    db: Arc<Database>,
    llm: LlmProvider,
    lookup: Option<Arc<ProperNounIndex>>,
    lookup_k: usize,
    prompts_dir: PathBuf,
}

impl Toolkit {
    pub fn new(
        db: Arc<Database>,
        llm: LlmProvider,
        lookup: Option<Arc<ProperNounIndex>>,
        lookup_k: usize,
        prompts_dir: impl Into<PathBuf>,
    ) -> Self {
        Self { db, llm, lookup, lookup_k, prompts_dir: prompts_dir.into() }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn has_lookup(&self) -> bool {
        self.lookup.is_some()
    }

    /// Tools available to the agent; the lookup tool only when an index exists.
    pub fn tools(&self) -> Vec<SqlTool> {
        SqlTool::ALL
            .into_iter()
            .filter(|t| *t != SqlTool::SearchProperNouns || self.lookup.is_some())
            .collect()
    }

    /// Resolve a tool by name among the available ones.
    pub fn resolve(&self, name: &str) -> Option<SqlTool> {
        SqlTool::from_name(name).filter(|t| self.tools().contains(t))
    }

    /// Run `tool` on `input`, rendering any failure as an observation.
    pub async fn invoke(&self, tool: SqlTool, input: &str) -> String {
        let input = clean_input(input);
        debug!(tool = tool.name(), %input, "invoking tool");
        match self.try_invoke(tool, &input).await {
            Ok(out) => out,
            Err(e) => {
                debug!(tool = tool.name(), error = %e, "tool failed");
                format!("Error: {e}")
            }
        }
    }

    async fn try_invoke(&self, tool: SqlTool, input: &str) -> Result<String, AppError> {
        match tool {
            SqlTool::ListTables => Ok(self.db.usable_table_names()?.join(", ")),
            SqlTool::Schema => {
                let tables: Vec<String> = input
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                if tables.is_empty() {
                    return Err(AppError::Agent("expected a comma-separated list of tables".into()));
                }
                self.db.table_info(Some(&tables))
            }
            SqlTool::Query => self.db.run(&strip_code_fence(input)),
            SqlTool::QueryChecker => {
                let prompt = PromptBuilder::new(&self.prompts_dir)
                    .template(prompt::QUERY_CHECKER)
                    .var("query", strip_code_fence(input))
                    .var("dialect", self.db.dialect_label())
                    .build();
                let reply = self.llm.complete(&prompt, None).await?;
                Ok(extract_sql_query(&reply.text))
            }
            SqlTool::SearchProperNouns => {
                let index = self
                    .lookup
                    .as_ref()
                    .ok_or_else(|| AppError::Lookup("proper-noun index is disabled".into()))?;
                let hits = index.search(input, self.lookup_k).await?;
                Ok(hits.into_iter().map(|h| h.name).collect::<Vec<_>>().join("\n"))
            }
        }
    }
}

/// Strip the quoting models like to wrap tool input in.
fn clean_input(input: &str) -> String {
    let mut s = input.trim();
    for (open, close) in [("\"", "\""), ("'", "'"), ("`", "`")] {
        if s.len() >= 2 && s.starts_with(open) && s.ends_with(close) && !s.starts_with("```") {
            s = s[open.len()..s.len() - close.len()].trim();
        }
    }
    s.to_string()
}
