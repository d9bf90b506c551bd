//! Layered prompt builder and the built-in prompt templates.
//!
//! Every template has a built-in default below and can be overridden by a file
//! of the same name in the configured prompts directory (`config/prompts/` by
//! default). Layers are joined with a blank line.
//!
//! Variable substitution uses `{{key}}` syntax and is applied once at
//! [`build()`](PromptBuilder::build) time, after all layers are joined.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

const SEPARATOR: &str = "\n\n";

// ── Template names (override file names) ─────────────────────────────────────

pub const SQL_AGENT: &str = "sql_agent.md";
pub const PROPER_NOUNS: &str = "proper_nouns.md";
pub const REACT_FORMAT: &str = "react_format.md";
pub const SQL_CHAIN: &str = "sql_chain.md";
pub const QUERY_CHECKER: &str = "query_checker.md";
pub const WRITE_QUERY: &str = "write_query.md";
pub const GENERATE_ANSWER: &str = "generate_answer.md";

/// Built-in text for a template name.
pub fn default_template(name: &str) -> &'static str {
    match name {
        SQL_AGENT => SQL_AGENT_DEFAULT,
        PROPER_NOUNS => PROPER_NOUNS_DEFAULT,
        REACT_FORMAT => REACT_FORMAT_DEFAULT,
        SQL_CHAIN => SQL_CHAIN_DEFAULT,
        QUERY_CHECKER => QUERY_CHECKER_DEFAULT,
        WRITE_QUERY => WRITE_QUERY_DEFAULT,
        GENERATE_ANSWER => GENERATE_ANSWER_DEFAULT,
        _ => "",
    }
}

const SQL_AGENT_DEFAULT: &str = "\
You are an agent designed to interact with a SQL database.
Given an input question, create a syntactically correct {{dialect}} query to run,
then look at the results of the query and return the answer. Unless the user
specifies a specific number of examples they wish to obtain, always limit your
query to at most {{top_k}} results.

You can order the results by a relevant column to return the most interesting
examples in the database. Never query for all the columns from a specific table,
only ask for the relevant columns given the question.

You MUST double check your query before executing it. If you get an error while
executing a query, rewrite the query and try again.

DO NOT make any DML statements (INSERT, UPDATE, DELETE, DROP etc.) to the
database.

To start you should ALWAYS look at the tables in the database to see what you
can query. Do NOT skip this step.

Then you should query the schema of the most relevant tables.";

const PROPER_NOUNS_DEFAULT: &str = "\
If you need to filter on a proper noun like a Name, you must ALWAYS first look up
the filter value using the 'search_proper_nouns' tool! Do not try to guess at the
proper name - use this function to find similar ones.";

const REACT_FORMAT_DEFAULT: &str = "\
Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{{tool_names}}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

Write only one Action per reply and stop after its Action Input. The Observation
will be provided to you.";

const SQL_CHAIN_DEFAULT: &str = "\
You are a {{dialect}} expert. Given an input question, first create a syntactically correct {{dialect}} query to run, then look at the results of the query and return the answer to the input question.
Unless the user specifies in the question a specific number of examples to obtain, query for at most {{top_k}} results using the LIMIT clause. You can order the results to return the most informative data in the database.
Never query for all columns from a table. You must query only the columns that are needed to answer the question. Wrap each column name in double quotes (\") to denote them as delimited identifiers.
Pay attention to use only the column names you can see in the tables below. Be careful to not query for columns that do not exist. Also, pay attention to which column is in which table.
Pay attention to use date('now') function to get the current date, if the question involves \"today\".

Use the following format:

Question: Question here
SQLQuery: SQL Query to run
SQLResult: Result of the SQLQuery
Answer: Final answer here

Only use the following tables:
{{table_info}}

Question: {{input}}";

const QUERY_CHECKER_DEFAULT: &str = "\
{{query}}
Double check the {{dialect}} query above for common mistakes, including:
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using the proper columns for joins

If there are any of the above mistakes, rewrite the query. If there are no mistakes, just reproduce the original query.

Output the final SQL query only.

SQL Query: ";

const WRITE_QUERY_DEFAULT: &str = "\
Given an input question, create a syntactically correct {{dialect}} query to
run to help find the answer. Unless the user specifies in his question a
specific number of examples they wish to obtain, always limit your query to
at most {{top_k}} results. You can order the results by a relevant column to
return the most interesting examples in the database.

Never query for all the columns from a specific table, only ask for a the
few relevant columns given the question.

Pay attention to use only the column names that you can see in the schema
description. Be careful to not query for columns that do not exist. Also,
pay attention to which column is in which table.

Only use the following tables:
{{table_info}}

Respond with a JSON object of the form {\"query\": \"<syntactically valid SQL query>\"} and nothing else.";

const GENERATE_ANSWER_DEFAULT: &str = "\
Given the following user question, corresponding SQL query, and SQL result, answer the user question.

Question: {{question}}
SQL Query: {{query}}
SQL Result: {{result}}";

// ── Builder ──────────────────────────────────────────────────────────────────

/// Fluent builder that assembles a layered prompt.
pub struct PromptBuilder {
    prompts_dir: PathBuf,
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    /// Create a builder rooted at `prompts_dir` (e.g. `"config/prompts"`).
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self { prompts_dir: prompts_dir.into(), parts: Vec::new(), vars: HashMap::new() }
    }

    /// Append the named template: the override file if one exists, else the
    /// built-in default.
    pub fn template(mut self, name: &str) -> Self {
        let path = self.prompts_dir.join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => {
                tracing::debug!("prompt: using override {}", path.display());
                text
            }
            Err(_) => default_template(name).to_string(),
        };
        self.push(text);
        self
    }

    /// Render a tool catalogue (`name: description` per line) and register
    /// `{{tool_names}}` as the comma-separated name list.
    pub fn with_tools(mut self, tools: &[(&str, &str)]) -> Self {
        let names: Vec<&str> = tools.iter().map(|(n, _)| *n).collect();
        let listing: Vec<String> = tools.iter().map(|(n, d)| format!("{n}: {d}")).collect();
        if !listing.is_empty() {
            self.push(format!("You have access to the following tools:\n\n{}", listing.join("\n")));
        }
        self.vars.insert("tool_names".to_string(), names.join(", "));
        self
    }

    /// Register a single variable.
    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Assemble all layers, join with blank lines, and apply variable substitution.
    pub fn build(self) -> String {
        substitute(&self.parts.join(SEPARATOR), &self.vars)
    }

    fn push(&mut self, text: String) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
    }
}

/// Replace each `{{key}}` in `template` with its value in one left-to-right
/// pass. Substituted text is never rescanned; unknown keys are left as is.
fn substitute(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}").and_then(|close| vars.get(&after[..close]).map(|v| (close, v))) {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_template_used_without_override() {
        let dir = TempDir::new().unwrap();
        let result = PromptBuilder::new(dir.path())
            .template(SQL_AGENT)
            .var("dialect", "SQLite")
            .var("top_k", "5")
            .build();
        assert!(result.starts_with("You are an agent designed to interact with a SQL database."));
        assert!(result.contains("correct SQLite query"));
        assert!(result.contains("at most 5 results"));
        assert!(!result.contains("{{"));
    }

    #[test]
    fn override_file_replaces_default() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PROPER_NOUNS), "Always spell-check {{thing}}.\n").unwrap();
        let result = PromptBuilder::new(dir.path())
            .template(PROPER_NOUNS)
            .var("thing", "names")
            .build();
        assert_eq!(result, "Always spell-check names.");
    }

    #[test]
    fn layers_join_with_blank_line() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SQL_AGENT), "first\n").unwrap();
        fs::write(dir.path().join(PROPER_NOUNS), "   ").unwrap();
        fs::write(dir.path().join(REACT_FORMAT), "second").unwrap();
        let result = PromptBuilder::new(dir.path())
            .template(SQL_AGENT)
            .template(PROPER_NOUNS)
            .template(REACT_FORMAT)
            .build();
        assert_eq!(result, "first\n\nsecond");
    }

    #[test]
    fn tools_render_catalogue_and_names() {
        let result = PromptBuilder::new("/nonexistent")
            .with_tools(&[("sql_db_query", "run sql"), ("sql_db_schema", "describe tables")])
            .template(REACT_FORMAT)
            .build();
        assert!(result.contains("sql_db_query: run sql\nsql_db_schema: describe tables"));
        assert!(result.contains("should be one of [sql_db_query, sql_db_schema]"));
    }

    #[test]
    fn unknown_template_contributes_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PROPER_NOUNS), "x").unwrap();
        let result = PromptBuilder::new(dir.path()).template("nope.md").template(PROPER_NOUNS).build();
        assert_eq!(result, "x");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        for _ in 0..50 {
            let result = PromptBuilder::new("/nonexistent")
                .template(SQL_CHAIN)
                .var("dialect", "SQLite")
                .var("top_k", "5")
                .var("table_info", "CREATE TABLE t ({{input}})")
                .var("input", "How many rows does {{dialect}} have?\nSQLQuery: ")
                .build();
            assert!(result.contains("Question: How many rows does {{dialect}} have?"));
            assert!(result.contains("CREATE TABLE t ({{input}})"));
        }
    }

    #[test]
    fn unknown_and_unclosed_placeholders_stay_literal() {
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), "1".to_string());
        assert_eq!(substitute("{{a}} {{b}} {{a", &vars), "1 {{b}} {{a");
    }
}
