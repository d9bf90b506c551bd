//! Terminal driver: reads lines from stdin and prints to stdout.
//!
//! Three modes share one line reader:
//! - interactive: question → workflow → review loop, until `exit` or EOF
//! - pipeline: question → written query → execute on approval → answer
//! - inspect: dialect, tables and a sample query, then exit
//! - checkpoints: list saved workflow threads, or resume one at its saved phase
//!
//! The console is also the terminal [`Reviewer`]: the workflow suspends on it
//! at every review point.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::context::AppContext;
use crate::db::Database;
use crate::error::AppError;
use crate::pipeline::QueryPipeline;
use crate::workflow::{Reviewer, SessionState, Workflow, drive};

const BANNER: &str = "Interactive SQL Agent with Feedback. Type 'exit' to quit.";
const QUESTION_PROMPT: &str = "Enter your question: ";
const APPROVAL_PROMPT: &str = "Do you approve this answer? (yes/no) or type a suggestion: ";
const EXECUTE_PROMPT: &str = "Do you want to go to execute query? (yes/no): ";
const END_OF_RESPONSE: &str = "--- End of response ---";
const SAMPLE_ROWS: usize = 10;

pub struct Console<R, W> {
    lines: Lines<R>,
    out: W,
}

impl Console<BufReader<Stdin>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), std::io::stdout())
    }
}

impl<R: AsyncBufRead + Unpin, W: Write> Console<R, W> {
    pub fn new(reader: R, out: W) -> Self {
        Self { lines: reader.lines(), out }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Print `text`, then read one trimmed line. `None` on EOF.
    async fn prompt(&mut self, text: &str) -> Result<Option<String>, AppError> {
        write!(self.out, "{text}")?;
        self.out.flush()?;
        let line = self.lines.next_line().await?;
        Ok(line.map(|l| l.trim().to_string()))
    }

    /// `None` when the user is done (EOF or `exit`).
    async fn next_question(&mut self) -> Result<Option<String>, AppError> {
        loop {
            let Some(question) = self.prompt(QUESTION_PROMPT).await? else {
                info!("stdin closed");
                return Ok(None);
            };
            if question.eq_ignore_ascii_case("exit") {
                return Ok(None);
            }
            if !question.is_empty() {
                return Ok(Some(question));
            }
        }
    }

    /// Question → workflow → review loop.
    pub async fn run_interactive(&mut self, ctx: &AppContext) -> Result<(), AppError> {
        writeln!(self.out, "{BANNER}")?;
        while let Some(question) = self.next_question().await? {
            debug!(%question, "new question");
            let mut workflow = Workflow::new(question);
            drive(&mut workflow, &ctx.dispatcher, &mut *self, ctx.checkpoints.as_ref()).await?;
            info!(
                thread_id = %workflow.thread_id(),
                cycles = workflow.dispatches(),
                "question finished"
            );
            writeln!(self.out, "{END_OF_RESPONSE}")?;
        }
        Ok(())
    }

    /// Print one line per saved thread: id, phase and question.
    pub fn list_checkpoints(&mut self, store: &CheckpointStore) -> Result<(), AppError> {
        let ids = store.list()?;
        if ids.is_empty() {
            writeln!(self.out, "No checkpoints in {}", store.dir().display())?;
        }
        for id in ids {
            let checkpoint = store.load(&id)?;
            let workflow = &checkpoint.workflow;
            writeln!(
                self.out,
                "{id}  {:?}  {}  {}",
                workflow.phase(),
                checkpoint.updated_at,
                workflow.state().question
            )?;
        }
        Ok(())
    }

    /// Continue a saved thread from its checkpointed phase.
    pub async fn resume(&mut self, ctx: &AppContext, thread_id: &str) -> Result<(), AppError> {
        let store = ctx
            .checkpoints
            .as_ref()
            .ok_or_else(|| AppError::Config("checkpoints are disabled in config".into()))?;
        let mut workflow = store.load(thread_id)?.workflow;
        info!(%thread_id, phase = ?workflow.phase(), "resuming thread");
        writeln!(self.out, "Question: {}", workflow.state().question)?;
        if workflow.is_done() {
            writeln!(self.out, "Answer:\n{}", workflow.state().answer)?;
        } else {
            drive(&mut workflow, &ctx.dispatcher, &mut *self, Some(store)).await?;
        }
        writeln!(self.out, "{END_OF_RESPONSE}")?;
        Ok(())
    }

    /// Write a query, execute it only after the user agrees, then answer.
    pub async fn run_pipeline(&mut self, pipeline: &QueryPipeline) -> Result<(), AppError> {
        while let Some(question) = self.next_question().await? {
            let query = match pipeline.write_query(&question).await {
                Ok(q) => q,
                Err(e) => {
                    warn!(error = %e, "write_query failed");
                    writeln!(self.out, "Error occurred: {e}")?;
                    continue;
                }
            };
            writeln!(self.out, "Query: {query}")?;

            let approval = self.prompt(EXECUTE_PROMPT).await?.unwrap_or_default();
            if !approval.eq_ignore_ascii_case("yes") {
                writeln!(self.out, "Operation canceled by user.")?;
                continue;
            }

            let result = pipeline.execute_query(&query);
            writeln!(self.out, "Result: {result}")?;
            match pipeline.generate_answer(&question, &query, &result).await {
                Ok(answer) => writeln!(self.out, "Answer: {answer}")?,
                Err(e) => writeln!(self.out, "Error occurred: {e}")?,
            }
        }
        Ok(())
    }

    /// Print the dialect, usable tables, and sample rows from the first table.
    pub fn inspect(&mut self, db: &Database) -> Result<(), AppError> {
        writeln!(self.out, "Dialect: {}", db.dialect())?;
        let tables = db.usable_table_names()?;
        writeln!(self.out, "Tables: {}", tables.join(", "))?;
        if let Some(first) = tables.first() {
            let sql = format!("SELECT * FROM \"{first}\" LIMIT {SAMPLE_ROWS};");
            writeln!(self.out, "{sql}")?;
            writeln!(self.out, "{}", db.run(&sql)?)?;
        }
        Ok(())
    }
}

impl<R: AsyncBufRead + Unpin, W: Write> Reviewer for Console<R, W> {
    async fn review(&mut self, state: &SessionState) -> Result<String, AppError> {
        writeln!(self.out, "Answer:\n{}", state.answer)?;
        self.prompt(APPROVAL_PROMPT)
            .await?
            .ok_or_else(|| AppError::Workflow("input closed while waiting for approval".into()))
    }
}
