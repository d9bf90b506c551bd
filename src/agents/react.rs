//! ReAct SQL agent.
//!
//! The model is driven with the plain-text Thought / Action / Action Input /
//! Observation protocol. A run is consumed turn by turn through
//! [`AgentRun::next`]: the user message first, then every assistant turn and
//! tool observation, and last the final answer.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;

use regex::Regex;
use tracing::{debug, trace, warn};

use crate::agents::prompt::{self, PromptBuilder};
use crate::agents::tools::Toolkit;
use crate::error::AppError;
use crate::llm::LlmProvider;

const ACTION_PATTERN: &str = r"(?s)Action\s*\d*\s*:(.*?)\n\s*Action\s*\d*\s*Input\s*\d*\s*:\s*(.*)";
const FINAL_ANSWER: &str = "Final Answer:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    /// Observation returned by the named tool.
    Tool(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentMessage {
    pub role: Role,
    pub content: String,
}

impl AgentMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: Role::Tool(name.into()), content: content.into() }
    }
}

impl fmt::Display for AgentMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = match &self.role {
            Role::User => "Human Message".to_string(),
            Role::Assistant => "Ai Message".to_string(),
            Role::Tool(name) => format!("Tool Message ({name})"),
        };
        write!(f, "================ {header} ================\n\n{}", self.content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Final(String),
    Action { block: String, tool: String, input: String },
}

#[derive(Debug, Clone)]
pub struct ReactAgent {
    llm: LlmProvider,
    toolkit: Toolkit,
    prompts_dir: PathBuf,
    top_k: usize,
    max_steps: usize,
    action: Regex,
}

impl ReactAgent {
    pub fn new(
        llm: LlmProvider,
        toolkit: Toolkit,
        prompts_dir: impl Into<PathBuf>,
        top_k: usize,
        max_steps: usize,
    ) -> Result<Self, AppError> {
        let action = Regex::new(ACTION_PATTERN).map_err(|e| AppError::Agent(format!("regex: {e}")))?;
        Ok(Self { llm, toolkit, prompts_dir: prompts_dir.into(), top_k, max_steps, action })
    }

    /// System prompt: agent instructions, the lookup rule when the lookup
    /// tool is available, the tool catalogue and the response format.
    pub fn system_prompt(&self) -> String {
        let tools: Vec<(&str, &str)> = self
            .toolkit
            .tools()
            .into_iter()
            .map(|t| (t.name(), t.description()))
            .collect();

        let mut builder = PromptBuilder::new(&self.prompts_dir).template(prompt::SQL_AGENT);
        if self.toolkit.has_lookup() {
            builder = builder.template(prompt::PROPER_NOUNS);
        }
        builder
            .with_tools(&tools)
            .template(prompt::REACT_FORMAT)
            .var("dialect", self.toolkit.db().dialect_label())
            .var("top_k", self.top_k.to_string())
            .build()
    }

    pub fn start(&self, question: &str) -> AgentRun<'_> {
        AgentRun {
            agent: self,
            system: self.system_prompt(),
            transcript: format!("Question: {question}\n"),
            pending: VecDeque::from([AgentMessage::user(question)]),
            steps: 0,
            finished: false,
        }
    }

    fn parse(&self, output: &str) -> Step {
        let output = cut_observation(output);
        let final_at = output.find(FINAL_ANSWER);

        if let Some(caps) = self.action.captures(output) {
            let action_at = caps.get(0).map(|m| m.start()).unwrap_or(0);
            if final_at.is_none_or(|f| action_at < f) {
                let tool = caps.get(1).map(|m| m.as_str()).unwrap_or("").trim().to_string();
                let input = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                let input = match input.find(FINAL_ANSWER) {
                    Some(i) => &input[..i],
                    None => input,
                };
                return Step::Action {
                    block: output.trim().to_string(),
                    tool,
                    input: input.trim().to_string(),
                };
            }
        }

        match final_at {
            Some(i) => Step::Final(output[i + FINAL_ANSWER.len()..].trim().to_string()),
            None => Step::Final(output.trim().to_string()),
        }
    }
}

/// One in-progress agent run over a single question.
#[derive(Debug)]
pub struct AgentRun<'a> {
    agent: &'a ReactAgent,
    system: String,
    transcript: String,
    pending: VecDeque<AgentMessage>,
    steps: usize,
    finished: bool,
}

impl AgentRun<'_> {
    /// Next message of the run, or `None` once the final answer was yielded.
    pub async fn next(&mut self) -> Option<Result<AgentMessage, AppError>> {
        if let Some(msg) = self.pending.pop_front() {
            return Some(Ok(msg));
        }
        if self.finished {
            return None;
        }
        if self.steps >= self.agent.max_steps {
            self.finished = true;
            return Some(Err(AppError::Agent(format!(
                "agent stopped after {} steps without a final answer",
                self.agent.max_steps
            ))));
        }
        self.steps += 1;

        trace!(step = self.steps, transcript = %self.transcript, "agent prompt");
        let reply = match self.agent.llm.complete(&self.transcript, Some(&self.system)).await {
            Ok(r) => r.text,
            Err(e) => {
                self.finished = true;
                return Some(Err(e.into()));
            }
        };

        match self.agent.parse(&reply) {
            Step::Final(answer) => {
                debug!(steps = self.steps, "agent finished");
                self.finished = true;
                Some(Ok(AgentMessage::assistant(answer)))
            }
            Step::Action { block, tool, input } => {
                let observation = match self.agent.toolkit.resolve(&tool) {
                    Some(t) => self.agent.toolkit.invoke(t, &input).await,
                    None => {
                        warn!(%tool, "agent requested unknown tool");
                        let names: Vec<&str> =
                            self.agent.toolkit.tools().into_iter().map(|t| t.name()).collect();
                        format!("Error: {tool} is not a valid tool, try one of [{}].", names.join(", "))
                    }
                };
                self.transcript.push_str(&format!("{block}\nObservation: {observation}\n"));
                self.pending.push_back(AgentMessage::tool(tool, observation));
                Some(Ok(AgentMessage::assistant(block)))
            }
        }
    }
}

/// Drop anything the model wrote from its own `Observation:` onwards.
fn cut_observation(output: &str) -> &str {
    match output.find("Observation:") {
        Some(i) => &output[..i],
        None => output,
    }
}
