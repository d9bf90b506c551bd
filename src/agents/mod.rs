//! Model-driven collaborators: the SQL chain (counting path), the ReAct agent
//! (general path), the toolkit the agent calls, and prompt assembly.

pub mod chain;
pub mod prompt;
pub mod react;
pub mod tools;

pub use chain::{ChainOutput, ChainStep, SqlChain};
pub use react::{AgentMessage, AgentRun, ReactAgent, Role};
pub use tools::{SqlTool, Toolkit};
