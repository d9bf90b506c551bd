// Library root: exposes internals for integration tests and the binary.
// The binary entry point is src/main.rs.

pub mod agents;
pub mod checkpoint;
pub mod config;
pub mod console;
pub mod context;
pub mod db;
pub mod error;
pub mod llm;
pub mod logger;
pub mod lookup;
pub mod pipeline;
pub mod workflow;
