//! `engine` crate: the workflow DSL parser, dependency resolver and the
//! round-based scheduler that runs a script against a completion client.

pub mod config;
pub mod dag;
pub mod error;
pub mod executor;
pub mod models;
pub mod parser;
pub mod state;
pub mod template;

pub use config::{ExecutorConfig, WorkflowSettings};
pub use dag::{bind_model_variables, build_workflow, resolve_dependencies, topological_order};
pub use error::{CycleError, EngineError, NodeFailure, ParseError, ParseErrorKind, TemplateError};
pub use executor::{ExecutionResult, NodeOutput, Progress, WorkflowExecutor};
pub use models::{ModelRef, Node, NodeKind, Workflow};
pub use parser::parse;
pub use state::NodeState;
