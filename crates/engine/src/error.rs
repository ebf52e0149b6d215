//! Engine-level error types.

use completion::CompletionError;
use thiserror::Error;

// ------ Parsing ------

/// Why a script line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// A step line with neither `#id` nor a model token.
    #[error("expected an #id or a model name")]
    MissingIdOrModel,

    /// `#` followed by something that is not `[A-Za-z0-9_-]+`.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// A token after the model that is not a `+flag`.
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    /// A bare `+` with no flag name.
    #[error("empty flag")]
    EmptyFlag,

    /// A `"""` block that is never closed.
    #[error("unterminated \"\"\" block")]
    UnterminatedFence,

    /// Two nodes share an id.
    #[error("duplicate node id '{0}'")]
    DuplicateId(String),
}

/// A malformed script line, reported before anything runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid syntax on line {line}: {kind}: \"{text}\"")]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    /// The offending line, trimmed.
    pub text: String,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, text: impl Into<String>, kind: ParseErrorKind) -> Self {
        Self { line, text: text.into(), kind }
    }
}

// ------ Templates ------

/// Placeholder substitution failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A referenced dependency has no stored output.
    #[error("dependency '{0}' has no output")]
    MissingOutput(String),
}

// ------ Node execution ------

/// Underlying cause of a node failure.
#[derive(Debug, Error)]
pub enum NodeFailure {
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The model variable's static node resolved to nothing.
    #[error("model variable '{0}' has no resolved value")]
    MissingModelVariable(String),

    /// A model variable resolved to a nickname the client does not know.
    #[error("model '{0}' is not defined")]
    UnknownModel(String),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

// ------ Static graph inspection ------

/// The dependency graph has no topological order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle among: {}", .nodes.join(", "))]
pub struct CycleError {
    /// Nodes that could not be ordered, in declaration order.
    pub nodes: Vec<String>,
}

// ------ Top level ------

/// Errors produced by the workflow engine. All of them abort the run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The script could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// One or more LLM nodes name a model the client does not know.
    #[error("workflow aborted: the following models are not defined: {}", .missing.join(", "))]
    Validation { missing: Vec<String> },

    /// A node failed; the whole run is aborted.
    #[error("error executing node '{node_id}': {source}")]
    NodeExecution {
        node_id: String,
        #[source]
        source: NodeFailure,
    },

    /// No node can become runnable while some remain unresolved.
    #[error("deadlock detected: no runnable nodes, but {} still pending: {}", .pending.len(), .pending.join(", "))]
    Deadlock { pending: Vec<String> },
}

impl EngineError {
    pub fn node(node_id: impl Into<String>, source: impl Into<NodeFailure>) -> Self {
        Self::NodeExecution { node_id: node_id.into(), source: source.into() }
    }
}
