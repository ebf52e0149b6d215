//! Core domain models for the workflow engine.
//!
//! A workflow is rebuilt from script source on every run; none of these
//! types outlive a single execution.

use std::collections::HashMap;

use serde::Serialize;

// ---------------------------------------------------------------------------
// ModelRef
// ---------------------------------------------------------------------------

/// Which model an LLM step talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum ModelRef {
    /// A model nickname known to the completion client.
    Nickname(String),
    /// The id of a static node whose resolved value names the model.
    Variable(String),
}

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

/// What a node does when it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Template substitution only, no external call.
    Static,
    /// One completion call.
    Llm { model: ModelRef },
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single step in a workflow script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    /// Unique identifier within this workflow (`#id`, or `node_<line>`).
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Prompt template; may contain `{{INPUT}}` and `{{#id}}` placeholders.
    pub prompt: String,
    /// Nesting depth derived from leading whitespace.
    pub indent_level: usize,
    /// 1-based line the node was declared on.
    pub line: usize,
    /// Ids of nodes nested directly beneath this one, in script order.
    pub children: Vec<String>,
    /// Ids referenced by `{{#id}}` tokens in the prompt.
    pub explicit_dependencies: Vec<String>,
    /// `+flag` tokens, passed through to the completion client.
    pub flags: Vec<String>,
}

impl Node {
    pub fn is_static(&self) -> bool {
        matches!(self.kind, NodeKind::Static)
    }

    pub fn model(&self) -> Option<&ModelRef> {
        match &self.kind {
            NodeKind::Llm { model } => Some(model),
            NodeKind::Static => None,
        }
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// Every id that must be `Completed` before this node may run: children,
    /// then references, then the model variable's target.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        let variable = match self.model() {
            Some(ModelRef::Variable(target)) => Some(target.as_str()),
            _ => None,
        };
        self.children
            .iter()
            .chain(self.explicit_dependencies.iter())
            .map(String::as_str)
            .chain(variable)
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A parsed and resolved workflow: nodes in declaration order plus an id index.
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    pub nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

impl Workflow {
    /// Wrap already-resolved nodes. Ids are expected to be unique (the parser
    /// guarantees it).
    pub fn new(nodes: Vec<Node>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        Self { nodes, index }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.position(id).map(|i| &self.nodes[i])
    }

    /// Indent-0 LLM nodes, whose outputs make up the final result.
    pub fn roots(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| n.indent_level == 0 && !n.is_static())
    }
}
