//! Per-run mutable state: node lifecycle and the output store.
//!
//! Both are owned by the scheduler's round loop. A node's state and output
//! are written only by that node's own execution, and dependents read them
//! only after it is `Completed`, so nothing here needs a lock.

use std::collections::HashMap;

use crate::models::Workflow;

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

/// Lifecycle of one node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// OutputStore
// ---------------------------------------------------------------------------

/// Node id → resolved text. Each id is written at most once.
#[derive(Debug, Clone, Default)]
pub struct OutputStore {
    values: HashMap<String, String>,
}

impl OutputStore {
    /// Store `value` for `id`. Returns `false` (and keeps the first value)
    /// if `id` already has an output.
    pub fn insert(&mut self, id: &str, value: String) -> bool {
        if self.values.contains_key(id) {
            return false;
        }
        self.values.insert(id.to_owned(), value);
        true
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.values.get(id).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// RunState
// ---------------------------------------------------------------------------

/// States of every node (indexed like `Workflow::nodes`) plus their outputs.
#[derive(Debug)]
pub struct RunState {
    states: Vec<NodeState>,
    pub outputs: OutputStore,
}

impl RunState {
    pub fn new(workflow: &Workflow) -> Self {
        Self {
            states: vec![NodeState::Pending; workflow.len()],
            outputs: OutputStore::default(),
        }
    }

    pub fn state(&self, index: usize) -> NodeState {
        self.states[index]
    }

    pub fn start(&mut self, index: usize) {
        debug_assert_eq!(self.states[index], NodeState::Pending);
        self.states[index] = NodeState::Running;
    }

    pub fn complete(&mut self, workflow: &Workflow, index: usize, output: String) {
        let stored = self.outputs.insert(&workflow.nodes[index].id, output);
        debug_assert!(stored, "node output written twice");
        self.states[index] = NodeState::Completed;
    }

    pub fn fail(&mut self, index: usize) {
        self.states[index] = NodeState::Failed;
    }

    /// Whether any node is still `Pending` or `Running`.
    pub fn has_unfinished(&self) -> bool {
        self.states.iter().any(|s| !s.is_terminal())
    }

    /// Pending nodes whose every dependency is `Completed`, in script order.
    ///
    /// Dependencies on ids that are not part of the workflow never complete.
    pub fn runnable(&self, workflow: &Workflow) -> Vec<usize> {
        workflow
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| self.states[*i] == NodeState::Pending)
            .filter(|(_, node)| {
                node.dependencies().all(|dep| {
                    workflow
                        .position(dep)
                        .is_some_and(|d| self.states[d] == NodeState::Completed)
                })
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Ids of nodes not yet in a terminal state, in script order.
    pub fn unfinished_ids(&self, workflow: &Workflow) -> Vec<String> {
        workflow
            .nodes
            .iter()
            .zip(&self.states)
            .filter(|(_, s)| !s.is_terminal())
            .map(|(n, _)| n.id.clone())
            .collect()
    }
}
