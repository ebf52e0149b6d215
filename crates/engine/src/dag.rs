//! Dependency resolution and static inspection of the workflow graph.
//!
//! Edges come from two places:
//! 1. Nesting: a node depends on every child indented beneath it.
//! 2. References: `{{#id}}` tokens in a prompt.
//! 3. Model variables: the static node whose value names an LLM node's model.
//!
//! Only ids that exist become edges; `{{#ghost}}` stays literal text.

use std::collections::{HashMap, HashSet, VecDeque};

use completion::Model;

use crate::error::{CycleError, EngineError};
use crate::models::{ModelRef, Node, NodeKind, Workflow};
use crate::parser::parse;
use crate::template;

/// Fill in `explicit_dependencies` from the `{{#id}}` tokens of each prompt.
pub fn resolve_dependencies(nodes: &mut [Node]) {
    let known: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();

    for node in nodes.iter_mut() {
        let mut explicit: Vec<String> = Vec::new();
        for id in template::references(&node.prompt) {
            if known.contains(id) && !explicit.iter().any(|e| e == id) {
                explicit.push(id.to_owned());
            }
        }
        node.explicit_dependencies = explicit;
    }
}

/// Turn model tokens that name a static node into [`ModelRef::Variable`].
///
/// A token that is also a nickname in `available` stays a nickname.
pub fn bind_model_variables(workflow: &mut Workflow, available: &[Model]) {
    let statics: HashSet<String> = workflow
        .nodes
        .iter()
        .filter(|n| n.is_static())
        .map(|n| n.id.clone())
        .collect();

    for node in &mut workflow.nodes {
        let NodeKind::Llm { model } = &mut node.kind else { continue };
        let promoted = match &*model {
            ModelRef::Nickname(name)
                if statics.contains(name.as_str())
                    && !available.iter().any(|m| m.answers_to(name)) =>
            {
                Some(name.clone())
            }
            _ => None,
        };
        if let Some(target) = promoted {
            *model = ModelRef::Variable(target);
        }
    }
}

/// Parse `source` and resolve its dependencies.
pub fn build_workflow(source: &str) -> Result<Workflow, EngineError> {
    let mut nodes = parse(source)?;
    resolve_dependencies(&mut nodes);
    Ok(Workflow::new(nodes))
}

/// Model nicknames the workflow needs, in declaration order, each once
/// (compared case-insensitively).
///
/// Model variables count when their static target has no placeholders, i.e.
/// its value is known without running anything. Expects
/// [`bind_model_variables`] to have run.
pub fn required_models(workflow: &Workflow) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut required = Vec::new();

    for node in &workflow.nodes {
        let name = match node.model() {
            Some(ModelRef::Nickname(name)) => name.as_str(),
            Some(ModelRef::Variable(target)) => match workflow.get(target) {
                Some(t) if t.is_static() && !template::has_placeholders(&t.prompt) => {
                    t.prompt.trim()
                }
                _ => continue,
            },
            None => continue,
        };
        if !name.is_empty() && seen.insert(name.to_lowercase()) {
            required.push(name.to_owned());
        }
    }
    required
}

/// Fail with [`EngineError::Validation`] naming every required model that is
/// not in `available`.
pub fn check_models(workflow: &Workflow, available: &[Model]) -> Result<(), EngineError> {
    let missing: Vec<String> = required_models(workflow)
        .into_iter()
        .filter(|name| !available.iter().any(|m| m.answers_to(name)))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Validation { missing })
    }
}

/// Order in which nodes can complete (Kahn's algorithm, ties broken by
/// declaration order).
///
/// The scheduler does not need this; it is a static check for tooling. A
/// cycle here is exactly what the scheduler reports as a deadlock.
pub fn topological_order(workflow: &Workflow) -> Result<Vec<String>, CycleError> {
    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut in_degree: Vec<usize> = vec![0; workflow.len()];

    for (i, node) in workflow.nodes.iter().enumerate() {
        let mut deps: Vec<usize> = Vec::new();
        for dep in node.dependencies() {
            match workflow.position(dep) {
                Some(d) if !deps.contains(&d) => deps.push(d),
                _ => {}
            }
        }
        in_degree[i] = deps.len();
        for d in deps {
            dependents.entry(d).or_default().push(i);
        }
    }

    // Seed the queue with nodes that depend on nothing.
    let mut queue: VecDeque<usize> = (0..workflow.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted: Vec<String> = Vec::with_capacity(workflow.len());

    while let Some(i) = queue.pop_front() {
        sorted.push(workflow.nodes[i].id.clone());
        if let Some(next) = dependents.get(&i) {
            for &n in next {
                in_degree[n] -= 1;
                if in_degree[n] == 0 {
                    queue.push_back(n);
                }
            }
        }
    }

    if sorted.len() != workflow.len() {
        let nodes = workflow
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, n)| n.id.clone())
            .collect();
        return Err(CycleError { nodes });
    }

    Ok(sorted)
}
